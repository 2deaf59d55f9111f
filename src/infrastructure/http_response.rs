// HTTP response utilities for SVG+Brotli encoding
use async_compression::tokio::bufread::BrotliEncoder;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode},
};
use tokio::io::AsyncReadExt;

pub const CHART_STATUS: HeaderName = HeaderName::from_static("x-chart-status");

/// True when the client lists `br` in Accept-Encoding.
pub fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| {
            s.split(',')
                .any(|encoding| encoding.split(';').next().map(str::trim) == Some("br"))
        })
        .unwrap_or(false)
}

pub async fn brotli_compress(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let mut encoder = BrotliEncoder::new(std::io::Cursor::new(bytes));
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed).await?;
    Ok(compressed)
}

/// SVG document response, Brotli compressed when requested. `chart_status`
/// is exposed as `x-chart-status` so clients can tell a placeholder apart.
pub async fn svg_response(
    svg: String,
    compress: bool,
    chart_status: Option<&'static str>,
) -> Result<Response<Body>, StatusCode> {
    let raw = svg.into_bytes();

    let (body_bytes, content_encoding) = if compress {
        let raw_len = raw.len();
        let compressed = brotli_compress(raw).await.map_err(|e| {
            tracing::error!("Brotli compression error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        tracing::debug!("Compressed chart: {} -> {} bytes", raw_len, compressed.len());
        (compressed, Some("br"))
    } else {
        (raw, None)
    };

    let mut response_builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/svg+xml")
        .header(header::CONTENT_LENGTH, HeaderValue::from(body_bytes.len()))
        .header(header::VARY, "accept-encoding");

    if let Some(encoding) = content_encoding {
        response_builder = response_builder.header(header::CONTENT_ENCODING, encoding);
    }
    if let Some(status) = chart_status {
        response_builder = response_builder.header(CHART_STATUS, status);
    }

    response_builder.body(Body::from(body_bytes)).map_err(|e| {
        tracing::error!("Response build error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
