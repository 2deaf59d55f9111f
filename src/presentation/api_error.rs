// Error responses for the HTTP surface
use crate::domain::catalog::CatalogError;
use crate::infrastructure::codec8::Codec8Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("vehicle {0} is not watched")]
    NotWatched(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid codec 8 packet: {0}")]
    Packet(#[from] Codec8Error),
    #[error("a diagnostics cycle for {0} is already running")]
    InFlight(String),
    #[error("vehicle {0} was unwatched while the cycle ran")]
    Discarded(String),
    #[error("{0}")]
    Internal(StatusCode),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotWatched(_) | ApiError::Catalog(_) => StatusCode::NOT_FOUND,
            ApiError::Packet(_) => StatusCode::BAD_REQUEST,
            ApiError::InFlight(_) | ApiError::Discarded(_) => StatusCode::CONFLICT,
            ApiError::Internal(status) => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
