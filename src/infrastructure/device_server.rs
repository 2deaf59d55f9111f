// Device TCP server - Teltonika IMEI handshake and Codec 8 stream framing
use crate::application::fleet_monitor::FleetMonitor;
use crate::infrastructure::codec8::{ack, parse_packet, scan_frame, FrameScan};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// IMEIs are 15 digits; anything far longer is not a handshake.
const MAX_IMEI_LEN: usize = 64;
const HANDSHAKE_ACCEPTED: u8 = 0x01;
const HANDSHAKE_REJECTED: u8 = 0x00;

/// Counters for one device connection.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionSummary {
    pub imei: Option<String>,
    pub frames: usize,
    pub accepted_records: usize,
    pub rejected_frames: usize,
    pub skipped_bytes: usize,
}

#[derive(Clone)]
pub struct DeviceServer {
    monitor: FleetMonitor,
    /// IMEI to vehicle id.
    devices: Arc<HashMap<String, String>>,
}

impl DeviceServer {
    pub fn new(monitor: FleetMonitor, devices: HashMap<String, String>) -> Self {
        Self {
            monitor,
            devices: Arc::new(devices),
        }
    }

    /// Accept device connections until the listener fails.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::info!("Device connected: {}", peer);

            let server = self.clone();
            tokio::spawn(async move {
                match server.serve(stream).await {
                    Ok(summary) => tracing::info!(
                        "Device {} disconnected ({:?}): {} frames, {} records accepted, {} rejected",
                        peer,
                        summary.imei,
                        summary.frames,
                        summary.accepted_records,
                        summary.rejected_frames
                    ),
                    Err(e) => tracing::warn!("Device {} dropped: {}", peer, e),
                }
            });
        }
    }

    /// Drive one connection: the IMEI handshake, then a stream of Codec 8
    /// frames, each answered with an ACK or NACK.
    pub async fn serve<S>(&self, mut stream: S) -> std::io::Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut summary = SessionSummary::default();
        let mut buffer = BytesMut::with_capacity(2048);
        let mut vehicle: Option<String> = None;

        loop {
            if stream.read_buf(&mut buffer).await? == 0 {
                return Ok(summary);
            }

            if summary.imei.is_none() {
                match take_imei(&mut buffer) {
                    Handshake::Pending => continue,
                    Handshake::Invalid(len) => {
                        tracing::warn!("Rejecting handshake with IMEI length {}", len);
                        stream.write_all(&[HANDSHAKE_REJECTED]).await?;
                        return Ok(summary);
                    }
                    Handshake::Imei(imei) => {
                        vehicle = self.register(&imei);
                        stream.write_all(&[HANDSHAKE_ACCEPTED]).await?;
                        summary.imei = Some(imei);
                    }
                }
            }

            loop {
                match scan_frame(&buffer) {
                    FrameScan::Incomplete => break,
                    FrameScan::Garbage => {
                        buffer.advance(1);
                        summary.skipped_bytes += 1;
                    }
                    FrameScan::Frame(len) => {
                        let frame = buffer.split_to(len);
                        let accepted = self.accept_frame(vehicle.as_deref(), &frame).await;
                        summary.frames += 1;
                        if accepted == 0 {
                            summary.rejected_frames += 1;
                        }
                        summary.accepted_records += accepted;
                        stream.write_all(&ack(accepted)).await?;
                    }
                }
            }
        }
    }

    /// Map a device to its vehicle and make sure the monitor tracks it.
    fn register(&self, imei: &str) -> Option<String> {
        match self.devices.get(imei) {
            Some(vehicle_id) => {
                if self.monitor.watch_manual(vehicle_id) {
                    tracing::info!("Device {} registered vehicle {}", imei, vehicle_id);
                }
                Some(vehicle_id.clone())
            }
            None => {
                tracing::warn!("Unknown device IMEI {}; its packets will be refused", imei);
                None
            }
        }
    }

    /// Records accepted from one frame; zero means the device gets a NACK.
    async fn accept_frame(&self, vehicle: Option<&str>, frame: &[u8]) -> usize {
        let packet = match parse_packet(frame) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("Refusing Codec 8 frame: {}", e);
                return 0;
            }
        };
        let Some(vehicle_id) = vehicle else {
            tracing::warn!("Refusing {} records from an unknown device", packet.records.len());
            return 0;
        };

        let frame_len = packet.frame_len;
        let mut records = packet.into_raw_records();
        records.sort_by_key(|record| record.timestamp);

        match self.monitor.ingest(vehicle_id, &records).await {
            Some(report) => {
                tracing::debug!(
                    "Frame of {} bytes for {}: {} records, {} alerts",
                    frame_len,
                    vehicle_id,
                    records.len(),
                    report.alerts.len()
                );
                records.len()
            }
            None => {
                tracing::warn!("Vehicle {} is no longer watched, refusing frame", vehicle_id);
                0
            }
        }
    }
}

enum Handshake {
    Pending,
    Invalid(usize),
    Imei(String),
}

/// Consume `u16 length + IMEI` from the front of the buffer once complete.
fn take_imei(buffer: &mut BytesMut) -> Handshake {
    if buffer.len() < 2 {
        return Handshake::Pending;
    }
    let len = usize::from(u16::from_be_bytes([buffer[0], buffer[1]]));
    if len == 0 || len > MAX_IMEI_LEN {
        return Handshake::Invalid(len);
    }
    if buffer.len() < 2 + len {
        return Handshake::Pending;
    }
    buffer.advance(2);
    let imei = buffer.split_to(len);
    Handshake::Imei(String::from_utf8_lossy(&imei).into_owned())
}
