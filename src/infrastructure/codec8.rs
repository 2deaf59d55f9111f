// Teltonika Codec 8 AVL packet decoding
use crate::domain::telemetry::RawTelemetryRecord;
use bytes::Buf;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const CODEC_ID: u8 = 0x08;
const HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;
// timestamp + priority + gps element + event id + io count
const RECORD_MIN_LEN: usize = 8 + 1 + 15 + 1 + 1;
/// Largest data field accepted from a stream before the header is treated
/// as noise.
pub const MAX_DATA_LEN: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum Codec8Error {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("non-zero preamble {0:#010x}")]
    Preamble(u32),
    #[error("packet declares {declared} data bytes but only {available} follow")]
    Truncated { declared: usize, available: usize },
    #[error("unsupported codec id {0:#04x}")]
    CodecId(u8),
    #[error("record {0} is truncated")]
    RecordTruncated(usize),
    #[error("record {0} has an out of range timestamp")]
    Timestamp(usize),
    #[error("record count mismatch: header says {header}, trailer says {trailer}")]
    CountMismatch { header: u8, trailer: u8 },
}

/// What the front of a stream buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScan {
    /// More bytes are needed before a frame can be cut.
    Incomplete,
    /// The first byte cannot start a frame and should be dropped.
    Garbage,
    /// A whole frame of this many bytes is buffered.
    Frame(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvlRecord {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: i16,
    pub angle: u16,
    pub satellites: u8,
    pub speed: u16,
    pub event_id: u8,
    pub io: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvlPacket {
    pub records: Vec<AvlRecord>,
    pub crc_valid: bool,
    /// Bytes consumed from the input, including header and CRC.
    pub frame_len: usize,
}

impl AvlRecord {
    /// Element map keyed by decimal IO id, the shape the fleet API serves.
    pub fn into_raw(self) -> RawTelemetryRecord {
        let elements: Map<String, Value> = self
            .io
            .into_iter()
            .map(|(id, value)| (id.to_string(), Value::from(value)))
            .collect();
        RawTelemetryRecord::new(
            self.timestamp,
            Some(f64::from(self.speed)),
            Value::Object(elements),
        )
    }
}

impl AvlPacket {
    pub fn into_raw_records(self) -> Vec<RawTelemetryRecord> {
        self.records.into_iter().map(AvlRecord::into_raw).collect()
    }
}

/// CRC-16/IBM as used by Teltonika: reflected polynomial 0xA001, zero init.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (0..8).fold(crc ^ u16::from(byte), |crc, _| {
            if crc & 1 == 1 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            }
        })
    })
}

/// Acknowledgement for the device: accepted record count, big-endian.
pub fn ack(accepted: usize) -> [u8; 4] {
    u32::try_from(accepted).unwrap_or(u32::MAX).to_be_bytes()
}

/// Locate the next frame at the start of `buffer` using its header alone.
pub fn scan_frame(buffer: &[u8]) -> FrameScan {
    if buffer.len() < HEADER_LEN + CRC_LEN {
        return FrameScan::Incomplete;
    }
    let mut header = &buffer[..HEADER_LEN];
    if header.get_u32() != 0 {
        return FrameScan::Garbage;
    }
    let declared = header.get_u32() as usize;
    if declared > MAX_DATA_LEN {
        return FrameScan::Garbage;
    }
    let frame_len = HEADER_LEN + declared + CRC_LEN;
    if buffer.len() < frame_len {
        FrameScan::Incomplete
    } else {
        FrameScan::Frame(frame_len)
    }
}

pub fn parse_packet(buffer: &[u8]) -> Result<AvlPacket, Codec8Error> {
    if buffer.len() < HEADER_LEN + CRC_LEN {
        return Err(Codec8Error::TooShort(buffer.len()));
    }

    let mut header = &buffer[..HEADER_LEN];
    let preamble = header.get_u32();
    if preamble != 0 {
        return Err(Codec8Error::Preamble(preamble));
    }
    let declared = header.get_u32() as usize;
    let available = buffer.len() - HEADER_LEN - CRC_LEN;
    if declared > available || declared < 3 {
        return Err(Codec8Error::Truncated {
            declared,
            available,
        });
    }

    let data = &buffer[HEADER_LEN..HEADER_LEN + declared];
    let mut trailer = &buffer[HEADER_LEN + declared..HEADER_LEN + declared + CRC_LEN];
    let received_crc = trailer.get_u32();
    let computed_crc = crc16(data);
    let crc_valid = received_crc == u32::from(computed_crc);
    if !crc_valid {
        tracing::warn!(
            "Codec 8 CRC mismatch: received {:#06x}, computed {:#06x}",
            received_crc,
            computed_crc
        );
    }

    let mut cursor = data;
    let codec = cursor.get_u8();
    if codec != CODEC_ID {
        return Err(Codec8Error::CodecId(codec));
    }
    let count = cursor.get_u8();

    let mut records = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        // The trailing count byte must stay in the cursor
        if cursor.remaining() < RECORD_MIN_LEN + 1 {
            return Err(Codec8Error::RecordTruncated(index));
        }
        records.push(read_record(&mut cursor, index)?);
    }

    if cursor.remaining() < 1 {
        return Err(Codec8Error::RecordTruncated(count as usize));
    }
    let trailer_count = cursor.get_u8();
    if trailer_count != count {
        return Err(Codec8Error::CountMismatch {
            header: count,
            trailer: trailer_count,
        });
    }

    Ok(AvlPacket {
        records,
        crc_valid,
        frame_len: HEADER_LEN + declared + CRC_LEN,
    })
}

fn read_record(cursor: &mut &[u8], index: usize) -> Result<AvlRecord, Codec8Error> {
    let millis = cursor.get_u64();
    let timestamp = i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or(Codec8Error::Timestamp(index))?;
    let priority = cursor.get_u8();
    let longitude = f64::from(cursor.get_i32()) / 1e7;
    let latitude = f64::from(cursor.get_i32()) / 1e7;
    let altitude = cursor.get_i16();
    let angle = cursor.get_u16();
    let satellites = cursor.get_u8();
    let speed = cursor.get_u16();
    let event_id = cursor.get_u8();
    let _total = cursor.get_u8();

    let mut io = BTreeMap::new();
    for width in [1usize, 2, 4, 8] {
        if cursor.remaining() < 1 {
            return Err(Codec8Error::RecordTruncated(index));
        }
        let n = cursor.get_u8() as usize;
        if cursor.remaining() < n * (1 + width) {
            return Err(Codec8Error::RecordTruncated(index));
        }
        for _ in 0..n {
            let id = u16::from(cursor.get_u8());
            let value = cursor.get_uint(width);
            io.insert(id, value);
        }
    }

    Ok(AvlRecord {
        timestamp,
        priority,
        longitude,
        latitude,
        altitude,
        angle,
        satellites,
        speed,
        event_id,
        io,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::decoder::Decoder;
    use crate::domain::catalog::ParameterCatalog;
    use crate::domain::parameter::ParameterId;
    use std::sync::Arc;

    const SAMPLE: &str = "000000000000003608010000016B40D8EA30010000000000000000000000000000000105021503010101425E0F01F10000601A014E0000000000000000010000C7CF";

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_crc16_matches_device_checksum() {
        let packet = hex(SAMPLE);
        assert_eq!(crc16(&packet[8..packet.len() - 4]), 0xC7CF);
    }

    #[test]
    fn test_parse_sample_packet() {
        let packet = parse_packet(&hex(SAMPLE)).unwrap();
        assert!(packet.crc_valid);
        assert_eq!(packet.frame_len, 66);
        assert_eq!(packet.records.len(), 1);

        let record = &packet.records[0];
        assert_eq!(record.timestamp.timestamp_millis(), 1_560_161_086_000);
        assert_eq!(record.priority, 1);
        assert_eq!(record.satellites, 0);
        assert_eq!(record.event_id, 1);
        assert_eq!(
            record.io,
            BTreeMap::from([(1, 1), (21, 3), (66, 24079), (78, 0), (241, 24602)])
        );
    }

    #[test]
    fn test_records_decode_through_the_catalog() {
        let packet = parse_packet(&hex(SAMPLE)).unwrap();
        let raw = packet.into_raw_records();
        let decoder = Decoder::new(Arc::new(ParameterCatalog::standard()));

        let decoded = decoder.decode(&raw[0]);
        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.sample.value(ParameterId::ExternalVoltage), Some(24.079));
        assert_eq!(decoded.sample.speed, Some(0.0));
    }

    #[test]
    fn test_crc_mismatch_is_reported_not_rejected() {
        let mut bytes = hex(SAMPLE);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let packet = parse_packet(&bytes).unwrap();
        assert!(!packet.crc_valid);
        assert_eq!(packet.records.len(), 1);
    }

    #[test]
    fn test_rejects_bad_framing() {
        let mut bytes = hex(SAMPLE);
        bytes[0] = 1;
        assert!(matches!(parse_packet(&bytes), Err(Codec8Error::Preamble(_))));

        let bytes = hex(SAMPLE);
        assert!(matches!(
            parse_packet(&bytes[..40]),
            Err(Codec8Error::Truncated { declared: 54, .. })
        ));

        let mut bytes = hex(SAMPLE);
        bytes[8] = 0x8E;
        assert_eq!(parse_packet(&bytes), Err(Codec8Error::CodecId(0x8E)));

        assert_eq!(parse_packet(&[0; 6]), Err(Codec8Error::TooShort(6)));
    }

    #[test]
    fn test_count_mismatch_is_an_error() {
        let mut bytes = hex(SAMPLE);
        // trailing record count sits right before the CRC
        let trailer = bytes.len() - 5;
        bytes[trailer] = 2;
        assert_eq!(
            parse_packet(&bytes),
            Err(Codec8Error::CountMismatch {
                header: 1,
                trailer: 2
            })
        );
    }

    #[test]
    fn test_header_count_beyond_data_is_truncation() {
        let mut bytes = hex(SAMPLE);
        bytes[9] = 2;
        assert_eq!(parse_packet(&bytes), Err(Codec8Error::RecordTruncated(1)));
    }

    #[test]
    fn test_scan_frame() {
        let bytes = hex(SAMPLE);
        assert_eq!(scan_frame(&bytes), FrameScan::Frame(66));
        assert_eq!(scan_frame(&bytes[..11]), FrameScan::Incomplete);
        assert_eq!(scan_frame(&bytes[..65]), FrameScan::Incomplete);
        assert_eq!(scan_frame(&bytes[4..]), FrameScan::Garbage);

        let mut oversized = bytes.clone();
        oversized[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(scan_frame(&oversized), FrameScan::Garbage);
    }

    #[test]
    fn test_ack_is_big_endian_count() {
        assert_eq!(ack(1), [0, 0, 0, 1]);
        assert_eq!(ack(300), [0, 0, 1, 44]);
    }
}
