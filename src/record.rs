use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvalidRecord {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{field} is out of range: {value}")]
    OutOfRange {
        field: &'static str,
        value: serde_json::Number,
    },
}

/// Raw JSON shape of an inbound record. Every field is optional here so that
/// a missing field can be reported by name instead of as an opaque serde error.
#[derive(Deserialize)]
struct RawRecord {
    source_port: Option<i64>,
    timestamp: Option<String>,
    source_ip: Option<String>,
    destination_ip: Option<String>,
    protocol: Option<String>,
    // Number, not i64: byte counts use the full u64 range.
    length: Option<serde_json::Number>,
    request_line: Option<String>,
    status: Option<String>,
}

/// One normalized packet-capture observation.
///
/// Only `source_port` and `length` are interpreted (range-checked) on the way
/// in; every other field is opaque passthrough for downstream consumers.
/// `timestamp` is sortable lexicographically by upstream convention and
/// `request_line` may arrive binary-safe encoded — neither is decoded here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRecord {
    pub source_port: u16,
    pub timestamp: String,
    pub source_ip: String,
    pub destination_ip: String,
    pub protocol: String,
    pub length: u64,
    pub request_line: String,
    pub status: String,
}

impl PacketRecord {
    /// Parse and validate one inbound payload. No side effects on failure.
    pub fn parse(payload: &[u8]) -> Result<Self, InvalidRecord> {
        let raw: RawRecord = serde_json::from_slice(payload)?;

        let source_port = required(raw.source_port, "source_port")?;
        let source_port = u16::try_from(source_port).map_err(|_| InvalidRecord::OutOfRange {
            field: "source_port",
            value: source_port.into(),
        })?;

        let length = required(raw.length, "length")?;
        let length = match length.as_u64() {
            Some(length) => length,
            None => {
                return Err(InvalidRecord::OutOfRange {
                    field: "length",
                    value: length,
                });
            }
        };

        Ok(Self {
            source_port,
            timestamp: required(raw.timestamp, "timestamp")?,
            source_ip: required(raw.source_ip, "source_ip")?,
            destination_ip: required(raw.destination_ip, "destination_ip")?,
            protocol: required(raw.protocol, "protocol")?,
            length,
            request_line: required(raw.request_line, "request_line")?,
            status: required(raw.status, "status")?,
        })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, InvalidRecord> {
    value.ok_or(InvalidRecord::MissingField(field))
}
