//! Structured config/command documents and their wire handling.
//!
//! Documents arrive as JSON with the field names of the published schema
//! (`publishFanTelemetrySeconds`, `fanSpeedThresholds`, ...). Parsing is done
//! into preallocated bounded buffers; range validation of individual fields is
//! the bank's job so that one bad entry never poisons the rest of a batch.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_DOCUMENT_SIZE: usize = 2048;
pub const MAX_TELEMETRY_SIZE: usize = 4096;

pub type DocumentBuffer = ArrayString<MAX_DOCUMENT_SIZE>;
pub type TelemetryBuffer = ArrayString<MAX_TELEMETRY_SIZE>;

/// Upper bound for interval-style fields, in seconds (one day).
pub const MAX_INTERVAL_SECONDS: u32 = 86_400;
/// Temperatures above this collide with the sensor-disconnected sentinel.
pub const MAX_TEMPERATURE_C: u8 = 126;
pub const MAX_DUTY_CYCLE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON document")]
    InvalidJson,
    #[error("document exceeds buffer size")]
    MessageTooLarge,
    #[error("serialization failed")]
    SerializationError,
}

/// One curve slot as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub temperature: u8,
    pub duty_cycle: u8,
}

/// Per-fan configuration entry. `fan` is the raw 1-based index, validated by
/// the bank; absent fields leave the corresponding attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanConfigEntry {
    pub fan: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_temperature_timeout_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed_thresholds: Option<Vec<CurvePoint>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_fan_telemetry_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fans: Option<Vec<FanConfigEntry>>,
}

/// Per-fan command entry. A duty cycle of 0 reverts to automatic control; an
/// external temperature of 0 cancels the override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanCommandEntry {
    pub fan: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_temperature: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fans: Option<Vec<FanCommandEntry>>,
}

/// Envelope used by transports that carry both document kinds on one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Config(ConfigDocument),
    Command(CommandDocument),
}

/// Outcome summary for one ingested document. `skipped` counts entries and
/// fields rejected by validation; the rest of the batch still applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub applied: u32,
    pub skipped: u32,
}

impl IngestReport {
    pub fn record_applied(&mut self) {
        self.applied += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

/// Parse and serialize documents through preallocated buffers.
#[derive(Debug, Default)]
pub struct ProtocolHandler {
    document_buffer: DocumentBuffer,
    telemetry_buffer: TelemetryBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_config(&mut self, json_str: &str) -> Result<ConfigDocument, ProtocolError> {
        self.buffer_document(json_str)?;
        serde_json::from_str(json_str).map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn parse_command(&mut self, json_str: &str) -> Result<CommandDocument, ProtocolError> {
        self.buffer_document(json_str)?;
        serde_json::from_str(json_str).map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn parse_request(&mut self, json_str: &str) -> Result<Request, ProtocolError> {
        self.buffer_document(json_str)?;
        serde_json::from_str(json_str).map_err(|_| ProtocolError::InvalidJson)
    }

    /// Serialize a telemetry snapshot. The returned slice borrows the
    /// handler's buffer and is valid until the next serialize call.
    pub fn serialize_telemetry(
        &mut self,
        snapshot: &[crate::telemetry::FanTelemetry],
    ) -> Result<&str, ProtocolError> {
        self.telemetry_buffer.clear();

        let json_str =
            serde_json::to_string(snapshot).map_err(|_| ProtocolError::SerializationError)?;

        if json_str.len() > MAX_TELEMETRY_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.telemetry_buffer.push_str(&json_str);

        Ok(&self.telemetry_buffer)
    }

    pub fn serialize_report(&mut self, report: &IngestReport) -> Result<&str, ProtocolError> {
        self.document_buffer.clear();

        let json_str =
            serde_json::to_string(report).map_err(|_| ProtocolError::SerializationError)?;

        if json_str.len() > MAX_DOCUMENT_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.document_buffer.push_str(&json_str);

        Ok(&self.document_buffer)
    }

    fn buffer_document(&mut self, json_str: &str) -> Result<(), ProtocolError> {
        self.document_buffer.clear();
        if json_str.len() > MAX_DOCUMENT_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }
        self.document_buffer.push_str(json_str);
        Ok(())
    }
}
