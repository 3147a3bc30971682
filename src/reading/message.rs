use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::SensorReading;

/// The envelope published once per sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub data: SensorReading,

    pub device_id: String,

    #[serde(with = "super::timestamp")]
    pub time: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has an empty device_id")]
    EmptyDeviceId,
}

impl Message {
    /// Parses and validates an inbound payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ParseError> {
        let message: Message = serde_json::from_slice(payload)?;
        if message.device_id.trim().is_empty() {
            return Err(ParseError::EmptyDeviceId);
        }

        Ok(message)
    }

    /// Compact JSON with stable key order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
