use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::track::Track;

/// Messages sent from the poller to the coordinator, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PollerMessage {
    /// The player moved to a different track.
    Track { data: Track },
    /// The poller lost its metadata source. Fatal to the coordinator.
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message type {0}")]
    UnknownType(String),
    #[error("message has no type field")]
    MissingType,
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl PollerMessage {
    pub fn track(data: Track) -> Self {
        Self::Track { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error_message: message.into(),
        }
    }

    /// Serialise as a single newline-terminated JSON line.
    pub fn encode_line(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one line. Unknown `type` values are reported separately from
    /// malformed JSON so the receiver can log them without treating them as
    /// a broken stream.
    pub fn decode_line(line: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(line.trim())?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?;
        match kind {
            "track" | "error" => Ok(serde_json::from_value(value)?),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}
