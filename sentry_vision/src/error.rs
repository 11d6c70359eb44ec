//! Error types for the vision crate

use std::time::Duration;

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised while wrapping raw capture buffers
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame buffer holds {actual} bytes, expected {expected} for {width}x{height} BGR")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame dimensions must be non-zero, got {width}x{height}")]
    Empty { width: u32, height: u32 },
}

/// Failure to hand a command from the capture context to the network context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Command queue stayed full for {0:?}; command dropped")]
    Timeout(Duration),

    #[error("Command queue is full and the caller cannot block; command dropped")]
    Full,

    #[error("Network loop is not running; command dropped")]
    Closed,
}

/// Wire format errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(serde_json::Error),

    #[error("Servo angle {0} is outside 0..=180")]
    AngleOutOfRange(i64),
}
