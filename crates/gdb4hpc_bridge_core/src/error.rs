use std::time::Duration;
use thiserror::Error;

use crate::ranges::RangeError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn debugger '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Command channel closed")]
    ChannelClosed,

    #[error("Timed out after {timeout:?} waiting for '{command}'")]
    Timeout { command: String, timeout: Duration },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Response to '{command}' is missing '{field}'")]
    MissingField { command: String, field: String },

    #[error("Invalid rank range: {0}")]
    InvalidRange(#[from] RangeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl BridgeError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(command: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            command: command.into(),
            field: field.into(),
        }
    }
}
