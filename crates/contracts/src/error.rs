//! Layered error definitions
//!
//! Categorized by source: config / packet / timing / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Packet Errors =====
    /// Wire packet could not be decoded
    #[error("packet decode error: {message}")]
    PacketDecode { message: String },

    // ===== Timing Errors =====
    /// Frame rate rejected (zero, malformed, or beyond the timecode field range)
    #[error("invalid frame rate {numerator}/{denominator}: {message}")]
    InvalidFrameRate {
        numerator: u32,
        denominator: u32,
        message: String,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create packet decode error
    pub fn packet_decode(message: impl Into<String>) -> Self {
        Self::PacketDecode {
            message: message.into(),
        }
    }

    /// Create invalid frame rate error
    pub fn invalid_frame_rate(rate: crate::FrameRate, message: impl Into<String>) -> Self {
        Self::InvalidFrameRate {
            numerator: rate.numerator,
            denominator: rate.denominator,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
