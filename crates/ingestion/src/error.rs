//! Ingestion error types

use std::net::SocketAddr;

use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Datagram is not a Stype HF packet
    #[error("invalid packet size: expected {expected} bytes, got {actual}")]
    InvalidSize {
        /// Stype HF packet size
        expected: usize,
        /// Received datagram size
        actual: usize,
    },

    /// Header byte mismatch
    #[error("invalid packet header 0x{found:02X}")]
    InvalidHeader {
        /// Header byte found
        found: u8,
    },

    /// Checksum mismatch
    #[error("checksum mismatch: computed 0x{computed:02X}, packet carries 0x{carried:02X}")]
    ChecksumMismatch {
        /// Wrapping sum of the payload
        computed: u8,
        /// Trailing checksum byte
        carried: u8,
    },

    /// UDP socket could not be bound
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Simulation target unreachable
    #[error("failed to send to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Frame channel closed
    #[error("frame channel closed for subject {subject}")]
    ChannelClosed {
        /// Subject name
        subject: String,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSize { .. } => "size",
            Self::InvalidHeader { .. } => "header",
            Self::ChecksumMismatch { .. } => "checksum",
            Self::Bind { .. } => "bind",
            Self::Send { .. } => "send",
            Self::ChannelClosed { .. } => "channel_closed",
            Self::Io(_) => "io",
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
