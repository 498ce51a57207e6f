//! Timing estimator and receiver configuration contracts shared across crates.

use serde::{Deserialize, Serialize};

use crate::FrameRate;

/// Broadcast-standard rates the device can run at.
///
/// Higher rates are not representable in the 7-bit timecode frames field.
pub const BROADCAST_RATES: [u8; 11] = [24, 25, 30, 48, 50, 60, 72, 75, 96, 100, 120];

/// Largest frame rate the timecode frames field can express
pub const MAX_TIMECODE_RATE: u32 = 127;

/// Timing estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Consecutive agreeing overflows before the timecode rate is accepted
    #[serde(default = "default_min_agreement")]
    pub timecode_rate_min_agreement: u32,

    /// Consecutive agreeing packet counts before the sample rate is accepted
    #[serde(default = "default_min_agreement")]
    pub sample_rate_min_agreement: u32,

    /// Timecode rate reported before one has been confirmed
    #[serde(default = "default_timecode_rate")]
    pub default_timecode_rate: u8,

    /// Sample rate used for frame time reconstruction before one has been confirmed
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: u32,

    /// Confirmable timecode rates (empty = unrestricted)
    #[serde(default = "default_valid_timecode_rates")]
    pub valid_timecode_rates: Vec<u8>,

    /// Confirmable sample rates (empty = unrestricted)
    #[serde(default = "default_valid_sample_rates")]
    pub valid_sample_rates: Vec<u32>,

    /// Rate used to qualify raw timecode while the estimator is not valid
    #[serde(default)]
    pub default_frame_rate: FrameRate,
}

fn default_min_agreement() -> u32 {
    2
}

fn default_timecode_rate() -> u8 {
    24
}

fn default_sample_rate() -> u32 {
    60
}

fn default_valid_timecode_rates() -> Vec<u8> {
    BROADCAST_RATES.to_vec()
}

fn default_valid_sample_rates() -> Vec<u32> {
    BROADCAST_RATES.iter().map(|&rate| u32::from(rate)).collect()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            timecode_rate_min_agreement: default_min_agreement(),
            sample_rate_min_agreement: default_min_agreement(),
            default_timecode_rate: default_timecode_rate(),
            default_sample_rate: default_sample_rate(),
            valid_timecode_rates: default_valid_timecode_rates(),
            valid_sample_rates: default_valid_sample_rates(),
            default_frame_rate: FrameRate::default(),
        }
    }
}

/// UDP receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Local address to bind
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Local UDP port the device streams to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Subject name stamped on every published frame
    #[serde(default = "default_subject_name")]
    pub subject_name: String,

    /// Capacity of the frame channel towards the dispatcher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Socket poll timeout so that stop requests are observed
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    54321
}

fn default_subject_name() -> String {
    "Camera".to_string()
}

fn default_channel_capacity() -> usize {
    100
}

fn default_recv_timeout_ms() -> u64 {
    10
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            subject_name: default_subject_name(),
            channel_capacity: default_channel_capacity(),
            recv_timeout_ms: default_recv_timeout_ms(),
        }
    }
}

impl ReceiverConfig {
    /// `bind_address:port`
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
