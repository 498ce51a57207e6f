//! # Timing Engine
//!
//! Qualified frame time estimation for Stype tracking samples.
//!
//! Responsibilities:
//! - infer the timecode rate from frames-field wraparound
//! - infer the sample (packet) rate from packets counted between second boundaries
//! - cross-validate each boundary against the sample rate
//! - extrapolate a loss-tolerant frame time from the last verified boundary
//!
//! ## Usage
//!
//! ```ignore
//! use timing_engine::{TimingConfig, TimingEstimator};
//!
//! let mut estimator = TimingEstimator::new(&TimingConfig::default());
//!
//! // For every decoded packet
//! estimator.update(packet.package_no, &packet.timecode);
//! if estimator.is_valid() {
//!     let time = estimator.qualified_frame_time();
//! }
//! ```

mod agreement;
mod estimator;
mod overflow;

pub use agreement::AgreementEstimator;
pub use estimator::{elapsed_sequence, TimingEstimator, TimingSnapshot};
pub use overflow::{Counter, OverflowRateInferrer};

// Re-export contracts types
pub use contracts::{FrameRate, QualifiedFrameTime, Timecode, TimingConfig};
