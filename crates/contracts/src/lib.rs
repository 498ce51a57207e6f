//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - The device carries a wrapping 8-bit packet counter and an SMPTE-style timecode
//!   whose rate is not announced on the wire
//! - `QualifiedFrameTime` is the absolute frame count published downstream, always
//!   paired with the rate it is expressed in

mod blueprint;
mod error;
mod sink;
mod timing;
mod timing_config;
mod tracking;

pub use blueprint::*;
pub use error::*;
pub use sink::*;
pub use timing::*;
pub use timing_config::*;
pub use tracking::*;
