//! Fallback frame rate shared between the receive loop and configuration updates.

use std::sync::Arc;

use contracts::{ContractError, FrameRate, MAX_TIMECODE_RATE};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Rate used to qualify raw timecode while timing estimation is not valid.
///
/// Cloning shares the same underlying value.
#[derive(Debug, Clone, Default)]
pub struct FallbackRate {
    inner: Arc<Mutex<FrameRate>>,
}

impl FallbackRate {
    /// Create a handle; an unacceptable `rate` falls back to the default 60 fps
    pub fn new(rate: FrameRate) -> Self {
        let handle = Self::default();
        if let Err(err) = handle.set(rate) {
            warn!(error = %err, "fallback rate rejected, using default");
        }
        handle
    }

    /// Current rate
    pub fn get(&self) -> FrameRate {
        *self.inner.lock()
    }

    /// Replace the rate. Rejected rates leave the previous value in place.
    ///
    /// # Errors
    /// `InvalidFrameRate` if `rate` is malformed or above what the timecode
    /// frames field can count.
    pub fn set(&self, rate: FrameRate) -> Result<(), ContractError> {
        if !rate.is_valid() {
            return Err(ContractError::invalid_frame_rate(
                rate,
                "numerator and denominator must be positive",
            ));
        }
        if rate.as_decimal() > f64::from(MAX_TIMECODE_RATE) {
            return Err(ContractError::invalid_frame_rate(
                rate,
                format!("exceeds {MAX_TIMECODE_RATE} fps timecode limit"),
            ));
        }

        *self.inner.lock() = rate;
        debug!(%rate, "fallback rate updated");
        Ok(())
    }
}
