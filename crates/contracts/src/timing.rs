//! Timecode, frame rate and qualified frame time value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SMPTE-style timecode as carried by the tracking device.
///
/// `frames` is the sub-second field; its valid range depends on the timecode
/// rate, which the device does not transmit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Whole seconds since midnight, ignoring the frames field.
    pub fn total_seconds(&self) -> u64 {
        (u64::from(self.hours) * 60 + u64::from(self.minutes)) * 60 + u64::from(self.seconds)
    }

    /// Absolute frame number at `rate` (non-drop-frame).
    ///
    /// Seconds are scaled by the rate rounded up to a whole number of frames,
    /// then the frames field is added as-is.
    pub fn to_frame_number(&self, rate: FrameRate) -> u64 {
        self.total_seconds() * u64::from(rate.frames_per_second_ceil()) + u64::from(self.frames)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Rational frame rate in frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Integer rate, `fps/1`
    pub const fn from_fps(fps: u32) -> Self {
        Self::new(fps, 1)
    }

    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    pub fn as_decimal(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            f64::from(self.numerator) / f64::from(self.denominator)
        }
    }

    /// Number of frame slots in one timecode second (29.97 -> 30).
    pub fn frames_per_second_ceil(&self) -> u32 {
        if self.denominator == 0 {
            0
        } else {
            self.numerator.div_ceil(self.denominator)
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::from_fps(60)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}fps", self.numerator)
        } else {
            write!(f, "{}/{}fps", self.numerator, self.denominator)
        }
    }
}

/// Absolute frame count paired with the rate it is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedFrameTime {
    pub frame_number: u64,
    pub frame_rate: FrameRate,
}

impl QualifiedFrameTime {
    pub fn new(frame_number: u64, frame_rate: FrameRate) -> Self {
        Self {
            frame_number,
            frame_rate,
        }
    }

    /// Frame time of `timecode` interpreted at `rate`
    pub fn from_timecode(timecode: &Timecode, rate: FrameRate) -> Self {
        Self::new(timecode.to_frame_number(rate), rate)
    }

    pub fn as_seconds(&self) -> f64 {
        let rate = self.frame_rate.as_decimal();
        if rate > 0.0 {
            self.frame_number as f64 / rate
        } else {
            0.0
        }
    }
}

impl fmt::Display for QualifiedFrameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.frame_number, self.frame_rate)
    }
}
