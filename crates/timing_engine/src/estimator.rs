//! Timing estimator: timecode rate, sample rate and qualified frame time.
//!
//! The device never announces its timecode rate nor its packet rate. Both are
//! recovered from the stream itself:
//!
//! - the timecode frames field wraps to zero once per second, so its modulus is
//!   the timecode rate, and each wrap marks a second boundary;
//! - the number of packets between two second boundaries is the sample rate.
//!
//! A boundary is only trusted (verified) when the packets counted since the
//! previous boundary are a whole multiple of the confirmed sample rate. The frame
//! time is then `verified boundary timecode + packets since that boundary`,
//! counted through the wrapping packet number so that lost packets do not
//! shift it.

use std::collections::HashSet;

use contracts::{FrameRate, QualifiedFrameTime, Timecode, TimingConfig};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::agreement::AgreementEstimator;
use crate::overflow::OverflowRateInferrer;

/// Packets elapsed from `last` to `current` on the 8-bit wrapping counter.
///
/// Correct across at most one wrap: 250 -> 2 is 8, 1 -> 10 is 9. Equal values
/// count as no elapsed packet.
#[inline]
pub fn elapsed_sequence(last: u8, current: u8) -> u32 {
    u32::from(current.wrapping_sub(last))
}

/// Read-only view of the estimator internals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSnapshot {
    pub last_package_no: u8,
    pub packets_since_last_overflow: u32,
    pub timecode_at_last_overflow: Timecode,
    pub verified_packets_since_last_overflow: u32,
    pub verified_timecode_at_last_overflow: Timecode,
    pub timecode_rate: u8,
    pub timecode_rate_confirmed: bool,
    pub sample_rate: u32,
    pub sample_rate_confirmed: bool,
    pub qualified_frame_time: QualifiedFrameTime,
}

/// Outcome of a second boundary, for logging/metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// No boundary on this packet
    None,
    /// Packet count consistent with the sample rate, anchor moved
    Verified,
    /// Packet count inconsistent (or rate unknown), anchor kept
    Distrusted,
}

/// Qualified frame time estimator for one device stream.
///
/// Owns its nested estimators; not internally synchronized.
#[derive(Debug, Clone)]
pub struct TimingEstimator {
    /// Packet number given to the previous `update`
    last_package_no: u8,
    /// Packets since the last timecode overflow
    packets_since_last_overflow: u32,
    /// Timecode at the last overflow; its frames field is zero
    timecode_at_last_overflow: Timecode,
    /// Packets since the last verified overflow
    verified_packets_since_last_overflow: u32,
    /// Timecode at the last verified overflow; its frames field is zero
    verified_timecode_at_last_overflow: Timecode,
    /// Cached result of the last update
    qualified_frame_time: QualifiedFrameTime,
    /// Timecode rate inferred from frames-field wraparound
    timecode_rate: OverflowRateInferrer<u8>,
    /// Packets per second, sampled at each overflow
    sample_rate: AgreementEstimator<u32>,
}

impl TimingEstimator {
    pub fn new(config: &TimingConfig) -> Self {
        let mut timecode_rate = OverflowRateInferrer::new(
            config.timecode_rate_min_agreement,
            config.default_timecode_rate,
        );
        timecode_rate.set_allowed_values(config.valid_timecode_rates.iter().copied().collect());

        let mut sample_rate =
            AgreementEstimator::new(config.sample_rate_min_agreement, config.default_sample_rate);
        sample_rate.set_allowed_values(config.valid_sample_rates.iter().copied().collect());

        Self {
            last_package_no: 0,
            packets_since_last_overflow: 0,
            timecode_at_last_overflow: Timecode::default(),
            verified_packets_since_last_overflow: 0,
            verified_timecode_at_last_overflow: Timecode::default(),
            qualified_frame_time: QualifiedFrameTime::new(
                0,
                FrameRate::from_fps(config.default_sample_rate),
            ),
            timecode_rate,
            sample_rate,
        }
    }

    /// Update the estimation with the timing fields of a new packet.
    #[instrument(
        level = "trace",
        name = "timing_estimator_update",
        skip(self, timecode),
        fields(timecode = %timecode)
    )]
    pub fn update(&mut self, package_no: u8, timecode: &Timecode) {
        let was_valid = self.is_valid();
        let previous_rates = (self.timecode_rate.estimate(), self.sample_rate.estimate());

        self.infer_timecode_rate(timecode);
        let boundary = self.infer_sample_rate(package_no);
        self.update_frame_time();

        self.last_package_no = package_no;

        self.report(boundary, was_valid, previous_rates);
    }

    fn infer_timecode_rate(&mut self, timecode: &Timecode) {
        self.timecode_rate.update(timecode.frames);

        // Overflows are tracked even before the rate is known.
        if self.timecode_rate.overflowed() {
            self.timecode_at_last_overflow = *timecode;
        }
    }

    fn infer_sample_rate(&mut self, package_no: u8) -> Boundary {
        // Runs before the timecode rate is known to converge faster.
        let elapsed = elapsed_sequence(self.last_package_no, package_no);
        self.packets_since_last_overflow = self.packets_since_last_overflow.saturating_add(elapsed);
        self.verified_packets_since_last_overflow = self
            .verified_packets_since_last_overflow
            .saturating_add(elapsed);

        // Only an overflow guarantees a whole number of seconds has elapsed.
        if !self.timecode_rate.overflowed() {
            return Boundary::None;
        }

        let packets = self.packets_since_last_overflow;
        self.sample_rate.update(packets);
        self.packets_since_last_overflow = 0;

        // A count that is not a multiple of the rate means an overflow packet was
        // probably missed; keep extrapolating from the last good anchor.
        let consistent = self.sample_rate.is_confirmed()
            && packets.checked_rem(self.sample_rate.estimate()) == Some(0);

        if consistent {
            self.verified_timecode_at_last_overflow = self.timecode_at_last_overflow;
            self.verified_packets_since_last_overflow = 0;
            Boundary::Verified
        } else {
            trace!(packets, sample_rate = self.sample_rate.estimate(), "boundary not verified");
            Boundary::Distrusted
        }
    }

    fn update_frame_time(&mut self) {
        let frame_rate = FrameRate::from_fps(self.sample_rate.estimate());

        // The anchor's frames field is zero, so expressing it at the packet rate
        // rather than the timecode rate is exact.
        debug_assert_eq!(self.verified_timecode_at_last_overflow.frames, 0);

        let frame_number = self
            .verified_timecode_at_last_overflow
            .to_frame_number(frame_rate)
            + u64::from(self.verified_packets_since_last_overflow);

        self.qualified_frame_time = QualifiedFrameTime::new(frame_number, frame_rate);
    }

    fn report(&self, boundary: Boundary, was_valid: bool, previous_rates: (u8, u32)) {
        match boundary {
            Boundary::None => {}
            Boundary::Verified => {
                metrics::counter!("stype_timing_boundaries_total", "status" => "verified")
                    .increment(1);
                debug!(
                    anchor = %self.verified_timecode_at_last_overflow,
                    sample_rate = self.sample_rate.estimate(),
                    "second boundary verified"
                );
            }
            Boundary::Distrusted => {
                metrics::counter!("stype_timing_boundaries_total", "status" => "distrusted")
                    .increment(1);
                if self.sample_rate.is_confirmed() {
                    debug!(
                        timecode = %self.timecode_at_last_overflow,
                        sample_rate = self.sample_rate.estimate(),
                        "second boundary distrusted"
                    );
                }
            }
        }

        let rates = (self.timecode_rate.estimate(), self.sample_rate.estimate());
        if rates != previous_rates {
            metrics::gauge!("stype_timing_timecode_rate").set(f64::from(rates.0));
            metrics::gauge!("stype_timing_sample_rate").set(f64::from(rates.1));
            debug!(
                timecode_rate = rates.0,
                sample_rate = rates.1,
                "rate estimation changed"
            );
        }

        if !was_valid && self.is_valid() {
            debug!(
                timecode_rate = rates.0,
                sample_rate = rates.1,
                frame_time = %self.qualified_frame_time,
                "timing estimation valid"
            );
        }
    }

    /// Last computed frame time, valid or not
    pub fn qualified_frame_time(&self) -> QualifiedFrameTime {
        self.qualified_frame_time
    }

    /// Both the timecode rate and the sample rate are confirmed
    pub fn is_valid(&self) -> bool {
        self.timecode_rate.is_confirmed() && self.sample_rate.is_confirmed()
    }

    pub fn timecode_rate_estimate(&self) -> u8 {
        self.timecode_rate.estimate()
    }

    pub fn sample_rate_estimate(&self) -> u32 {
        self.sample_rate.estimate()
    }

    pub fn set_valid_timecode_rates(&mut self, rates: HashSet<u8>) {
        self.timecode_rate.set_allowed_values(rates);
    }

    pub fn set_valid_sample_rates(&mut self, rates: HashSet<u32>) {
        self.sample_rate.set_allowed_values(rates);
    }

    /// Forget everything learned from the stream. Allowed rates are kept.
    pub fn reset(&mut self) {
        self.timecode_rate.reset();
        self.sample_rate.reset();

        self.last_package_no = 0;
        self.packets_since_last_overflow = 0;
        self.timecode_at_last_overflow = Timecode::default();
        self.verified_packets_since_last_overflow = 0;
        self.verified_timecode_at_last_overflow = Timecode::default();
        self.update_frame_time();
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            last_package_no: self.last_package_no,
            packets_since_last_overflow: self.packets_since_last_overflow,
            timecode_at_last_overflow: self.timecode_at_last_overflow,
            verified_packets_since_last_overflow: self.verified_packets_since_last_overflow,
            verified_timecode_at_last_overflow: self.verified_timecode_at_last_overflow,
            timecode_rate: self.timecode_rate.estimate(),
            timecode_rate_confirmed: self.timecode_rate.is_confirmed(),
            sample_rate: self.sample_rate.estimate(),
            sample_rate_confirmed: self.sample_rate.is_confirmed(),
            qualified_frame_time: self.qualified_frame_time,
        }
    }
}

impl Default for TimingEstimator {
    fn default() -> Self {
        Self::new(&TimingConfig::default())
    }
}
