//! Pipeline statistics and metrics.

use std::fmt;
use std::time::Duration;

use contracts::LensStaticData;
use observability::TimingMetricsAggregator;
use timing_engine::TimingSnapshot;

use super::StopReason;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frames received from the receiver
    pub frames_received: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of configured sinks
    pub active_sinks: usize,

    /// Why the run ended
    pub stop_reason: Option<StopReason>,

    /// Receiver counters at shutdown
    pub ingestion: ingestion::MetricsSnapshot,

    /// Per-sink counters after the dispatcher drained
    pub sinks: Vec<(String, dispatcher::MetricsSnapshot)>,

    /// Estimator state after the last packet
    pub final_timing: Option<TimingSnapshot>,

    /// Last published lens static data
    pub lens_static: Option<LensStaticData>,

    /// Scene time aggregation
    pub timing_metrics: TimingMetricsAggregator,
}

impl PipelineStats {
    /// Frames per second throughput
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of received datagrams the codec rejected, in percent
    pub fn reject_rate(&self) -> f64 {
        if self.ingestion.datagrams_received > 0 {
            self.ingestion.decode_errors as f64 / self.ingestion.datagrams_received as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Pipeline Statistics ===")?;
        writeln!(f, "Duration: {:.2}s", self.duration.as_secs_f64())?;
        if let Some(reason) = self.stop_reason {
            writeln!(f, "Stopped by: {reason}")?;
        }
        writeln!(f, "Frames received: {}", self.frames_received)?;
        writeln!(f, "FPS: {:.2}", self.fps())?;
        writeln!(
            f,
            "Datagrams: {} received, {} decoded, {} rejected ({:.2}%), {} dropped",
            self.ingestion.datagrams_received,
            self.ingestion.packets_decoded,
            self.ingestion.decode_errors,
            self.reject_rate(),
            self.ingestion.frames_dropped
        )?;

        if let Some(timing) = &self.final_timing {
            writeln!(f)?;
            writeln!(f, "=== Timing Estimate ===")?;
            writeln!(
                f,
                "Timecode rate: {} fps ({})",
                timing.timecode_rate,
                confirmation(timing.timecode_rate_confirmed)
            )?;
            writeln!(
                f,
                "Sample rate: {} Hz ({})",
                timing.sample_rate,
                confirmation(timing.sample_rate_confirmed)
            )?;
            writeln!(f, "Scene time: {}", timing.qualified_frame_time)?;
        }

        if let Some(lens) = &self.lens_static {
            writeln!(
                f,
                "Film back: {:.2} x {:.2} mm (focus distance {})",
                lens.film_back_width,
                lens.film_back_height,
                if lens.focus_distance_supported {
                    "supported"
                } else {
                    "unsupported"
                }
            )?;
        }

        writeln!(f)?;
        write!(f, "{}", self.timing_metrics.summary())?;

        if !self.sinks.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Sinks ({}) ===", self.active_sinks)?;
            for (name, snapshot) in &self.sinks {
                writeln!(f, "{name}: {snapshot}")?;
            }
        }
        Ok(())
    }
}

fn confirmation(confirmed: bool) -> &'static str {
    if confirmed {
        "confirmed"
    } else {
        "estimating"
    }
}
