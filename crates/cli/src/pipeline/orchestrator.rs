//! Pipeline orchestrator - coordinates all components.
//!
//! StypeReceiver -> (async-channel) -> orchestrator -> (mpsc) -> Dispatcher -> sinks

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{SessionBlueprint, TrackingFrame};
use dispatcher::SinkMetrics;
use ingestion::StypeReceiver;
use observability::metrics::{
    record_frames_dispatched, record_queue_depth, record_tracking_frame,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Frames between two sink metric reports
const REPORT_INTERVAL: u64 = 100;

/// Why the pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown signal (Ctrl-C / SIGTERM)
    Signal,
    /// `max_frames` reached
    MaxFrames,
    /// Timeout elapsed
    Timeout,
    /// Receiver or dispatcher closed
    Closed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::MaxFrames => write!(f, "max frames reached"),
            Self::Timeout => write!(f, "timeout"),
            Self::Closed => write!(f, "input closed"),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The session blueprint
    pub blueprint: SessionBlueprint,

    /// Maximum number of frames to publish (None = unlimited)
    pub max_frames: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, a limit is hit, or the receiver closes
    #[instrument(name = "pipeline_run", skip_all, fields(port = self.config.blueprint.receiver.port))]
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        // Dispatcher
        let (frame_tx, frame_rx) =
            mpsc::channel::<TrackingFrame>(blueprint.receiver.channel_capacity);
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - frames will only be counted");
        }
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), frame_rx)
            .await
            .context("Failed to create dispatcher")?;
        let sink_metrics = dispatcher.sink_metrics();
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = sink_metrics.len(), "Dispatcher started");

        // Receiver
        let mut receiver = StypeReceiver::new(blueprint.receiver.clone(), blueprint.timing.clone())
            .spawn()
            .await
            .with_context(|| {
                format!(
                    "Failed to start receiver on {}",
                    blueprint.receiver.socket_address()
                )
            })?;
        let frames = receiver
            .take_frames()
            .ok_or_else(|| CliError::pipeline_execution("receiver frame stream unavailable"))?;

        info!(
            addr = %receiver.local_addr(),
            subject = %blueprint.receiver.subject_name,
            max_frames = ?self.config.max_frames,
            timeout = ?self.config.timeout,
            "Pipeline running"
        );

        let mut stats = PipelineStats {
            active_sinks: sink_metrics.len(),
            ..Default::default()
        };
        let mut reporter = SinkReporter::new(sink_metrics);

        let deadline = self
            .config
            .timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let timeout_elapsed = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(timeout_elapsed);

        let mut last_status = receiver.status();
        let reason = loop {
            let frame = tokio::select! {
                _ = &mut shutdown => break StopReason::Signal,
                _ = &mut timeout_elapsed => break StopReason::Timeout,
                received = frames.recv() => match received {
                    Ok(frame) => frame,
                    Err(_) => break StopReason::Closed,
                },
            };

            let status = receiver.status();
            if status != last_status {
                info!(%status, "Receiver status changed");
                last_status = status;
            }

            stats.frames_received += 1;
            record_tracking_frame(&frame);
            stats.timing_metrics.update(&frame);

            debug!(
                package_no = frame.package_no,
                timecode = %frame.timecode,
                scene_time = %frame.scene_time,
                timing_valid = frame.timing_valid,
                "Tracking frame received"
            );

            if frame_tx.send(frame).await.is_err() {
                warn!("Dispatcher channel closed");
                break StopReason::Closed;
            }

            if stats.frames_received.is_multiple_of(REPORT_INTERVAL) {
                reporter.report();
            }

            if self
                .config
                .max_frames
                .is_some_and(|max| stats.frames_received >= max)
            {
                info!(frames = stats.frames_received, "Reached max frames limit");
                break StopReason::MaxFrames;
            }
        };

        // Shutdown
        info!(%reason, "Shutting down pipeline...");
        stats.stop_reason = Some(reason);
        stats.final_timing = receiver.timing_snapshot();
        stats.lens_static = receiver.lens_static();
        stats.ingestion = receiver.metrics().snapshot();
        receiver.shutdown().await;

        // Closing the channel lets the dispatcher drain and flush its sinks
        drop(frame_tx);
        if tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .is_err()
        {
            warn!("Dispatcher did not finish within 5s");
        }

        reporter.report();
        stats.sinks = reporter.snapshots();
        stats.duration = start_time.elapsed();

        info!(
            frames = stats.frames_received,
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Publishes per-sink dispatch counters as deltas since the last report
struct SinkReporter {
    sinks: Vec<(String, Arc<SinkMetrics>)>,
    reported: Vec<(u64, u64)>,
}

impl SinkReporter {
    fn new(sinks: Vec<(String, Arc<SinkMetrics>)>) -> Self {
        let reported = vec![(0, 0); sinks.len()];
        Self { sinks, reported }
    }

    fn report(&mut self) {
        for ((name, metrics), reported) in self.sinks.iter().zip(self.reported.iter_mut()) {
            let written = metrics.write_count();
            let failed = metrics.failure_count();
            record_frames_dispatched(name, true, written.saturating_sub(reported.0));
            record_frames_dispatched(name, false, failed.saturating_sub(reported.1));
            record_queue_depth(name, metrics.queue_len());
            *reported = (written, failed);
        }
    }

    fn snapshots(&self) -> Vec<(String, dispatcher::MetricsSnapshot)> {
        self.sinks
            .iter()
            .map(|(name, metrics)| (name.clone(), metrics.snapshot()))
            .collect()
    }
}
