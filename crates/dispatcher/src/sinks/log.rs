//! LogSink - logs frame summary via tracing

use contracts::{ContractError, DataSink, TrackingFrame};
use tracing::{info, instrument};

/// Sink that logs frame summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_frame_summary(&self, frame: &TrackingFrame) {
        let location = frame.transform.location;

        info!(
            sink = %self.name,
            subject = %frame.subject,
            package_no = frame.package_no,
            timecode = %frame.timecode,
            scene_time = %frame.scene_time,
            timing_valid = frame.timing_valid,
            x = location.x,
            y = location.y,
            z = location.z,
            focal_length = frame.lens.focal_length,
            "TrackingFrame received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, package_no = frame.package_no)
    )]
    async fn write(&mut self, frame: &TrackingFrame) -> Result<(), ContractError> {
        self.log_frame_summary(frame);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
