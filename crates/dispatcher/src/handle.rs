//! SinkHandle - one sink behind its own bounded queue and worker task
//!
//! The worker writes frames in arrival order and flushes buffered sinks
//! whenever the queue has been idle for a flush interval, so a JSON-lines
//! recording stays readable while the camera is still streaming.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{DataSink, TrackingFrame};

use crate::metrics::SinkMetrics;

/// Idle time after which pending writes are flushed
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of offering a frame to a sink queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame accepted by the queue
    Queued,
    /// Queue full, frame dropped (newest)
    Dropped,
    /// Worker gone
    Closed,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<TrackingFrame>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn a worker for `sink` with the default flush interval
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        Self::spawn_with_flush_interval(sink, queue_capacity, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn spawn_with_flush_interval<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        flush_interval: Duration,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = tokio::spawn(SinkWorker::new(sink, Arc::clone(&metrics)).run(rx, flush_interval));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Offer a frame without waiting; a full queue drops it.
    pub fn try_send(&self, frame: TrackingFrame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Delivery::Queued
            }
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.metrics.inc_dropped_count();
                trace!(
                    sink = %self.name,
                    package_no = frame.package_no,
                    scene_frame = frame.scene_time.frame_number,
                    "sink queue full, frame dropped"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker stopped unexpectedly");
                Delivery::Closed
            }
        }
    }

    /// Close the queue and wait until the worker has drained, flushed and
    /// closed its sink.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
    }
}

struct SinkWorker<S> {
    sink: S,
    metrics: Arc<SinkMetrics>,
    /// Writes since the last flush
    unflushed: usize,
    /// Consecutive failed writes
    failure_streak: u64,
}

impl<S: DataSink> SinkWorker<S> {
    fn new(sink: S, metrics: Arc<SinkMetrics>) -> Self {
        Self {
            sink,
            metrics,
            unflushed: 0,
            failure_streak: 0,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<TrackingFrame>, flush_interval: Duration) {
        debug!(sink = %self.sink.name(), "sink worker started");

        loop {
            match tokio::time::timeout(flush_interval, rx.recv()).await {
                Ok(Some(frame)) => {
                    self.metrics.set_queue_len(rx.len());
                    self.write(&frame).await;
                }
                Ok(None) => break,
                Err(_) => self.flush().await,
            }
        }

        self.flush().await;
        if let Err(e) = self.sink.close().await {
            error!(sink = %self.sink.name(), error = %e, "sink close failed");
        }
        debug!(
            sink = %self.sink.name(),
            written = self.metrics.write_count(),
            failed = self.metrics.failure_count(),
            "sink worker stopped"
        );
    }

    async fn write(&mut self, frame: &TrackingFrame) {
        match self.sink.write(frame).await {
            Ok(()) => {
                self.metrics.record_written(frame);
                self.unflushed += 1;
                if self.failure_streak > 0 {
                    info!(
                        sink = %self.sink.name(),
                        failed_writes = self.failure_streak,
                        "sink recovered"
                    );
                    self.failure_streak = 0;
                }
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                self.failure_streak += 1;
                // Only the first failure of a streak is loud
                if self.failure_streak == 1 {
                    warn!(
                        sink = %self.sink.name(),
                        package_no = frame.package_no,
                        error = %e,
                        "sink write failed"
                    );
                } else {
                    trace!(sink = %self.sink.name(), error = %e, "sink write failed");
                }
            }
        }
    }

    async fn flush(&mut self) {
        if self.unflushed == 0 {
            return;
        }
        match self.sink.flush().await {
            Ok(()) => {
                trace!(sink = %self.sink.name(), frames = self.unflushed, "sink flushed");
                self.unflushed = 0;
            }
            Err(e) => error!(sink = %self.sink.name(), error = %e, "sink flush failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ContractError;
    use std::sync::Mutex;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Recorded {
        package_nos: Vec<u8>,
        flushes: usize,
        closed: bool,
    }

    /// Sink recording what it was asked to do
    struct RecordingSink {
        recorded: Arc<Mutex<Recorded>>,
        /// Fail writes of these packet numbers
        fail_on: Vec<u8>,
        delay: Duration,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Recorded>>) {
            let recorded = Arc::new(Mutex::new(Recorded::default()));
            let sink = Self {
                recorded: Arc::clone(&recorded),
                fail_on: Vec::new(),
                delay: Duration::ZERO,
            };
            (sink, recorded)
        }
    }

    impl DataSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn write(&mut self, frame: &TrackingFrame) -> Result<(), ContractError> {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail_on.contains(&frame.package_no) {
                return Err(ContractError::sink_write("recording", "rejected"));
            }
            self.recorded.lock().unwrap().package_nos.push(frame.package_no);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.recorded.lock().unwrap().flushes += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.recorded.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn frame(package_no: u8) -> TrackingFrame {
        TrackingFrame {
            subject: "Camera".to_string(),
            package_no,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_frames_written_in_order_then_closed() {
        let (sink, recorded) = RecordingSink::new();
        let handle = SinkHandle::spawn(sink, 16);

        for package_no in [250, 251, 252, 253, 254, 255, 0, 1] {
            assert_eq!(handle.try_send(frame(package_no)), Delivery::Queued);
        }
        handle.shutdown().await;

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.package_nos, vec![250, 251, 252, 253, 254, 255, 0, 1]);
        assert_eq!(recorded.flushes, 1, "one final flush");
        assert!(recorded.closed);
    }

    #[tokio::test]
    async fn test_idle_queue_is_flushed() {
        let (sink, recorded) = RecordingSink::new();
        let handle = SinkHandle::spawn_with_flush_interval(sink, 16, Duration::from_millis(20));

        handle.try_send(frame(1));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(recorded.lock().unwrap().flushes, 1);

        // Nothing new to flush on shutdown
        handle.shutdown().await;
        assert_eq!(recorded.lock().unwrap().flushes, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (mut sink, recorded) = RecordingSink::new();
        sink.delay = Duration::from_millis(50);
        let handle = SinkHandle::spawn(sink, 2);

        let outcomes: Vec<_> = (0..10).map(|i| handle.try_send(frame(i))).collect();
        assert!(outcomes.contains(&Delivery::Dropped));

        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        let written = recorded.lock().unwrap().package_nos.len() as u64;
        assert_eq!(metrics.write_count(), written);
        assert_eq!(
            written + metrics.dropped_count(),
            10,
            "every frame is either written or counted as dropped"
        );
        // Survivors are the oldest frames
        assert_eq!(recorded.lock().unwrap().package_nos[0], 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let (mut sink, recorded) = RecordingSink::new();
        sink.fail_on = vec![1, 2];
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..5 {
            handle.try_send(frame(i));
        }
        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        assert_eq!(metrics.failure_count(), 2);
        assert_eq!(metrics.write_count(), 3);
        assert_eq!(recorded.lock().unwrap().package_nos, vec![0, 3, 4]);
    }
}
