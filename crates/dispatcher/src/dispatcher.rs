//! Dispatcher - fans tracking frames out to every configured sink

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{SinkConfig, SinkType, TrackingFrame};

use crate::error::DispatcherError;
use crate::handle::{Delivery, SinkHandle};
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Opens every configured sink before any frame flows
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<TrackingFrame>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<TrackingFrame>) -> Self {
        Self { config, input_rx }
    }

    /// Open all sinks. Fails on the first sink that cannot be opened; sinks
    /// opened before it are shut down again.
    #[instrument(
        name = "dispatcher_build",
        skip(self),
        fields(sink_count = self.config.sinks.len())
    )]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut names = HashSet::new();
        let mut handles = Vec::with_capacity(self.config.sinks.len());

        for sink_config in &self.config.sinks {
            let opened = if names.insert(sink_config.name.as_str()) {
                open_sink(sink_config).await
            } else {
                Err(DispatcherError::DuplicateSink(sink_config.name.clone()))
            };

            match opened {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shutdown_all(handles).await;
                    return Err(e);
                }
            }
        }

        Ok(Dispatcher::with_handles(handles, self.input_rx))
    }
}

#[instrument(
    name = "dispatcher_open_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn open_sink(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            debug!(sink = %config.name, path = %sink.path().display(), "recording frames");
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    Ok(handle)
}

async fn shutdown_all(handles: Vec<SinkHandle>) {
    for handle in handles {
        handle.shutdown().await;
    }
}

/// Fan-out loop. A slow or failing sink only loses its own frames.
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<TrackingFrame>,
}

impl Dispatcher {
    /// Dispatcher over already running sink handles
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<TrackingFrame>) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Shared live metrics of every sink, readable after `spawn`
    pub fn sink_metrics(&self) -> Vec<(String, Arc<SinkMetrics>)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect()
    }

    /// Dispatch until the input channel closes, then drain and close every sink.
    #[instrument(name = "dispatcher_run", skip(self), fields(sinks = self.handles.len()))]
    pub async fn run(mut self) {
        info!(sinks = self.handles.len(), "dispatcher started");

        let mut frames: u64 = 0;
        let mut dropped: u64 = 0;

        while let Some(frame) = self.input_rx.recv().await {
            frames += 1;
            dropped += self.dispatch(frame);

            if frames.is_multiple_of(1000) {
                debug!(frames, dropped, "dispatcher progress");
            }
        }

        if dropped > 0 {
            warn!(frames, dropped, "frames dropped by full sink queues");
        }
        info!(frames, "dispatcher input closed, draining sinks");

        shutdown_all(self.handles).await;
        info!("dispatcher stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Offer `frame` to every sink, returning how many did not take it.
    fn dispatch(&self, frame: TrackingFrame) -> u64 {
        let Some((last, others)) = self.handles.split_last() else {
            return 0;
        };

        let mut missed = 0;
        for handle in others {
            if handle.try_send(frame.clone()) != Delivery::Queued {
                missed += 1;
            }
        }
        if last.try_send(frame) != Delivery::Queued {
            missed += 1;
        }
        missed
    }
}

/// Build a dispatcher from sink configurations
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<TrackingFrame>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(
        DispatcherConfig {
            sinks: sink_configs,
        },
        input_rx,
    )
    .build()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FrameRate, QualifiedFrameTime};
    use tempfile::tempdir;

    fn frame(package_no: u8) -> TrackingFrame {
        TrackingFrame {
            subject: "Camera".to_string(),
            package_no,
            scene_time: QualifiedFrameTime::new(u64::from(package_no), FrameRate::from_fps(50)),
            timing_valid: true,
            ..Default::default()
        }
    }

    fn sink(name: &str, sink_type: SinkType, params: &[(&str, String)]) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type,
            queue_capacity: 50,
            params: params
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_every_sink_sees_every_frame() {
        let (input_tx, input_rx) = mpsc::channel(10);

        let handles = vec![
            SinkHandle::spawn(LogSink::new("a"), 10),
            SinkHandle::spawn(LogSink::new("b"), 10),
        ];

        let dispatcher = Dispatcher::with_handles(handles, input_rx);
        let metrics = dispatcher.sink_metrics();
        let handle = dispatcher.spawn();

        for i in 0..5 {
            input_tx.send(frame(i)).await.unwrap();
        }

        drop(input_tx);
        handle.await.unwrap();

        for (name, sink_metrics) in metrics {
            assert_eq!(sink_metrics.write_count(), 5, "sink {name}");
            assert_eq!(sink_metrics.last_frame_number(), 4, "sink {name}");
        }
    }

    #[tokio::test]
    async fn test_no_sinks_just_counts() {
        let (input_tx, input_rx) = mpsc::channel(4);
        let handle = Dispatcher::with_handles(Vec::new(), input_rx).spawn();

        input_tx.send(frame(1)).await.unwrap();
        drop(input_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("takes").join("frames.jsonl");
        let (input_tx, input_rx) = mpsc::channel(10);

        let configs = vec![
            sink("log", SinkType::Log, &[]),
            sink(
                "recorder",
                SinkType::File,
                &[("path", path.to_string_lossy().into_owned())],
            ),
        ];

        let dispatcher = create_dispatcher(configs, input_rx).await.unwrap();
        assert_eq!(dispatcher.metrics().len(), 2);
        let handle = dispatcher.spawn();

        input_tx.send(frame(1)).await.unwrap();
        input_tx.send(frame(2)).await.unwrap();

        drop(input_tx);
        handle.await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let frames: Vec<TrackingFrame> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames, vec![frame(1), frame(2)]);
    }

    #[tokio::test]
    async fn test_network_sink_without_addr_rejected() {
        let (_input_tx, input_rx) = mpsc::channel(10);
        let configs = vec![sink("net", SinkType::Network, &[])];

        let err = create_dispatcher(configs, input_rx).await.err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { ref name, .. } if name == "net"));
    }

    #[tokio::test]
    async fn test_duplicate_sink_name_rejected() {
        let (_input_tx, input_rx) = mpsc::channel(10);
        let configs = vec![
            sink("log", SinkType::Log, &[]),
            sink("log", SinkType::Log, &[]),
        ];

        let err = create_dispatcher(configs, input_rx).await.err().unwrap();
        assert!(matches!(err, DispatcherError::DuplicateSink(ref name) if name == "log"));
    }
}
