//! Async UDP receiver for Stype HF streams

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{LensStaticData, ReceiverConfig, TimingConfig, TrackingFrame};
use parking_lot::Mutex;
use timing_engine::TimingSnapshot;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::fallback::FallbackRate;
use crate::packet;
use crate::session::TrackingSession;

/// Larger than any datagram we accept so oversized ones are seen as such
const RECV_BUFFER_SIZE: usize = 2048;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverStatus {
    /// No valid packet received yet
    Waiting = 0,
    /// Valid packets are flowing
    Active = 1,
}

impl ReceiverStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Active,
            _ => Self::Waiting,
        }
    }
}

impl std::fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting for connection"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// State shared between the receive loop and its handle
#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    reset_requested: AtomicBool,
    status: AtomicU8,
    lens: Mutex<Option<LensStaticData>>,
    timing: Mutex<Option<TimingSnapshot>>,
}

/// Stype UDP receiver
pub struct StypeReceiver {
    config: ReceiverConfig,
    timing: TimingConfig,
    fallback: FallbackRate,
    metrics: Arc<IngestionMetrics>,
}

impl StypeReceiver {
    pub fn new(config: ReceiverConfig, timing: TimingConfig) -> Self {
        let fallback = FallbackRate::new(timing.default_frame_rate);
        Self {
            config,
            timing,
            fallback,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Share an existing fallback rate handle
    pub fn with_fallback(mut self, fallback: FallbackRate) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> FallbackRate {
        self.fallback.clone()
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Bind the socket and start the receive loop.
    ///
    /// # Errors
    /// `Bind` if the configured address cannot be bound.
    #[instrument(
        name = "stype_receiver_spawn",
        skip(self),
        fields(addr = %self.config.socket_address(), subject = %self.config.subject_name)
    )]
    pub async fn spawn(self) -> Result<ReceiverHandle> {
        let addr = self.config.socket_address();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| IngestionError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = socket.local_addr()?;

        let (tx, rx) = bounded(self.config.channel_capacity.max(1));
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            reset_requested: AtomicBool::new(false),
            status: AtomicU8::new(ReceiverStatus::Waiting as u8),
            lens: Mutex::new(None),
            timing: Mutex::new(None),
        });

        let session = TrackingSession::new(
            self.config.subject_name.clone(),
            &self.timing,
            self.fallback.clone(),
        );
        let timeout = Duration::from_millis(self.config.recv_timeout_ms.max(1));

        let task = tokio::spawn(receive_loop(
            socket,
            session,
            tx,
            shared.clone(),
            self.metrics.clone(),
            timeout,
        ));

        info!(%local_addr, "stype receiver listening");

        Ok(ReceiverHandle {
            frames: Some(rx),
            shared,
            metrics: self.metrics,
            fallback: self.fallback,
            local_addr,
            task: Some(task),
        })
    }
}

async fn receive_loop(
    socket: UdpSocket,
    mut session: TrackingSession,
    tx: Sender<TrackingFrame>,
    shared: Arc<Shared>,
    metrics: Arc<IngestionMetrics>,
    timeout: Duration,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    while shared.running.load(Ordering::Relaxed) {
        if shared.reset_requested.swap(false, Ordering::SeqCst) {
            session.reset();
            shared
                .status
                .store(ReceiverStatus::Waiting as u8, Ordering::SeqCst);
            *shared.lens.lock() = None;
        }

        let (len, peer) = match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
            Err(_) => continue,
            Ok(Err(err)) => {
                warn!(error = %err, "udp receive failed");
                continue;
            }
            Ok(Ok(received)) => received,
        };

        metrics.record_received();

        let decoded = match packet::decode(&buf[..len]) {
            Ok(decoded) => decoded,
            Err(err) => {
                metrics.record_decode_error();
                metrics::counter!("stype_datagrams_rejected_total", "reason" => err.reason())
                    .increment(1);
                trace!(%peer, len, error = %err, "datagram rejected");
                continue;
            }
        };
        metrics.record_decoded();

        let previous = shared
            .status
            .swap(ReceiverStatus::Active as u8, Ordering::SeqCst);
        if ReceiverStatus::from_u8(previous) == ReceiverStatus::Waiting {
            info!(%peer, subject = %session.subject(), "stype source active");
        }

        let output = session.process(&decoded);
        if let Some(lens) = output.lens_update {
            *shared.lens.lock() = Some(lens);
        }
        *shared.timing.lock() = Some(session.estimator().snapshot());

        if !send_frame(&tx, output.frame, &metrics, session.subject()) {
            break;
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    debug!(subject = %session.subject(), "stype receive loop stopped");
}

/// Send a frame, dropping it if the channel is full.
///
/// Returns false once the channel is closed.
#[inline]
fn send_frame(
    tx: &Sender<TrackingFrame>,
    frame: TrackingFrame,
    metrics: &IngestionMetrics,
    subject: &str,
) -> bool {
    match tx.try_send(frame) {
        Ok(()) => {
            metrics.update_queue_len(tx.len());
            true
        }
        Err(TrySendError::Full(_)) => {
            metrics.record_dropped();
            trace!(subject = %subject, "frame dropped (newest)");
            true
        }
        Err(TrySendError::Closed(_)) => {
            warn!(subject = %subject, "frame channel closed");
            false
        }
    }
}

/// Handle to a running receiver
pub struct ReceiverHandle {
    frames: Option<Receiver<TrackingFrame>>,
    shared: Arc<Shared>,
    metrics: Arc<IngestionMetrics>,
    fallback: FallbackRate,
    local_addr: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Frame stream
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_frames(&mut self) -> Option<Receiver<TrackingFrame>> {
        self.frames.take()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn status(&self) -> ReceiverStatus {
        ReceiverStatus::from_u8(self.shared.status.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    pub fn fallback(&self) -> FallbackRate {
        self.fallback.clone()
    }

    /// Most recent lens static data
    pub fn lens_static(&self) -> Option<LensStaticData> {
        *self.shared.lens.lock()
    }

    /// Estimator state after the most recent packet
    pub fn timing_snapshot(&self) -> Option<TimingSnapshot> {
        *self.shared.timing.lock()
    }

    /// Reset timing estimation before the next packet (device reconnect)
    pub fn request_reset(&self) {
        self.shared.reset_requested.store(true, Ordering::SeqCst);
    }

    /// Ask the receive loop to stop; it exits within one poll timeout
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the receive loop to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "receive loop task failed");
            }
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{StypePacket, Timecode};

    fn local_config() -> ReceiverConfig {
        ReceiverConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    async fn sender() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    fn datagram(package_no: u8, frames: u8) -> bytes::Bytes {
        packet::encode(&StypePacket {
            package_no,
            timecode: Timecode::new(0, 0, 1, frames),
            pa_width: 9.6,
            aspect_ratio: 1.5,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_receives_valid_packets() {
        let mut handle = StypeReceiver::new(local_config(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        let frames = handle.take_frames().unwrap();
        assert!(handle.take_frames().is_none());
        assert_eq!(handle.status(), ReceiverStatus::Waiting);

        let socket = sender().await;
        for package_no in 0..3u8 {
            socket
                .send_to(&datagram(package_no, package_no), handle.local_addr())
                .await
                .unwrap();
        }

        for expected in 0..3u8 {
            let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.package_no, expected);
            assert_eq!(frame.subject, "Camera");
            assert!(!frame.timing_valid);
        }

        assert_eq!(handle.status(), ReceiverStatus::Active);
        assert_eq!(handle.metrics().snapshot().packets_decoded, 3);
        assert_eq!(handle.lens_static().unwrap().film_back_width, 9.6f32 as f64);
        assert_eq!(handle.timing_snapshot().unwrap().last_package_no, 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_datagrams_are_counted_and_skipped() {
        let mut handle = StypeReceiver::new(local_config(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        let frames = handle.take_frames().unwrap();
        let socket = sender().await;

        let mut corrupted = datagram(1, 1).to_vec();
        corrupted[66] = corrupted[66].wrapping_add(1);

        socket.send_to(&[0x0F; 12], handle.local_addr()).await.unwrap();
        socket.send_to(&corrupted, handle.local_addr()).await.unwrap();
        socket
            .send_to(&datagram(2, 2), handle.local_addr())
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.package_no, 2);

        let snapshot = handle.metrics().snapshot();
        assert_eq!(snapshot.datagrams_received, 3);
        assert_eq!(snapshot.decode_errors, 2);
        assert_eq!(snapshot.packets_decoded, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let handle = StypeReceiver::new(local_config(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        assert!(handle.is_running());
        handle.stop();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_bind_error() {
        let first = StypeReceiver::new(local_config(), TimingConfig::default())
            .spawn()
            .await
            .unwrap();
        let taken = ReceiverConfig {
            port: first.local_addr().port(),
            ..local_config()
        };

        let err = StypeReceiver::new(taken, TimingConfig::default())
            .spawn()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IngestionError::Bind { .. }));
    }
}
