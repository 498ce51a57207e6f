//! Mock Stype source
//!
//! Generates the packet stream of a device running at a given timecode rate
//! and packet rate, with optional packet loss. Used for tests and simulation
//! without tracking hardware.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use contracts::{StypePacket, Timecode};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};
use crate::packet;

/// Which generated packets are never delivered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LossPattern {
    #[default]
    None,
    /// Drop every packet whose index is a multiple of N (N > 0)
    EveryNth(u64),
    /// Drop these packet indices
    Indices(HashSet<u64>),
}

impl LossPattern {
    pub fn is_lost(&self, index: u64) -> bool {
        match self {
            Self::None => false,
            Self::EveryNth(n) => *n > 0 && index % n == 0,
            Self::Indices(indices) => indices.contains(&index),
        }
    }
}

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct MockStypeConfig {
    /// Timecode frames per second
    pub timecode_rate: u32,

    /// Packets per second
    pub packet_rate: u32,

    /// Timecode of the first packet
    pub start_timecode: Timecode,

    /// Packet counter of the first packet
    pub first_package_no: u8,

    /// Command byte on every packet
    pub command: u8,

    /// Packets to generate (None = endless)
    pub count: Option<u64>,

    /// Packet loss
    pub loss: LossPattern,
}

impl Default for MockStypeConfig {
    fn default() -> Self {
        Self {
            timecode_rate: 25,
            packet_rate: 50,
            start_timecode: Timecode::default(),
            first_package_no: 0,
            command: 0,
            count: None,
            loss: LossPattern::None,
        }
    }
}

/// Mock Stype packet generator
///
/// Iterating yields the delivered packets in order; lost ones are skipped.
#[derive(Debug, Clone)]
pub struct MockStypeSource {
    config: MockStypeConfig,
    /// Absolute packet index of the start timecode
    start_index: u64,
    /// Next packet index
    index: u64,
}

impl MockStypeSource {
    pub fn new(mut config: MockStypeConfig) -> Self {
        config.timecode_rate = config.timecode_rate.max(1);
        config.packet_rate = config.packet_rate.max(1);

        let packet_rate = u64::from(config.packet_rate);
        let start_index = config.start_timecode.total_seconds() * packet_rate
            + u64::from(config.start_timecode.frames) * packet_rate
                / u64::from(config.timecode_rate);

        Self {
            config,
            start_index,
            index: 0,
        }
    }

    /// Source at the given rates, no loss
    pub fn with_rates(timecode_rate: u32, packet_rate: u32) -> Self {
        Self::new(MockStypeConfig {
            timecode_rate,
            packet_rate,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &MockStypeConfig {
        &self.config
    }

    /// Packet number `index` of the stream, lost or not
    pub fn packet_at(&self, index: u64) -> StypePacket {
        let packet_rate = u64::from(self.config.packet_rate);
        let absolute = self.start_index + index;
        let seconds = absolute / packet_rate;
        let frames = (absolute % packet_rate) * u64::from(self.config.timecode_rate) / packet_rate;

        let timecode = Timecode::new(
            ((seconds / 3600) % 24) as u8,
            ((seconds / 60) % 60) as u8,
            (seconds % 60) as u8,
            frames as u8,
        );

        // Slow pan so consecutive frames differ
        let t = index as f32 / self.config.packet_rate as f32;

        StypePacket {
            command: self.config.command,
            timecode,
            package_no: self.config.first_package_no.wrapping_add(index as u8),
            x: 0.5 * t.sin(),
            y: 1.6,
            z: 4.0,
            pan: 10.0 * t,
            tilt: -2.0,
            roll: 0.0,
            fov_x: 60.0,
            aspect_ratio: 16.0 / 9.0,
            focus: 3.0,
            zoom: 0.25,
            k1: 0.01,
            k2: -0.001,
            center_shift_x: 0.02,
            center_shift_y: -0.01,
            pa_width: 9.6,
        }
    }

    /// Index of the next generated packet
    pub fn position(&self) -> u64 {
        self.index
    }

    /// Time between two packets
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.packet_rate))
    }

    /// Send the stream to `target` over UDP, paced by `interval`.
    ///
    /// Resolves to the number of datagrams sent.
    pub fn spawn_udp(self, target: SocketAddr, interval: Duration) -> JoinHandle<Result<u64>> {
        tokio::spawn(async move {
            let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
            let mut ticker = tokio::time::interval(interval);
            let mut sent = 0u64;

            debug!(
                %target,
                timecode_rate = self.config.timecode_rate,
                packet_rate = self.config.packet_rate,
                "mock stype source started"
            );

            for sample in self {
                ticker.tick().await;
                socket
                    .send_to(&packet::encode(&sample), target)
                    .await
                    .map_err(|source| IngestionError::Send { target, source })?;
                sent += 1;
                trace!(package_no = sample.package_no, timecode = %sample.timecode, "mock packet sent");
            }

            debug!(%target, sent, "mock stype source finished");
            Ok(sent)
        })
    }
}

impl Iterator for MockStypeSource {
    type Item = StypePacket;

    fn next(&mut self) -> Option<StypePacket> {
        loop {
            if self.config.count.is_some_and(|count| self.index >= count) {
                return None;
            }
            let index = self.index;
            self.index += 1;

            if !self.config.loss.is_lost(index) {
                return Some(self.packet_at(index));
            }
        }
    }
}
