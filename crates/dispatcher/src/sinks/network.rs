//! NetworkSink - forwards each tracking frame as one UDP datagram

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use contracts::{ContractError, DataSink, TrackingFrame};
use tokio::net::UdpSocket;
use tracing::{debug, instrument, trace, warn};

/// Largest UDP payload over IPv4
const MAX_DATAGRAM: usize = 65_507;

/// Wire encoding of forwarded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    #[default]
    Json,
    Bincode,
}

impl FromStr for NetworkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "bincode" => Ok(Self::Bincode),
            other => Err(format!("unknown format '{other}', expected json or bincode")),
        }
    }
}

/// NetworkSink parameters
///
/// | param             | default  |
/// |-------------------|----------|
/// | `addr`            | required |
/// | `format`          | `json`   |
/// | `max_packet_size` | 65507    |
/// | `valid_only`      | `false`  |
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    /// Frames encoding to more bytes are rejected, never fragmented
    pub max_packet_size: usize,
    /// Forward only frames whose scene time comes from a confirmed estimate
    pub valid_only: bool,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: NetworkFormat::default(),
            max_packet_size: MAX_DATAGRAM,
            valid_only: false,
        }
    }

    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .ok_or("missing 'addr' parameter")?
            .parse()
            .map_err(|e| format!("invalid 'addr': {e}"))?;

        let mut config = Self::new(addr);
        if let Some(format) = params.get("format") {
            config.format = format.parse()?;
        }
        if let Some(size) = params.get("max_packet_size") {
            config.max_packet_size = size
                .parse::<usize>()
                .map_err(|e| format!("invalid 'max_packet_size': {e}"))?
                .min(MAX_DATAGRAM);
        }
        if let Some(valid_only) = params.get("valid_only") {
            config.valid_only = valid_only
                .parse()
                .map_err(|e| format!("invalid 'valid_only': {e}"))?;
        }
        Ok(config)
    }
}

/// Fire-and-forget UDP forwarder
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
    /// Frames held back by `valid_only`
    skipped: u64,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(addr = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let local: SocketAddr = if config.addr.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(config.addr).await?;

        debug!(sink = %name, target = %config.addr, format = ?config.format, "forwarding frames");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
            skipped: 0,
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_write(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    fn encode(&self, frame: &TrackingFrame) -> Result<Vec<u8>, ContractError> {
        let payload = match self.config.format {
            NetworkFormat::Json => serde_json::to_vec(frame).map_err(|e| e.to_string()),
            NetworkFormat::Bincode => bincode::serialize(frame).map_err(|e| e.to_string()),
        }
        .map_err(|e| ContractError::sink_write(&self.name, e))?;

        if payload.len() > self.config.max_packet_size {
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "encoded frame is {} bytes, limit {}",
                    payload.len(),
                    self.config.max_packet_size
                ),
            ));
        }
        Ok(payload)
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, frame),
        fields(sink = %self.name, package_no = frame.package_no)
    )]
    async fn write(&mut self, frame: &TrackingFrame) -> Result<(), ContractError> {
        if self.config.valid_only && !frame.timing_valid {
            self.skipped += 1;
            return Ok(());
        }

        let payload = self.encode(frame)?;
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket closed"))?;

        // Nobody listening is not a sink failure
        match socket.send(&payload).await {
            Ok(sent) => trace!(sink = %self.name, bytes = sent, "frame forwarded"),
            Err(e) => debug!(sink = %self.name, error = %e, "udp send failed"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        if self.skipped > 0 {
            warn!(sink = %self.name, skipped = self.skipped, "frames without confirmed timing not forwarded");
        }
        debug!(sink = %self.name, "network sink closed");
        Ok(())
    }
}
