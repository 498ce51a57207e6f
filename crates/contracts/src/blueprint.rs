//! SessionBlueprint - Config Loader output
//!
//! Describes a full receiving session: UDP endpoint, timing estimation, output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{ReceiverConfig, TimingConfig};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// UDP receiver settings
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Timing estimation settings
    #[serde(default)]
    pub timing: TimingConfig,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Tracing summary
    Log,
    /// JSON-lines file
    File,
    /// UDP forward
    Network,
}

impl SessionBlueprint {
    /// Blueprint with default receiver/timing settings and a single log sink
    pub fn with_log_sink() -> Self {
        Self {
            version: ConfigVersion::V1,
            receiver: ReceiverConfig::default(),
            timing: TimingConfig::default(),
            sinks: vec![SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: default_queue_capacity(),
                params: HashMap::new(),
            }],
        }
    }

    /// Sinks of the given type
    pub fn sinks_of_type(&self, kind: SinkType) -> impl Iterator<Item = &SinkConfig> {
        self.sinks.iter().filter(move |sink| sink.sink_type == kind)
    }
}
