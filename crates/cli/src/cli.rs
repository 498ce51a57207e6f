//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Stype Timing - scene time inference for Stype HF camera tracking
#[derive(Parser, Debug)]
#[command(
    name = "stype-timing",
    author,
    version,
    about = "Stype HF camera tracking receiver with timecode rate inference",
    long_about = "Receives Stype HF tracking packets over UDP, infers the undeclared \n\
                  timecode and sample rates from the packet counter and timecode \n\
                  overflows, and publishes every sample with a qualified scene time."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STYPE_TIMING_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "STYPE_TIMING_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level from -q / -v flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive tracking data, estimate scene time and dispatch to sinks
    Run(RunArgs),

    /// Send mock Stype traffic to a receiver
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "STYPE_TIMING_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the UDP port from configuration
    #[arg(long, env = "STYPE_TIMING_PORT")]
    pub port: Option<u16>,

    /// Maximum number of frames to publish (0 = unlimited)
    #[arg(long, default_value = "0", env = "STYPE_TIMING_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "STYPE_TIMING_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "STYPE_TIMING_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without receiving
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Receiver address
    #[arg(long, default_value = "127.0.0.1:54321", env = "STYPE_TIMING_TARGET")]
    pub target: SocketAddr,

    /// Timecode frames per second
    #[arg(long, default_value = "25")]
    pub timecode_rate: u32,

    /// Packets per second
    #[arg(long, default_value = "50")]
    pub packet_rate: u32,

    /// Drop every Nth packet
    #[arg(long)]
    pub drop_every: Option<u64>,

    /// Number of packets to generate (endless if omitted)
    #[arg(long)]
    pub count: Option<u64>,

    /// Packet counter of the first packet
    #[arg(long, default_value = "0")]
    pub first_package_no: u8,

    /// Set the depth-of-field command bit
    #[arg(long)]
    pub depth_of_field: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
