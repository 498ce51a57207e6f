//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::SessionBlueprint;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::cli::InfoArgs;
use crate::commands::load_blueprint;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    receiver: ReceiverInfo,
    timing: TimingInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct ReceiverInfo {
    address: String,
    subject: String,
    channel_capacity: usize,
    recv_timeout_ms: u64,
}

#[derive(Serialize)]
struct TimingInfo {
    timecode_rate_min_agreement: u32,
    sample_rate_min_agreement: u32,
    default_timecode_rate: u8,
    default_sample_rate: u32,
    fallback_rate: String,
    valid_timecode_rates: Vec<u8>,
    valid_sample_rates: Vec<u32>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &SessionBlueprint) -> ConfigInfo {
    let receiver = &blueprint.receiver;
    let timing = &blueprint.timing;

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        receiver: ReceiverInfo {
            address: receiver.socket_address(),
            subject: receiver.subject_name.clone(),
            channel_capacity: receiver.channel_capacity,
            recv_timeout_ms: receiver.recv_timeout_ms,
        },
        timing: TimingInfo {
            timecode_rate_min_agreement: timing.timecode_rate_min_agreement,
            sample_rate_min_agreement: timing.sample_rate_min_agreement,
            default_timecode_rate: timing.default_timecode_rate,
            default_sample_rate: timing.default_sample_rate,
            fallback_rate: timing.default_frame_rate.to_string(),
            valid_timecode_rates: timing.valid_timecode_rates.clone(),
            valid_sample_rates: timing.valid_sample_rates.clone(),
        },
        sinks: blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &SessionBlueprint) {
    let receiver = &blueprint.receiver;
    let timing = &blueprint.timing;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Stype Timing Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Receiver");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Address: {}", receiver.socket_address());
    println!("   ├─ Subject: {}", receiver.subject_name);
    println!("   ├─ Channel capacity: {}", receiver.channel_capacity);
    println!("   └─ Poll timeout: {} ms", receiver.recv_timeout_ms);

    println!("\n⏱  Timing");
    println!(
        "   ├─ Min agreements: timecode {}, sample {}",
        timing.timecode_rate_min_agreement, timing.sample_rate_min_agreement
    );
    println!(
        "   ├─ Defaults: {} fps timecode, {} Hz samples",
        timing.default_timecode_rate, timing.default_sample_rate
    );
    println!("   ├─ Fallback rate: {}", timing.default_frame_rate);
    println!("   ├─ Timecode rates: {}", rate_list(&timing.valid_timecode_rates));
    println!("   └─ Sample rates: {}", rate_list(&timing.valid_sample_rates));

    if blueprint.sinks.is_empty() {
        println!("\n📤 Sinks: none");
    } else {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let prefix = if i == blueprint.sinks.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            let mut params: Vec<_> = sink
                .params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            params.sort();
            println!(
                "   {} {} ({:?}, queue {}) {}",
                prefix,
                sink.name,
                sink.sink_type,
                sink.queue_capacity,
                params.join(" ")
            );
        }
    }

    println!();
}

fn rate_list<T: ToString>(rates: &[T]) -> String {
    if rates.is_empty() {
        "any".to_string()
    } else {
        rates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_info() {
        let blueprint = SessionBlueprint::with_log_sink();
        let info = build_config_info(&blueprint);

        assert_eq!(info.receiver.address, "0.0.0.0:54321");
        assert_eq!(info.timing.fallback_rate, "60fps");
        assert_eq!(info.sinks.len(), 1);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["sinks"][0]["sink_type"], "Log");
        assert!(json["sinks"][0].get("params").is_none());
    }

    #[test]
    fn test_rate_list() {
        assert_eq!(rate_list::<u8>(&[]), "any");
        assert_eq!(rate_list(&[24u8, 25]), "24, 25");
    }
}
