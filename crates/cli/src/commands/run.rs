//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::commands::load_blueprint;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        info!(port, "Overriding receiver port from CLI");
        blueprint.receiver.port = port;
        config_loader::ConfigLoader::validate(&blueprint)
            .context("Invalid configuration after CLI overrides")?;
    }

    info!(
        addr = %blueprint.receiver.socket_address(),
        subject = %blueprint.receiver.subject_name,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    println!("\n{stats}");
    info!("Stype Timing finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::warn!("Received shutdown signal, stopping pipeline...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::SessionBlueprint) {
    let timing = &blueprint.timing;

    println!("\n=== Configuration Summary ===\n");
    println!("Receiver:");
    println!("  Address: {}", blueprint.receiver.socket_address());
    println!("  Subject: {}", blueprint.receiver.subject_name);
    println!("  Channel capacity: {}", blueprint.receiver.channel_capacity);

    println!("\nTiming:");
    println!(
        "  Min agreements: timecode {}, sample {}",
        timing.timecode_rate_min_agreement, timing.sample_rate_min_agreement
    );
    println!("  Fallback rate: {}", timing.default_frame_rate);
    println!("  Timecode rates: {:?}", timing.valid_timecode_rates);
    println!("  Sample rates: {:?}", timing.valid_sample_rates);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
