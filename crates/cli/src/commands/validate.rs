//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SessionBlueprint, SinkType};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    address: String,
    subject: String,
    fallback_rate: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    address: blueprint.receiver.socket_address(),
                    subject: blueprint.receiver.subject_name.clone(),
                    fallback_rate: blueprint.timing.default_frame_rate.to_string(),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &SessionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let timing = &blueprint.timing;

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - frames will only be counted".to_string());
    }

    if timing.valid_timecode_rates.is_empty() {
        warnings.push(
            "timing.valid_timecode_rates is empty - any timecode rate can be confirmed"
                .to_string(),
        );
    }
    if timing.valid_sample_rates.is_empty() {
        warnings.push(
            "timing.valid_sample_rates is empty - spurious boundaries are harder to reject"
                .to_string(),
        );
    }
    if timing.sample_rate_min_agreement == 1 {
        warnings.push(
            "timing.sample_rate_min_agreement = 1 - a single lost packet can confirm a wrong rate"
                .to_string(),
        );
    }

    if blueprint.sinks_of_type(SinkType::Log).count() == blueprint.sinks.len()
        && !blueprint.sinks.is_empty()
    {
        warnings.push("Only log sinks configured - frames are not persisted".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Address: {}", summary.address);
            println!("  Subject: {}", summary.subject);
            println!("  Fallback rate: {}", summary.fallback_rate);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
