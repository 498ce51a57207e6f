//! `simulate` command implementation.

use anyhow::{Context, Result};
use contracts::{COMMAND_DEPTH_OF_FIELD, MAX_TIMECODE_RATE};
use ingestion::{LossPattern, MockStypeConfig, MockStypeSource};
use tracing::{info, warn};

use crate::cli::SimulateArgs;
use crate::error::CliError;

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let config = mock_config(args)?;
    let source = MockStypeSource::new(config);
    let interval = source.interval();

    info!(
        target = %args.target,
        timecode_rate = args.timecode_rate,
        packet_rate = args.packet_rate,
        drop_every = ?args.drop_every,
        count = ?args.count,
        "Sending mock Stype traffic"
    );

    let task = source.spawn_udp(args.target, interval);
    let abort = task.abort_handle();

    tokio::select! {
        joined = task => {
            let sent = joined
                .context("Simulation task failed")?
                .context("Failed to send mock traffic")?;
            info!(sent, "Simulation finished");
            println!("Sent {sent} packets to {}", args.target);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, stopping simulation");
            abort.abort();
        }
    }

    Ok(())
}

/// Build the mock source configuration from CLI arguments
fn mock_config(args: &SimulateArgs) -> Result<MockStypeConfig> {
    if args.timecode_rate == 0 || args.timecode_rate > MAX_TIMECODE_RATE {
        return Err(CliError::invalid_argument(
            "timecode-rate",
            format!("must be in 1..={MAX_TIMECODE_RATE}"),
        )
        .into());
    }
    if args.packet_rate == 0 {
        return Err(CliError::invalid_argument("packet-rate", "must be > 0").into());
    }

    let loss = match args.drop_every {
        Some(0) => {
            return Err(CliError::invalid_argument("drop-every", "must be > 0").into());
        }
        Some(n) => LossPattern::EveryNth(n),
        None => LossPattern::None,
    };

    Ok(MockStypeConfig {
        timecode_rate: args.timecode_rate,
        packet_rate: args.packet_rate,
        first_package_no: args.first_package_no,
        command: if args.depth_of_field {
            COMMAND_DEPTH_OF_FIELD
        } else {
            0
        },
        count: args.count,
        loss,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            target: "127.0.0.1:54321".parse().unwrap(),
            timecode_rate: 25,
            packet_rate: 50,
            drop_every: None,
            count: Some(100),
            first_package_no: 0,
            depth_of_field: false,
        }
    }

    #[test]
    fn test_mock_config() {
        let config = mock_config(&SimulateArgs {
            drop_every: Some(5),
            depth_of_field: true,
            ..args()
        })
        .unwrap();
        assert_eq!(config.loss, LossPattern::EveryNth(5));
        assert_eq!(config.command, COMMAND_DEPTH_OF_FIELD);
        assert_eq!(config.count, Some(100));
    }

    #[test]
    fn test_mock_config_rejects_bad_rates() {
        for bad in [
            SimulateArgs {
                timecode_rate: 0,
                ..args()
            },
            SimulateArgs {
                timecode_rate: 128,
                ..args()
            },
            SimulateArgs {
                packet_rate: 0,
                ..args()
            },
            SimulateArgs {
                drop_every: Some(0),
                ..args()
            },
        ] {
            let err = mock_config(&bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CliError>(),
                Some(CliError::InvalidArgument { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_simulate_sends_count() {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = socket.local_addr().unwrap();

        run_simulate(&SimulateArgs {
            target,
            packet_rate: 1000,
            count: Some(3),
            ..args()
        })
        .await
        .unwrap();

        let mut buf = [0u8; 128];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, ingestion::packet::PACKET_SIZE);
    }
}
