//! Simple integration tests for the IPS CLI
//!
//! Handlers run against the simulated power supply, the same backend the
//! `--mock` flag uses.

use anyhow::Result;
use clap::Parser;
use ips_core::{Activity, HeaterState, StaticConfig};
use ips_hardware::{MagnetController, SimulatedConnector, SimulatedIps};
use ipsctl::cli::{handle_instrument, Cli, Commands, HeaterArg, Quantity, UnitArg};
use ipsctl::config::CliConfig;
use ipsctl::format::OutputFormat;
use tempfile::TempDir;

fn quick_controller(sim: &SimulatedIps) -> MagnetController<SimulatedConnector> {
    let mut config = StaticConfig::default();
    config.ramp.poll_interval_ms = 1;
    config.ramp.settle_delay_secs = 0.0;
    config.reconnect.initial_delay_ms = 0;
    MagnetController::new(sim.connector(), &config).unwrap()
}

fn parse(args: &[&str]) -> Commands {
    let mut argv = vec!["ipsctl"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

#[tokio::test]
async fn test_field_persist_command() -> Result<()> {
    let sim = SimulatedIps::new();
    let ctrl = quick_controller(&sim);

    handle_instrument(
        &ctrl,
        parse(&["field", "1.5", "--rate", "0.2", "--persist"]),
        &OutputFormat::Json,
    )
    .await?;

    let status = sim.status();
    assert_eq!(status.activity, Activity::Clamped);
    assert_eq!(status.heater, HeaterState::OffAtField);
    assert_eq!(sim.persistent_field(), 1.5);
    assert_eq!(sim.sweep_rate_field(), 0.2);
    Ok(())
}

#[tokio::test]
async fn test_energize_then_persist_commands() -> Result<()> {
    let sim = SimulatedIps::new();
    sim.set_persistent(0.5);
    let ctrl = quick_controller(&sim);

    handle_instrument(&ctrl, Commands::Energize, &OutputFormat::Table).await?;
    assert_eq!(sim.status().heater, HeaterState::On);
    assert_eq!(sim.output_field(), 0.5);

    handle_instrument(&ctrl, Commands::Persist, &OutputFormat::Table).await?;
    assert_eq!(sim.status().activity, Activity::Clamped);
    assert_eq!(sim.output_field(), 0.0);
    Ok(())
}

#[tokio::test]
async fn test_readings_and_primitives() -> Result<()> {
    let sim = SimulatedIps::new();
    let ctrl = quick_controller(&sim);

    for command in [
        Commands::Status,
        Commands::Get {
            quantity: Quantity::PersistentField,
        },
        Commands::Setpoint {
            unit: UnitArg::Field,
            value: -0.5,
        },
        Commands::Rate {
            unit: UnitArg::Current,
            value: 2.0,
        },
        Commands::Heater {
            state: HeaterArg::On,
        },
        Commands::ToSetpoint,
        Commands::Hold,
        Commands::ToZero,
        Commands::Clamp,
        Commands::Raw {
            command: "R7".to_string(),
        },
        Commands::Reconnect,
    ] {
        handle_instrument(&ctrl, command, &OutputFormat::Json).await?;
    }

    assert_eq!(sim.setpoint_field(), -0.5);
    assert_eq!(sim.status().activity, Activity::Clamped);
    assert_eq!(sim.connects(), 2);
    Ok(())
}

#[tokio::test]
async fn test_refused_heater_is_an_error() {
    let sim = SimulatedIps::new();
    sim.set_persistent(1.0);
    sim.set_activity(Activity::Hold);
    let ctrl = quick_controller(&sim);

    let result = handle_instrument(
        &ctrl,
        Commands::Heater {
            state: HeaterArg::On,
        },
        &OutputFormat::Table,
    )
    .await;
    assert!(result.is_err());
    assert!(!sim.commands().iter().any(|c| c == "H1"));
}

#[tokio::test]
async fn test_raw_heater_off_respects_interlock() {
    let sim = SimulatedIps::new();
    sim.set_persistent(1.0);
    sim.set_heater(true);
    let ctrl = quick_controller(&sim);

    let result = handle_instrument(&ctrl, parse(&["raw", "H0"]), &OutputFormat::Table).await;
    assert!(result.is_err());
    assert!(!sim.commands().iter().any(|c| c == "H0"));
    assert_eq!(sim.persistent_field(), 1.0);
}

#[tokio::test]
async fn test_config_chain_with_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, "[serial]\nport = \"/dev/ttyS2\"\nbaud_rate = 19200\n").await?;

    let config = CliConfig::builder()
        .with_config_path(&path)
        .with_config_file()
        .await?
        .with_output_format("json")?
        .build()?;

    assert_eq!(config.instrument.serial.port, "/dev/ttyS2");
    assert_eq!(config.instrument.serial.baud_rate, 19200);
    assert_eq!(config.output_format, "json");
    Ok(())
}
