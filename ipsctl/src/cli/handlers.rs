//! Command execution handlers

use anyhow::Result;
use ips_core::Unit;
use ips_hardware::{list_ports, Connector, MagnetController};
use std::path::Path;

use crate::config::{write_default_config, CliConfig};
use crate::format::{
    format_config, format_ports, format_reading, format_reply, format_status, format_success,
    OutputFormat, Reading, StatusReport,
};

use super::commands::*;

/// Run one instrument command against `ctrl`
pub async fn handle_instrument<C: Connector + 'static>(
    ctrl: &MagnetController<C>,
    command: Commands,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        Commands::Status => handle_status(ctrl, format).await,
        Commands::Get { quantity } => handle_get(ctrl, quantity, format).await,
        Commands::Setpoint { unit, value } => {
            let unit = Unit::from(unit);
            match unit {
                Unit::Current => ctrl.set_setpoint_current(value).await?,
                Unit::Field => ctrl.set_setpoint_field(value).await?,
            }
            println!(
                "{}",
                format_success(&format!(
                    "{} setpoint set to {} {}",
                    unit,
                    value,
                    unit.symbol()
                ))
            );
            Ok(())
        }
        Commands::Rate { unit, value } => {
            let unit = Unit::from(unit);
            match unit {
                Unit::Current => ctrl.set_sweep_rate_current(value).await?,
                Unit::Field => ctrl.set_sweep_rate_field(value).await?,
            }
            println!(
                "{}",
                format_success(&format!(
                    "{} sweep rate set to {} {}/min",
                    unit,
                    value.abs(),
                    unit.symbol()
                ))
            );
            Ok(())
        }
        Commands::Field {
            target,
            rate,
            persist,
        } => {
            if persist {
                ctrl.set_persistent_magnet_field(target, rate).await?;
                println!(
                    "{}",
                    format_success(&format!("Magnet persistent at {} T", target))
                );
            } else {
                let reached = ctrl.set_magnet_field(target, rate).await?;
                println!(
                    "{}",
                    format_success(&format!("Magnet field at {} T", reached))
                );
            }
            Ok(())
        }
        Commands::Hold => {
            ctrl.hold().await?;
            println!("{}", format_success("Output on hold"));
            Ok(())
        }
        Commands::ToSetpoint => {
            let reached = ctrl.go_to_setpoint().await?;
            println!(
                "{}",
                format_success(&format!("Output at setpoint, {} T", reached))
            );
            Ok(())
        }
        Commands::ToZero => {
            ctrl.go_to_zero().await?;
            println!("{}", format_success("Output at zero"));
            Ok(())
        }
        Commands::Clamp => {
            ctrl.clamp().await?;
            println!("{}", format_success("Output clamped"));
            Ok(())
        }
        Commands::Heater { state } => {
            match state {
                HeaterArg::On => ctrl.heater_on().await?,
                HeaterArg::Off => ctrl.heater_off().await?,
            }
            let label = if state == HeaterArg::On { "on" } else { "off" };
            println!("{}", format_success(&format!("Switch heater {}", label)));
            Ok(())
        }
        Commands::Energize => {
            ctrl.go_to_current_field().await?;
            println!("{}", format_success("Magnet energized"));
            Ok(())
        }
        Commands::Persist => {
            ctrl.go_to_persistent_mode().await?;
            println!("{}", format_success("Magnet persistent, output clamped"));
            Ok(())
        }
        Commands::Raw { command } => {
            let reply = ctrl.query(&command).await?;
            println!("{}", format_reply(command.trim(), &reply, format)?);
            Ok(())
        }
        Commands::Reconnect => {
            ctrl.reconnect().await?;
            let identity = ctrl.query(&ips_core::Command::Version.encode()).await?;
            println!("{}", format_success(&format!("Reconnected: {}", identity)));
            Ok(())
        }
        Commands::Ports | Commands::Config { .. } => Err(anyhow::anyhow!(
            "{:?} does not talk to the instrument",
            command
        )),
    }
}

/// Handle status command
pub async fn handle_status<C: Connector + 'static>(
    ctrl: &MagnetController<C>,
    format: &OutputFormat,
) -> Result<()> {
    let report = StatusReport {
        status: ctrl.get_status().await?,
        output_field: ctrl.get_output_field().await?,
        setpoint_field: ctrl.get_setpoint_field().await?,
        persistent_field: ctrl.get_persistent_field().await?,
        sweep_rate_field: ctrl.get_sweep_rate_field().await?,
        output_current: ctrl.get_output_current().await?,
        heater_current: ctrl.get_heater_current().await?,
    };
    println!("{}", format_status(&report, format)?);
    Ok(())
}

/// Handle get command
pub async fn handle_get<C: Connector + 'static>(
    ctrl: &MagnetController<C>,
    quantity: Quantity,
    format: &OutputFormat,
) -> Result<()> {
    let reading = Reading {
        quantity: quantity.name().to_string(),
        value: ctrl.get_parameter(quantity.parameter()).await?,
        unit: quantity.unit().to_string(),
    };
    println!("{}", format_reading(&reading, format)?);
    Ok(())
}

/// Handle ports command
pub fn handle_ports(format: &OutputFormat) -> Result<()> {
    let ports = list_ports()?;
    println!("{}", format_ports(&ports, format)?);
    Ok(())
}

/// Handle config commands
pub async fn handle_config(
    command: ConfigCommands,
    current: &CliConfig,
    target: &Path,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if let (OutputFormat::Table, Some(path)) = (format, &current.config_path) {
                println!("# {}", path.display());
            }
            println!("{}", format_config(&current.instrument, format)?);
        }
        ConfigCommands::Init { force } => {
            write_default_config(target, force).await?;
            println!(
                "{}",
                format_success(&format!("Wrote default configuration to {}", target.display()))
            );
        }
    }
    Ok(())
}
