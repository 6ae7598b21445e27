//! CLI command and subcommand definitions

use clap::{Parser, Subcommand};
use ips_core::{Parameter, Unit};
use std::path::PathBuf;

/// IPS magnet power supply control
#[derive(Parser, Debug)]
#[command(name = "ipsctl")]
#[command(version, about = "IPS superconducting magnet power supply control", long_about = None)]
pub struct Cli {
    /// Config file path (default: ~/.config/ips/config.toml, or $IPS_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial device (overrides config file and $IPS_PORT)
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Run against a simulated power supply instead of hardware
    #[arg(long, global = true)]
    pub mock: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (overrides $IPS_FORMAT)
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty table output
    Table,
    /// JSON output
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show status frame and key readings
    Status,

    /// Read one quantity
    Get {
        #[arg(value_enum)]
        quantity: Quantity,
    },

    /// Set the current or field setpoint (sign selects polarity)
    Setpoint {
        #[arg(value_enum)]
        unit: UnitArg,

        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Set the current (A/min) or field (T/min) sweep rate
    Rate {
        #[arg(value_enum)]
        unit: UnitArg,

        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Sweep the magnet to a field in Tesla
    Field {
        /// Target field in Tesla
        #[arg(allow_negative_numbers = true)]
        target: f64,

        /// Field sweep rate in T/min
        #[arg(long)]
        rate: Option<f64>,

        /// Enter persistent mode once the field is reached
        #[arg(long)]
        persist: bool,
    },

    /// Stop sweeping and hold the output
    Hold,

    /// Sweep to the field setpoint and wait
    ToSetpoint,

    /// Sweep to zero and wait
    ToZero,

    /// Clamp the output
    Clamp,

    /// Switch the persistent switch heater
    Heater {
        #[arg(value_enum)]
        state: HeaterArg,
    },

    /// Bring the output to the persistent field and switch the heater on
    Energize,

    /// Switch the heater off at field, run the leads down and clamp
    Persist,

    /// Send a raw command and print the reply
    Raw {
        /// Command without line termination, e.g. R7
        command: String,
    },

    /// Close and reopen the instrument link
    Reconnect,

    /// List serial ports on this machine
    Ports,

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum UnitArg {
    Current,
    Field,
}

impl From<UnitArg> for Unit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Current => Unit::Current,
            UnitArg::Field => Unit::Field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum HeaterArg {
    On,
    Off,
}

/// Readable quantities
#[derive(Debug, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum Quantity {
    OutputCurrent,
    OutputField,
    MagnetCurrent,
    Voltage,
    SetpointCurrent,
    SetpointField,
    RateCurrent,
    RateField,
    PersistentCurrent,
    PersistentField,
    HeaterCurrent,
}

impl Quantity {
    pub fn parameter(self) -> Parameter {
        match self {
            Quantity::OutputCurrent => Parameter::OutputCurrent,
            Quantity::OutputField => Parameter::OutputField,
            Quantity::MagnetCurrent => Parameter::MagnetCurrent,
            Quantity::Voltage => Parameter::SupplyVoltage,
            Quantity::SetpointCurrent => Parameter::SetpointCurrent,
            Quantity::SetpointField => Parameter::SetpointField,
            Quantity::RateCurrent => Parameter::SweepRateCurrent,
            Quantity::RateField => Parameter::SweepRateField,
            Quantity::PersistentCurrent => Parameter::PersistentCurrent,
            Quantity::PersistentField => Parameter::PersistentField,
            Quantity::HeaterCurrent => Parameter::HeaterCurrent,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Quantity::OutputCurrent => "output_current",
            Quantity::OutputField => "output_field",
            Quantity::MagnetCurrent => "magnet_current",
            Quantity::Voltage => "voltage",
            Quantity::SetpointCurrent => "setpoint_current",
            Quantity::SetpointField => "setpoint_field",
            Quantity::RateCurrent => "rate_current",
            Quantity::RateField => "rate_field",
            Quantity::PersistentCurrent => "persistent_current",
            Quantity::PersistentField => "persistent_field",
            Quantity::HeaterCurrent => "heater_current",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::OutputCurrent
            | Quantity::MagnetCurrent
            | Quantity::SetpointCurrent
            | Quantity::PersistentCurrent => "A",
            Quantity::OutputField | Quantity::SetpointField | Quantity::PersistentField => "T",
            Quantity::Voltage => "V",
            Quantity::RateCurrent => "A/min",
            Quantity::RateField => "T/min",
            Quantity::HeaterCurrent => "mA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_field() {
        let cli = Cli::try_parse_from(["ipsctl", "field", "-1.5", "--rate", "0.2", "--persist"])
            .unwrap();
        match cli.command {
            Commands::Field {
                target,
                rate,
                persist,
            } => {
                assert_eq!(target, -1.5);
                assert_eq!(rate, Some(0.2));
                assert!(persist);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ipsctl", "status", "--mock", "-f", "json", "-p", "/dev/ttyS0"])
            .unwrap();
        assert!(cli.mock);
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyS0"));
    }

    #[test]
    fn test_parse_setpoint_and_get() {
        let cli = Cli::try_parse_from(["ipsctl", "setpoint", "current", "-25"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Setpoint {
                unit: UnitArg::Current,
                value
            } if value == -25.0
        ));

        let cli = Cli::try_parse_from(["ipsctl", "get", "persistent-field"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Get {
                quantity: Quantity::PersistentField
            }
        ));
    }

    #[test]
    fn test_quantity_mapping() {
        assert_eq!(Quantity::Voltage.parameter(), Parameter::SupplyVoltage);
        assert_eq!(Quantity::RateField.unit(), "T/min");
        assert_eq!(Quantity::HeaterCurrent.parameter().code(), 20);
    }

    #[test]
    fn test_rejects_unknown_heater_state() {
        assert!(Cli::try_parse_from(["ipsctl", "heater", "maybe"]).is_err());
    }
}
