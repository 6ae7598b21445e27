//! Output formatting utilities for the CLI
//!
//! Provides table and JSON formatting with colors.

use anyhow::Result;
use colored::*;
use ips_core::{Activity, HeaterState, StaticConfig, SystemFault, SystemStatus};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format options
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }
}

/// Status frame plus the readings shown by `ipsctl status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: SystemStatus,
    pub output_field: f64,
    pub setpoint_field: f64,
    pub persistent_field: f64,
    pub sweep_rate_field: f64,
    pub output_current: f64,
    pub heater_current: f64,
}

/// One named reading
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub quantity: String,
    pub value: f64,
    pub unit: String,
}

fn fault_label(fault: SystemFault) -> ColoredString {
    match fault {
        SystemFault::Normal => fault.to_string().green(),
        _ => fault.to_string().red().bold(),
    }
}

fn activity_label(activity: Activity) -> ColoredString {
    match activity {
        Activity::Hold => activity.to_string().cyan(),
        Activity::ToSetpoint | Activity::ToZero => activity.to_string().yellow(),
        Activity::Clamped => activity.to_string().dimmed(),
    }
}

fn heater_label(heater: HeaterState) -> ColoredString {
    match heater {
        HeaterState::On => heater.to_string().yellow(),
        HeaterState::OffAtZero | HeaterState::OffAtField => heater.to_string().green(),
        HeaterState::Fault => heater.to_string().red().bold(),
        HeaterState::NoSwitch => heater.to_string().dimmed(),
    }
}

/// Format the status report
pub fn format_status(report: &StatusReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Quantity")]
                quantity: String,
                #[tabled(rename = "Value")]
                value: String,
            }

            let status = &report.status;
            let rows = vec![
                Row {
                    quantity: "System".to_string(),
                    value: fault_label(status.system_fault).to_string(),
                },
                Row {
                    quantity: "Limits".to_string(),
                    value: status.voltage_limit.to_string(),
                },
                Row {
                    quantity: "Activity".to_string(),
                    value: activity_label(status.activity).to_string(),
                },
                Row {
                    quantity: "Switch heater".to_string(),
                    value: heater_label(status.heater).to_string(),
                },
                Row {
                    quantity: "Output field".to_string(),
                    value: format!("{:.4} T", report.output_field).cyan().to_string(),
                },
                Row {
                    quantity: "Setpoint field".to_string(),
                    value: format!("{:.4} T", report.setpoint_field),
                },
                Row {
                    quantity: "Persistent field".to_string(),
                    value: format!("{:.4} T", report.persistent_field),
                },
                Row {
                    quantity: "Sweep rate".to_string(),
                    value: format!("{:.3} T/min", report.sweep_rate_field),
                },
                Row {
                    quantity: "Output current".to_string(),
                    value: format!("{:.3} A", report.output_current),
                },
                Row {
                    quantity: "Heater current".to_string(),
                    value: format!("{:.1} mA", report.heater_current),
                },
            ];

            let table = Table::new(rows).with(Style::rounded()).to_string();
            Ok(format!("{}\n{}", "Magnet Status:".bold(), table))
        }
    }
}

/// Format a single reading
pub fn format_reading(reading: &Reading, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(reading)?),
        OutputFormat::Table => Ok(format!(
            "{}: {} {}",
            reading.quantity,
            reading.value.to_string().cyan(),
            reading.unit
        )),
    }
}

/// Format the raw reply to a passthrough command
pub fn format_reply(command: &str, reply: &str, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "command": command,
            "reply": reply,
        }))?),
        OutputFormat::Table => Ok(format!("{} -> {}", command.dimmed(), reply.cyan())),
    }
}

/// Format the list of serial ports
pub fn format_ports(ports: &[String], format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(ports)?),
        OutputFormat::Table => {
            if ports.is_empty() {
                return Ok("No serial ports found".yellow().to_string());
            }

            #[derive(Tabled)]
            struct PortRow {
                #[tabled(rename = "Port")]
                port: String,
            }

            let rows: Vec<PortRow> = ports
                .iter()
                .map(|port| PortRow {
                    port: port.green().to_string(),
                })
                .collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            Ok(format!("{}\n{}", "Serial Ports:".bold(), table))
        }
    }
}

/// Format the effective instrument configuration
pub fn format_config(config: &StaticConfig, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        OutputFormat::Table => Ok(config.to_toml()?),
    }
}

/// Format success message
pub fn format_success(message: &str) -> String {
    format!("{} {}", "✓".green().bold(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ips_core::VoltageLimit;

    fn report() -> StatusReport {
        StatusReport {
            status: SystemStatus {
                system_fault: SystemFault::Normal,
                voltage_limit: VoltageLimit::Normal,
                activity: Activity::Hold,
                heater: HeaterState::OffAtField,
            },
            output_field: 0.0,
            setpoint_field: 2.0,
            persistent_field: 2.0,
            sweep_rate_field: 0.1,
            output_current: 0.0,
            heater_current: 0.0,
        }
    }

    #[test]
    fn test_format_success() {
        let message = format_success("Heater on");
        assert!(message.contains("✓"));
        assert!(message.contains("Heater on"));
    }

    #[test]
    fn test_format_status_json() {
        let json = format_status(&report(), &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"]["heater"], "off_at_field");
        assert_eq!(value["status"]["activity"], "hold");
        assert_eq!(value["persistent_field"], 2.0);
    }

    #[test]
    fn test_format_status_table() {
        colored::control::set_override(false);
        let table = format_status(&report(), &OutputFormat::Table).unwrap();
        assert!(table.contains("Magnet Status:"));
        assert!(table.contains("Off, magnet at field"));
        assert!(table.contains("2.0000 T"));
    }

    #[test]
    fn test_format_reading() {
        let reading = Reading {
            quantity: "output_field".to_string(),
            value: -1.5,
            unit: "T".to_string(),
        };
        let json = format_reading(&reading, &OutputFormat::Json).unwrap();
        assert!(json.contains("\"value\": -1.5"));

        colored::control::set_override(false);
        let text = format_reading(&reading, &OutputFormat::Table).unwrap();
        assert_eq!(text, "output_field: -1.5 T");
    }

    #[test]
    fn test_format_ports() {
        colored::control::set_override(false);
        let empty = format_ports(&[], &OutputFormat::Table).unwrap();
        assert!(empty.contains("No serial ports"));

        let ports = vec!["/dev/ttyUSB0".to_string()];
        let json = format_ports(&ports, &OutputFormat::Json).unwrap();
        assert!(json.contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_format_config() {
        let config = StaticConfig::default();
        let toml = format_config(&config, &OutputFormat::Table).unwrap();
        assert!(toml.contains("[ramp]"));

        let json = format_config(&config, &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["serial"]["baud_rate"], 9600);
    }
}
