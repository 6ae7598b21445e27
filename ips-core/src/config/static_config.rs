//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the controller is constructed.

use crate::error::{IpsError, Result};
use crate::types::Unit;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Line parameters for the instrument channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path (e.g. `/dev/ttyUSB0`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Terminator that ends every reply (single byte)
    pub read_termination: String,
    /// Terminator appended to every command
    pub write_termination: String,
    /// Per-exchange read/write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 2,
            read_termination: "\n".to_string(),
            write_termination: "\r\n".to_string(),
            timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The reply terminator as a byte
    pub fn read_terminator(&self) -> Result<u8> {
        match self.read_termination.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(IpsError::Config(format!(
                "read_termination must be a single byte, got {:?}",
                self.read_termination
            ))),
        }
    }
}

/// Longest accepted convergence timeout or settle delay (one week), in seconds
pub const MAX_WAIT_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Seconds as a `Duration`, clamped to `0..=MAX_WAIT_SECS`
fn bounded_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(MAX_WAIT_SECS)).unwrap_or(Duration::ZERO)
}

/// Ramp, settle and convergence bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    /// Interval between convergence polls in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum time to wait for the output to reach a target, in seconds
    pub convergence_timeout_secs: f64,
    /// Wait after every heater toggle, in seconds
    pub settle_delay_secs: f64,
    /// Field comparison tolerance in Tesla (half the reporting resolution)
    pub field_tolerance: f64,
    /// Current comparison tolerance in Amps (half the reporting resolution)
    pub current_tolerance: f64,
    /// Largest accepted field setpoint magnitude in Tesla
    pub max_field: f64,
    /// Largest accepted current setpoint magnitude in Amps
    pub max_current: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            convergence_timeout_secs: 1800.0,
            settle_delay_secs: 60.0,
            field_tolerance: 0.00005,
            current_tolerance: 0.0005,
            max_field: 12.0,
            max_current: 120.0,
        }
    }
}

impl RampConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn convergence_timeout(&self) -> Duration {
        bounded_secs(self.convergence_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        bounded_secs(self.settle_delay_secs)
    }

    /// Comparison tolerance for readings of `unit`
    pub fn tolerance(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Current => self.current_tolerance,
            Unit::Field => self.field_tolerance,
        }
    }

    /// Largest accepted setpoint magnitude for `unit`
    pub fn limit(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Current => self.max_current,
            Unit::Field => self.max_field,
        }
    }
}

/// Retry budget for the transport session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts before giving up with `ConnectionExhausted`
    pub max_attempts: u32,
    /// Delay after the first failed attempt in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for the delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 2000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait after `attempt` (1-based) failed attempts
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Static configuration for the controller.
///
/// Located at `~/.config/ips/config.toml` by default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub serial: SerialConfig,
    pub ramp: RampConfig,
    pub reconnect: ReconnectConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| IpsError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| IpsError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        self.serial.read_terminator()?;

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(IpsError::Config(format!(
                "data_bits must be 5-8, got {}",
                self.serial.data_bits
            )));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(IpsError::Config(format!(
                "stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            )));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(IpsError::Config(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }

        let positive = [
            ("ramp.convergence_timeout_secs", self.ramp.convergence_timeout_secs),
            ("ramp.field_tolerance", self.ramp.field_tolerance),
            ("ramp.current_tolerance", self.ramp.current_tolerance),
            ("ramp.max_field", self.ramp.max_field),
            ("ramp.max_current", self.ramp.max_current),
            ("reconnect.backoff_multiplier", self.reconnect.backoff_multiplier),
        ];
        if !(self.ramp.settle_delay_secs.is_finite() && self.ramp.settle_delay_secs >= 0.0) {
            return Err(IpsError::Config(format!(
                "ramp.settle_delay_secs must be zero or positive, got {}",
                self.ramp.settle_delay_secs
            )));
        }
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(IpsError::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        let waits = [
            ("ramp.convergence_timeout_secs", self.ramp.convergence_timeout_secs),
            ("ramp.settle_delay_secs", self.ramp.settle_delay_secs),
        ];
        for (name, value) in waits {
            if value > MAX_WAIT_SECS {
                return Err(IpsError::Config(format!(
                    "{} must be at most {} s, got {}",
                    name, MAX_WAIT_SECS, value
                )));
            }
        }
        Ok(())
    }
}
