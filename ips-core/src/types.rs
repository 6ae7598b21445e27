//! Wire-level types for the IPS command protocol

use crate::error::{IpsError, Result};
use crate::status::Activity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical quantity a setpoint, rate or reading refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Amps (rates in A/min)
    Current,
    /// Tesla (rates in T/min)
    Field,
}

impl Unit {
    /// SI symbol used in human-readable output
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Current => "A",
            Unit::Field => "T",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Current => write!(f, "current"),
            Unit::Field => write!(f, "field"),
        }
    }
}

/// Polarity selector sent ahead of every setpoint
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive = 1,
    Negative = 2,
}

impl Polarity {
    /// Polarity for a signed target: zero counts as positive.
    pub fn for_target(value: f64) -> Self {
        if value < 0.0 {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }
}

/// Readable instrument parameters (`R{n}`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Output current, A
    OutputCurrent = 0,
    /// Supply voltage, V
    SupplyVoltage = 1,
    /// Magnet current, A
    MagnetCurrent = 2,
    /// Target current, A
    SetpointCurrent = 5,
    /// Current sweep rate, A/min
    SweepRateCurrent = 6,
    /// Output field, T
    OutputField = 7,
    /// Target field, T
    SetpointField = 8,
    /// Field sweep rate, T/min
    SweepRateField = 9,
    /// Persistent magnet current, A
    PersistentCurrent = 16,
    /// Persistent magnet field, T
    PersistentField = 18,
    /// Switch heater current, mA
    HeaterCurrent = 20,
}

impl Parameter {
    /// Numeric code used on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Output reading for a unit
    pub fn output(unit: Unit) -> Self {
        match unit {
            Unit::Current => Parameter::OutputCurrent,
            Unit::Field => Parameter::OutputField,
        }
    }

    /// Setpoint reading for a unit
    pub fn setpoint(unit: Unit) -> Self {
        match unit {
            Unit::Current => Parameter::SetpointCurrent,
            Unit::Field => Parameter::SetpointField,
        }
    }

    /// Sweep rate reading for a unit
    pub fn sweep_rate(unit: Unit) -> Self {
        match unit {
            Unit::Current => Parameter::SweepRateCurrent,
            Unit::Field => Parameter::SweepRateField,
        }
    }

    /// Persistent value reading for a unit
    pub fn persistent(unit: Unit) -> Self {
        match unit {
            Unit::Current => Parameter::PersistentCurrent,
            Unit::Field => Parameter::PersistentField,
        }
    }
}

/// Switch heater command argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaterSwitch {
    Off,
    On,
}

/// Commands understood by the power supply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Remote & unlocked control (`C3`)
    RemoteUnlocked,
    /// Identity query, used as the liveness probe (`V`)
    Version,
    /// Read one parameter (`R{n}`)
    Read(Parameter),
    /// Status frame (`X`)
    Status,
    /// Activity transition (`A{n}`)
    Activity(Activity),
    /// Switch heater (`H0`/`H1`)
    Heater(HeaterSwitch),
    /// Polarity selector (`P1`/`P2`)
    Polarity(Polarity),
    /// Setpoint magnitude (`I`/`J`)
    Setpoint { unit: Unit, magnitude: f64 },
    /// Sweep rate magnitude (`S`/`T`)
    SweepRate { unit: Unit, magnitude: f64 },
}

impl Command {
    /// Setpoint command; the sign travels separately as a [`Polarity`].
    pub fn setpoint(unit: Unit, value: f64) -> Self {
        Command::Setpoint {
            unit,
            magnitude: value.abs(),
        }
    }

    /// Sweep rate command, always transmitted as a magnitude
    pub fn sweep_rate(unit: Unit, rate: f64) -> Self {
        Command::SweepRate {
            unit,
            magnitude: rate.abs(),
        }
    }

    /// Wire representation without line termination
    pub fn encode(&self) -> String {
        match *self {
            Command::RemoteUnlocked => "C3".to_string(),
            Command::Version => "V".to_string(),
            Command::Read(param) => format!("R{}", param.code()),
            Command::Status => "X".to_string(),
            Command::Activity(activity) => format!("A{}", activity.code()),
            Command::Heater(HeaterSwitch::Off) => "H0".to_string(),
            Command::Heater(HeaterSwitch::On) => "H1".to_string(),
            Command::Polarity(polarity) => format!("P{}", polarity as u8),
            Command::Setpoint {
                unit: Unit::Current,
                magnitude,
            } => format!("I{:.3}", magnitude.abs()),
            Command::Setpoint {
                unit: Unit::Field,
                magnitude,
            } => format!("J{:.4}", magnitude.abs()),
            Command::SweepRate {
                unit: Unit::Current,
                magnitude,
            } => format!("S{:.2}", magnitude.abs()),
            Command::SweepRate {
                unit: Unit::Field,
                magnitude,
            } => format!("T{:.3}", magnitude.abs()),
        }
    }
}

/// Check a raw reply for the `?<command>` rejection marker.
pub fn check_reply(command: &str, reply: &str) -> Result<()> {
    if reply.starts_with('?') {
        return Err(IpsError::Rejected(format!("{} (reply {:?})", command, reply)));
    }
    Ok(())
}

/// Parse a numeric reading such as `R+3.5000`.
///
/// The echoed `R` is optional; anything else that is not a finite number is an error.
pub fn parse_reading(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_prefix('R').unwrap_or(trimmed).trim();

    let value = number
        .parse::<f64>()
        .map_err(|e| IpsError::Parse(format!("Invalid reading {:?}: {}", raw, e)))?;

    if !value.is_finite() {
        return Err(IpsError::Parse(format!("Non-finite reading {:?}", raw)));
    }
    Ok(value)
}
