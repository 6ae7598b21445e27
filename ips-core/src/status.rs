//! Status frame decoding
//!
//! The supply answers the `X` command with a fixed-width frame
//! `X{m}{n}A{a}C{c}H{h}M{m1}{m2}P{p1}{p2}`, one decimal digit per field.
//! Only the system (`m`, `n`), activity (`a`) and heater (`h`) digits are
//! decoded; the control, mode and polarity digits must be present but are
//! not interpreted.

use crate::error::{IpsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// System fault state (first `X` digit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemFault {
    Normal,
    Quenched,
    Overheated,
    WarmingUp,
    Fault,
}

impl SystemFault {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SystemFault::Normal),
            1 => Some(SystemFault::Quenched),
            2 => Some(SystemFault::Overheated),
            4 => Some(SystemFault::WarmingUp),
            8 => Some(SystemFault::Fault),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SystemFault::Normal => 0,
            SystemFault::Quenched => 1,
            SystemFault::Overheated => 2,
            SystemFault::WarmingUp => 4,
            SystemFault::Fault => 8,
        }
    }
}

impl fmt::Display for SystemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SystemFault::Normal => "Normal",
            SystemFault::Quenched => "Quenched",
            SystemFault::Overheated => "Overheated",
            SystemFault::WarmingUp => "Warming up",
            SystemFault::Fault => "Fault",
        };
        f.write_str(label)
    }
}

/// Voltage/current limit state (second `X` digit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoltageLimit {
    Normal,
    PositiveLimit,
    NegativeLimit,
    NegativeCurrentLimit,
    PositiveCurrentLimit,
}

impl VoltageLimit {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(VoltageLimit::Normal),
            1 => Some(VoltageLimit::PositiveLimit),
            2 => Some(VoltageLimit::NegativeLimit),
            4 => Some(VoltageLimit::NegativeCurrentLimit),
            8 => Some(VoltageLimit::PositiveCurrentLimit),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            VoltageLimit::Normal => 0,
            VoltageLimit::PositiveLimit => 1,
            VoltageLimit::NegativeLimit => 2,
            VoltageLimit::NegativeCurrentLimit => 4,
            VoltageLimit::PositiveCurrentLimit => 8,
        }
    }
}

impl fmt::Display for VoltageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VoltageLimit::Normal => "Normal",
            VoltageLimit::PositiveLimit => "On positive voltage limit",
            VoltageLimit::NegativeLimit => "On negative voltage limit",
            VoltageLimit::NegativeCurrentLimit => "Outside negative current limit",
            VoltageLimit::PositiveCurrentLimit => "Outside positive current limit",
        };
        f.write_str(label)
    }
}

/// Ramp activity (`A` digit); also the argument of the `A` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Hold,
    ToSetpoint,
    ToZero,
    Clamped,
}

impl Activity {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Activity::Hold),
            1 => Some(Activity::ToSetpoint),
            2 => Some(Activity::ToZero),
            4 => Some(Activity::Clamped),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Activity::Hold => 0,
            Activity::ToSetpoint => 1,
            Activity::ToZero => 2,
            Activity::Clamped => 4,
        }
    }

    /// Whether the output is being driven towards a target
    pub fn is_sweeping(self) -> bool {
        matches!(self, Activity::ToSetpoint | Activity::ToZero)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Activity::Hold => "Hold",
            Activity::ToSetpoint => "To setpoint",
            Activity::ToZero => "To zero",
            Activity::Clamped => "Clamped",
        };
        f.write_str(label)
    }
}

/// Switch heater state (`H` digit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaterState {
    OffAtZero,
    On,
    OffAtField,
    Fault,
    NoSwitch,
}

impl HeaterState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HeaterState::OffAtZero),
            1 => Some(HeaterState::On),
            2 => Some(HeaterState::OffAtField),
            5 => Some(HeaterState::Fault),
            8 => Some(HeaterState::NoSwitch),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            HeaterState::OffAtZero => 0,
            HeaterState::On => 1,
            HeaterState::OffAtField => 2,
            HeaterState::Fault => 5,
            HeaterState::NoSwitch => 8,
        }
    }

    /// Heater is off and the loop is superconducting
    pub fn is_off(self) -> bool {
        matches!(self, HeaterState::OffAtZero | HeaterState::OffAtField)
    }
}

impl fmt::Display for HeaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HeaterState::OffAtZero => "Off, magnet at zero",
            HeaterState::On => "On",
            HeaterState::OffAtField => "Off, magnet at field",
            HeaterState::Fault => "Heater fault",
            HeaterState::NoSwitch => "No switch present",
        };
        f.write_str(label)
    }
}

/// Decoded status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub system_fault: SystemFault,
    pub voltage_limit: VoltageLimit,
    pub activity: Activity,
    pub heater: HeaterState,
}

impl SystemStatus {
    /// Decode a raw `X` reply.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut fields = FrameCursor::new(raw.trim());

        let [m, n] = fields.field::<2>('X')?;
        let [a] = fields.field::<1>('A')?;
        fields.field::<1>('C')?;
        let [h] = fields.field::<1>('H')?;
        fields.field::<2>('M')?;
        fields.field::<2>('P')?;
        fields.finish()?;

        Ok(Self {
            system_fault: SystemFault::from_code(m)
                .ok_or_else(|| unknown_code(raw, "system", m))?,
            voltage_limit: VoltageLimit::from_code(n)
                .ok_or_else(|| unknown_code(raw, "limit", n))?,
            activity: Activity::from_code(a).ok_or_else(|| unknown_code(raw, "activity", a))?,
            heater: HeaterState::from_code(h).ok_or_else(|| unknown_code(raw, "heater", h))?,
        })
    }

    /// Encode as the instrument would report it, with remote/unlocked control
    /// and zeroed mode and polarity digits.
    pub fn to_frame(&self) -> String {
        format!(
            "X{}{}A{}C3H{}M00P00",
            self.system_fault.code(),
            self.voltage_limit.code(),
            self.activity.code(),
            self.heater.code()
        )
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}; {}; heater {}",
            self.system_fault, self.voltage_limit, self.activity, self.heater
        )
    }
}

fn unknown_code(raw: &str, field: &str, code: u8) -> IpsError {
    IpsError::MalformedStatus(format!("unknown {} code {} in {:?}", field, code, raw))
}

/// Walks a frame label by label
struct FrameCursor<'a> {
    raw: &'a str,
    rest: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            rest: raw.as_bytes(),
        }
    }

    fn field<const N: usize>(&mut self, label: char) -> Result<[u8; N]> {
        match self.rest.split_first() {
            Some((&first, tail)) if first == label as u8 => self.rest = tail,
            _ => {
                return Err(IpsError::MalformedStatus(format!(
                    "expected '{}' in {:?}",
                    label, self.raw
                )))
            }
        }

        let mut digits = [0u8; N];
        for digit in digits.iter_mut() {
            match self.rest.split_first() {
                Some((&byte, tail)) if byte.is_ascii_digit() => {
                    *digit = byte - b'0';
                    self.rest = tail;
                }
                _ => {
                    return Err(IpsError::MalformedStatus(format!(
                        "expected {} digit(s) after '{}' in {:?}",
                        N, label, self.raw
                    )))
                }
            }
        }
        Ok(digits)
    }

    fn finish(&self) -> Result<()> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(IpsError::MalformedStatus(format!(
                "trailing data in {:?}",
                self.raw
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_idle_frame() {
        let status = SystemStatus::decode("X00A0C3H0M00P00").unwrap();
        assert_eq!(status.system_fault, SystemFault::Normal);
        assert_eq!(status.voltage_limit, VoltageLimit::Normal);
        assert_eq!(status.activity, Activity::Hold);
        assert_eq!(status.heater, HeaterState::OffAtZero);
    }

    #[test]
    fn test_decode_sweeping_with_heater_on() {
        let status = SystemStatus::decode("X01A1C3H1M10P03\r\n").unwrap();
        assert_eq!(status.voltage_limit, VoltageLimit::PositiveLimit);
        assert_eq!(status.activity, Activity::ToSetpoint);
        assert_eq!(status.heater, HeaterState::On);
        assert!(status.activity.is_sweeping());
    }

    #[test]
    fn test_decode_quench_and_clamp() {
        let status = SystemStatus::decode("X18A4C0H2M00P00").unwrap();
        assert_eq!(status.system_fault, SystemFault::Quenched);
        assert_eq!(status.voltage_limit, VoltageLimit::PositiveCurrentLimit);
        assert_eq!(status.activity, Activity::Clamped);
        assert_eq!(status.heater, HeaterState::OffAtField);
        assert!(status.heater.is_off());
    }

    #[test]
    fn test_decode_heater_fault_and_no_switch() {
        let fault = SystemStatus::decode("X80A2C3H5M00P00").unwrap();
        assert_eq!(fault.system_fault, SystemFault::Fault);
        assert_eq!(fault.heater, HeaterState::Fault);

        let no_switch = SystemStatus::decode("X40A0C3H8M00P00").unwrap();
        assert_eq!(no_switch.system_fault, SystemFault::WarmingUp);
        assert_eq!(no_switch.heater, HeaterState::NoSwitch);
        assert!(!no_switch.heater.is_off());
    }

    #[test]
    fn test_decode_rejects_unknown_codes() {
        // 3 is not a valid system code, 3 is not a valid activity, 3 not a heater code
        for raw in ["X30A0C3H0M00P00", "X00A3C3H0M00P00", "X00A0C3H3M00P00", "X06A0C3H0M00P00"] {
            assert!(
                matches!(SystemStatus::decode(raw), Err(IpsError::MalformedStatus(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_decode_rejects_bad_layout() {
        let malformed = [
            "",
            "X",
            "?X",
            "X00A0C3H0M00P0",
            "X00A0C3H0M00P00Z",
            "Y00A0C3H0M00P00",
            "X00C3A0H0M00P00",
            "X0aA0C3H0M00P00",
            "X00A0C3H0M00",
            "garbage X00A0C3H0M00P00",
        ];
        for raw in malformed {
            assert!(
                matches!(SystemStatus::decode(raw), Err(IpsError::MalformedStatus(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_decode_total_over_all_digits() {
        // Every digit combination either decodes fully or fails with MalformedStatus.
        for m in 0..10u8 {
            for n in 0..10u8 {
                for a in 0..10u8 {
                    for h in 0..10u8 {
                        let raw = format!("X{}{}A{}C3H{}M00P00", m, n, a, h);
                        let all_known = SystemFault::from_code(m).is_some()
                            && VoltageLimit::from_code(n).is_some()
                            && Activity::from_code(a).is_some()
                            && HeaterState::from_code(h).is_some();

                        match SystemStatus::decode(&raw) {
                            Ok(status) => {
                                assert!(all_known, "{} decoded despite unknown code", raw);
                                assert_eq!(status, SystemStatus::decode(&raw).unwrap());
                            }
                            Err(IpsError::MalformedStatus(_)) => assert!(!all_known),
                            Err(e) => panic!("unexpected error {:?}", e),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_frame_matches_decoder_layout() {
        let status = SystemStatus {
            system_fault: SystemFault::Normal,
            voltage_limit: VoltageLimit::Normal,
            activity: Activity::Clamped,
            heater: HeaterState::OffAtField,
        };
        assert_eq!(status.to_frame(), "X00A4C3H2M00P00");
    }

    #[test]
    fn test_display_labels() {
        let status = SystemStatus::decode("X00A1C3H1M00P00").unwrap();
        assert_eq!(
            status.to_string(),
            "Normal, Normal; To setpoint; heater On"
        );
        assert_eq!(HeaterState::OffAtZero.to_string(), "Off, magnet at zero");
        assert_eq!(SystemFault::WarmingUp.to_string(), "Warming up");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let status = SystemStatus::decode("X00A2C3H2M00P00").unwrap();
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["activity"], "to_zero");
        assert_eq!(json["heater"], "off_at_field");
        assert_eq!(json["system_fault"], "normal");
    }
}
