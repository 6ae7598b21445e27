//! Simulated power supply
//!
//! An in-memory instrument that speaks the same command set as the real
//! supply. The output moves a fixed step towards its target on every
//! exchange, the persistent value follows the output while the heater is on,
//! and `H1` is refused while the two differ. Used by the integration tests
//! and the command-line `--mock` mode.

use crate::serial_driver::{Connector, SerialTransport};
use async_trait::async_trait;
use ips_core::{
    Activity, HeaterState, IpsError, Polarity, Result, SystemFault, SystemStatus, VoltageLimit,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Amps per Tesla of the simulated magnet
pub const AMPS_PER_TESLA: f64 = 10.0;

/// Identity string returned for `V`
pub const VERSION: &str = "IPS120-10  Version 3.07  (c) OXFORD 1996";

/// Field step per exchange while sweeping, in Tesla
pub const DEFAULT_RAMP_STEP: f64 = 0.25;

const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct SimState {
    output_field: f64,
    persistent_field: f64,
    setpoint_magnitude: f64,
    polarity: Polarity,
    sweep_rate_field: f64,
    heater_on: bool,
    has_switch: bool,
    activity: Activity,
    system_fault: SystemFault,
    ramp_step: f64,
    quench_above: Option<f64>,
    failures_left: u32,
    connects: u32,
    log: Vec<String>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            output_field: 0.0,
            persistent_field: 0.0,
            setpoint_magnitude: 0.0,
            polarity: Polarity::Positive,
            sweep_rate_field: 0.1,
            heater_on: false,
            has_switch: true,
            activity: Activity::Hold,
            system_fault: SystemFault::Normal,
            ramp_step: DEFAULT_RAMP_STEP,
            quench_above: None,
            failures_left: 0,
            connects: 0,
            log: Vec::new(),
        }
    }
}

impl SimState {
    fn setpoint_field(&self) -> f64 {
        match self.polarity {
            Polarity::Positive => self.setpoint_magnitude,
            Polarity::Negative => -self.setpoint_magnitude,
        }
    }

    fn heater_state(&self) -> HeaterState {
        if !self.has_switch {
            HeaterState::NoSwitch
        } else if self.heater_on {
            HeaterState::On
        } else if self.persistent_field.abs() < EPSILON {
            HeaterState::OffAtZero
        } else {
            HeaterState::OffAtField
        }
    }

    fn status(&self) -> SystemStatus {
        SystemStatus {
            system_fault: self.system_fault,
            voltage_limit: VoltageLimit::Normal,
            activity: self.activity,
            heater: self.heater_state(),
        }
    }

    /// Advance the output one step towards the active target
    fn tick(&mut self) {
        let target = match self.activity {
            Activity::ToSetpoint => self.setpoint_field(),
            Activity::ToZero => 0.0,
            Activity::Hold | Activity::Clamped => return,
        };
        if self.system_fault != SystemFault::Normal {
            return;
        }

        let delta = target - self.output_field;
        if delta.abs() <= self.ramp_step {
            self.output_field = target;
        } else {
            self.output_field += self.ramp_step.copysign(delta);
        }

        if self.heater_on || !self.has_switch {
            self.persistent_field = self.output_field;
        }

        if let Some(limit) = self.quench_above {
            if self.output_field.abs() >= limit {
                self.system_fault = SystemFault::Quenched;
            }
        }
    }

    fn reading(&self, code: u8) -> Option<String> {
        let reply = match code {
            0 | 2 => format!("R{:+.3}", self.output_field * AMPS_PER_TESLA),
            1 => format!("R{:+.3}", self.output_field * 0.05),
            5 => format!("R{:+.3}", self.setpoint_field() * AMPS_PER_TESLA),
            6 => format!("R{:+.3}", self.sweep_rate_field * AMPS_PER_TESLA),
            7 => format!("R{:+.4}", self.output_field),
            8 => format!("R{:+.4}", self.setpoint_field()),
            9 => format!("R{:+.4}", self.sweep_rate_field),
            16 => format!("R{:+.3}", self.persistent_field * AMPS_PER_TESLA),
            18 => format!("R{:+.4}", self.persistent_field),
            20 => format!("R{:+.1}", if self.heater_on { 20.0 } else { 0.0 }),
            _ => return None,
        };
        Some(reply)
    }

    fn handle(&mut self, command: &str) -> String {
        let rejected = || format!("?{}", command);
        let (head, arg) = command.split_at(command.chars().next().map_or(0, char::len_utf8));

        match head {
            "V" if arg.is_empty() => VERSION.to_string(),
            "C" if arg == "3" => "C".to_string(),
            "X" if arg.is_empty() => self.status().to_frame(),
            "R" => match arg.parse::<u8>().ok().and_then(|code| self.reading(code)) {
                Some(reply) => reply,
                None => rejected(),
            },
            "A" => match arg.parse::<u8>().ok().and_then(Activity::from_code) {
                Some(activity) => {
                    self.activity = activity;
                    "A".to_string()
                }
                None => rejected(),
            },
            "H" => match arg {
                "0" if self.has_switch => {
                    self.heater_on = false;
                    "H".to_string()
                }
                "1" if self.has_switch => {
                    // The supply refuses to open the switch onto a mismatched magnet
                    if (self.output_field - self.persistent_field).abs() > EPSILON {
                        return rejected();
                    }
                    self.heater_on = true;
                    "H".to_string()
                }
                _ => rejected(),
            },
            "P" => match arg {
                "1" => {
                    self.polarity = Polarity::Positive;
                    "P".to_string()
                }
                "2" => {
                    self.polarity = Polarity::Negative;
                    "P".to_string()
                }
                _ => rejected(),
            },
            "I" | "J" | "S" | "T" => match arg.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => {
                    match head {
                        "I" => self.setpoint_magnitude = value / AMPS_PER_TESLA,
                        "J" => self.setpoint_magnitude = value,
                        "S" => self.sweep_rate_field = value / AMPS_PER_TESLA,
                        _ => self.sweep_rate_field = value,
                    }
                    head.to_string()
                }
                _ => rejected(),
            },
            _ => rejected(),
        }
    }
}

/// Shared handle to one simulated instrument
///
/// Clones observe and drive the same instrument, so a test can keep one
/// handle while the controller owns a connector built from another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedIps {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedIps {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connector that opens transports onto this instrument
    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector { sim: self.clone() }
    }

    /// Field step applied per exchange while sweeping; zero freezes the output.
    pub fn set_ramp_step(&self, step: f64) {
        self.lock().ramp_step = step.abs();
    }

    /// Put the magnet in persistent mode at `field` with the leads at zero
    pub fn set_persistent(&self, field: f64) {
        let mut state = self.lock();
        state.persistent_field = field;
        state.output_field = 0.0;
        state.heater_on = false;
        state.activity = Activity::Clamped;
    }

    pub fn set_output_field(&self, field: f64) {
        self.lock().output_field = field;
    }

    pub fn set_activity(&self, activity: Activity) {
        self.lock().activity = activity;
    }

    pub fn set_heater(&self, on: bool) {
        self.lock().heater_on = on;
    }

    /// Simulate a magnet without a persistent switch
    pub fn remove_switch(&self) {
        self.lock().has_switch = false;
    }

    pub fn set_fault(&self, fault: SystemFault) {
        self.lock().system_fault = fault;
    }

    /// Quench as soon as the output magnitude reaches `field`
    pub fn quench_above(&self, field: f64) {
        self.lock().quench_above = Some(field.abs());
    }

    /// Fail the next `count` exchanges as if the link had dropped
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_left = count;
    }

    /// Commands received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().log.clear();
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn output_field(&self) -> f64 {
        self.lock().output_field
    }

    pub fn persistent_field(&self) -> f64 {
        self.lock().persistent_field
    }

    pub fn setpoint_field(&self) -> f64 {
        self.lock().setpoint_field()
    }

    pub fn sweep_rate_field(&self) -> f64 {
        self.lock().sweep_rate_field
    }

    pub fn status(&self) -> SystemStatus {
        self.lock().status()
    }

    fn exchange(&self, command: &str) -> Result<String> {
        let mut state = self.lock();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(IpsError::Timeout("Read operation timed out".to_string()));
        }

        state.log.push(command.to_string());
        state.tick();
        let reply = state.handle(command);
        debug!("SIM {:?} -> {:?}", command, reply);
        Ok(reply)
    }
}

/// Connector for a [`SimulatedIps`]
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    sim: SimulatedIps,
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self) -> Result<Box<dyn SerialTransport>> {
        self.sim.lock().connects += 1;
        Ok(Box::new(SimulatedTransport {
            sim: self.sim.clone(),
        }))
    }

    fn describe(&self) -> String {
        "simulated IPS".to_string()
    }
}

/// Transport onto a [`SimulatedIps`]
pub struct SimulatedTransport {
    sim: SimulatedIps,
}

#[async_trait]
impl SerialTransport for SimulatedTransport {
    async fn transaction(&mut self, command: &str) -> Result<String> {
        let reply = self.sim.exchange(command);
        tokio::task::yield_now().await;
        reply
    }

    fn port_path(&self) -> Option<&str> {
        None
    }
}
