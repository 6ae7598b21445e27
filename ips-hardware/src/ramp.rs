//! Ramp/mode state machine and energize/persist workflows
//!
//! [`Magnet`] owns the instrument session and implements every step as an
//! `&mut self` method. It is only reachable through the session guard, so a
//! workflow always runs start to finish without another caller's commands in
//! between.

use crate::interlock::{self, values_match};
use crate::serial_driver::Connector;
use crate::session::InstrumentSession;
use ips_core::{
    parse_reading, Activity, Command, HeaterState, HeaterSwitch, IpsError, Parameter, Polarity,
    RampConfig, Result, SystemFault, SystemStatus, Unit,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

/// Instrument session plus the ramp bounds used to drive it
pub struct Magnet<C: Connector> {
    session: InstrumentSession<C>,
    ramp: RampConfig,
}

impl<C: Connector> Magnet<C> {
    pub fn new(session: InstrumentSession<C>, ramp: RampConfig) -> Self {
        Self { session, ramp }
    }

    pub fn session_mut(&mut self) -> &mut InstrumentSession<C> {
        &mut self.session
    }

    // --- Readings ---

    /// Read one numeric parameter
    pub async fn read(&mut self, param: Parameter) -> Result<f64> {
        let reply = self.session.query(&Command::Read(param)).await?;
        parse_reading(&reply)
    }

    /// Read and decode the status frame
    pub async fn status(&mut self) -> Result<SystemStatus> {
        let reply = self.session.query(&Command::Status).await?;
        SystemStatus::decode(&reply)
    }

    /// Pass a raw command through to the instrument.
    ///
    /// Heater switching goes through the interlocked primitives. Polarity
    /// and setpoint writes are refused.
    pub async fn passthrough(&mut self, raw: &str) -> Result<String> {
        let upper = raw.to_ascii_uppercase();
        match upper.as_str() {
            "H0" => {
                self.heater_off().await?;
                Ok("H".to_string())
            }
            "H1" => {
                self.heater_on().await?;
                Ok("H".to_string())
            }
            _ if upper.starts_with(['H', 'P', 'I', 'J']) => {
                Err(IpsError::UnsafeTransition(format!(
                    "{} is not accepted as a raw command; use the heater or setpoint operations",
                    raw
                )))
            }
            _ => self.session.query_raw(raw).await,
        }
    }

    async fn send(&mut self, command: Command) -> Result<()> {
        debug!("Issuing {:?}", command);
        self.session.query(&command).await.map(|_| ())
    }

    // --- Setters ---

    fn validate_setpoint(&self, unit: Unit, value: f64) -> Result<()> {
        let limit = self.ramp.limit(unit);
        if !value.is_finite() || value.abs() > limit {
            return Err(IpsError::InvalidInput(format!(
                "{} setpoint must be within ±{} {}, got {}",
                unit,
                limit,
                unit.symbol(),
                value
            )));
        }
        Ok(())
    }

    fn validate_rate(unit: Unit, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate == 0.0 {
            return Err(IpsError::InvalidInput(format!(
                "{} sweep rate must be a finite, non-zero number, got {}",
                unit, rate
            )));
        }
        Ok(())
    }

    /// Select polarity from the sign of `value`, then send its magnitude.
    pub async fn set_setpoint(&mut self, unit: Unit, value: f64) -> Result<()> {
        self.validate_setpoint(unit, value)?;

        let status = self.status().await?;
        let current = self.read(Parameter::setpoint(unit)).await?;
        interlock::check_polarity(&status, current, value)?;

        self.send(Command::Polarity(Polarity::for_target(value)))
            .await?;
        self.send(Command::setpoint(unit, value)).await?;
        debug!("{} setpoint set to {} {}", unit, value, unit.symbol());
        Ok(())
    }

    /// Set the sweep rate; the sign of `rate` is ignored.
    pub async fn set_sweep_rate(&mut self, unit: Unit, rate: f64) -> Result<()> {
        Self::validate_rate(unit, rate)?;
        self.send(Command::sweep_rate(unit, rate)).await?;
        debug!("{} sweep rate set to {} {}/min", unit, rate.abs(), unit.symbol());
        Ok(())
    }

    // --- Primitive transitions ---

    pub async fn hold(&mut self) -> Result<()> {
        self.send(Command::Activity(Activity::Hold)).await
    }

    pub async fn clamp(&mut self) -> Result<()> {
        self.send(Command::Activity(Activity::Clamped)).await
    }

    /// Start sweeping to the field setpoint and wait until the output gets there.
    pub async fn go_to_setpoint(&mut self) -> Result<f64> {
        let target = self.read(Parameter::SetpointField).await?;
        self.send(Command::Activity(Activity::ToSetpoint)).await?;
        self.converge(Unit::Field, target).await
    }

    /// Start sweeping to zero and wait until the output gets there.
    pub async fn go_to_zero(&mut self) -> Result<f64> {
        self.send(Command::Activity(Activity::ToZero)).await?;
        self.converge(Unit::Field, 0.0).await
    }

    /// Switch the heater on after the interlock accepts fresh readings, then settle.
    pub async fn heater_on(&mut self) -> Result<()> {
        let status = self.status().await?;
        let persistent = self.read(Parameter::PersistentField).await?;
        let output = self.read(Parameter::OutputField).await?;
        interlock::check_heater_on(&status, persistent, output, self.ramp.field_tolerance)?;

        info!("Switch heater on at {} T", output);
        self.send(Command::Heater(HeaterSwitch::On)).await?;
        self.settle().await;
        Ok(())
    }

    /// Switch the heater off after the interlock accepts fresh readings, then settle.
    pub async fn heater_off(&mut self) -> Result<()> {
        let persistent = self.read(Parameter::PersistentField).await?;
        let output = self.read(Parameter::OutputField).await?;
        interlock::check_heater_off(persistent, output, self.ramp.field_tolerance)?;

        info!("Switch heater off at {} T", output);
        self.send(Command::Heater(HeaterSwitch::Off)).await?;
        self.settle().await;
        Ok(())
    }

    async fn settle(&mut self) {
        let delay = self.ramp.settle_delay();
        info!("Waiting {:?} for the switch to settle", delay);
        sleep(delay).await;
    }

    async fn ensure_hold(&mut self) -> Result<()> {
        if self.status().await?.activity != Activity::Hold {
            self.hold().await?;
        }
        Ok(())
    }

    /// Poll until the output of `unit` is within tolerance of `target`.
    ///
    /// Every poll decodes the status frame first; a system fault aborts the wait.
    pub async fn converge(&mut self, unit: Unit, target: f64) -> Result<f64> {
        let tolerance = self.ramp.tolerance(unit);
        let started = Instant::now();
        let deadline = started + self.ramp.convergence_timeout();
        let mut polls = 0u32;

        loop {
            polls += 1;

            let status = self.status().await?;
            if status.system_fault != SystemFault::Normal {
                error!(
                    "{} reported while converging to {} {}",
                    status.system_fault,
                    target,
                    unit.symbol()
                );
                return Err(IpsError::InstrumentFault(status.system_fault));
            }

            let value = self.read(Parameter::output(unit)).await?;
            if values_match(value, target, tolerance) {
                debug!(
                    "{} reached {} {} after {} poll(s)",
                    unit,
                    value,
                    unit.symbol(),
                    polls
                );
                return Ok(value);
            }

            if Instant::now() >= deadline {
                error!(
                    "{} stuck at {} {} (target {})",
                    unit,
                    value,
                    unit.symbol(),
                    target
                );
                return Err(IpsError::ConvergenceTimeout {
                    quantity: unit,
                    target,
                    last: value,
                    waited_secs: started.elapsed().as_secs_f64(),
                });
            }

            debug!("Poll {}: {} at {}, target {}", polls, unit, value, target);
            sleep(self.ramp.poll_interval()).await;
        }
    }

    // --- Workflows ---

    /// Energize: bring the output to the persistent field and switch the heater on.
    ///
    /// Ends in `Hold` with the heater on. Nothing to do if the heater is
    /// already on or no switch is fitted.
    pub async fn go_to_current_field(&mut self) -> Result<()> {
        let status = self.status().await?;
        match status.heater {
            HeaterState::On => {
                debug!("Heater already on, magnet is energized");
                return Ok(());
            }
            HeaterState::NoSwitch => {
                debug!("No switch fitted, nothing to energize");
                return Ok(());
            }
            HeaterState::Fault => {
                return Err(IpsError::UnsafeTransition(
                    "cannot energize: heater fault".to_string(),
                ));
            }
            HeaterState::OffAtZero | HeaterState::OffAtField => {}
        }

        if status.activity != Activity::Hold {
            self.hold().await?;
        }

        let persistent = self.read(Parameter::PersistentField).await?;
        let output = self.read(Parameter::OutputField).await?;
        info!("Energizing: output {} T, persistent {} T", output, persistent);

        if !values_match(persistent, output, self.ramp.field_tolerance) {
            self.set_setpoint(Unit::Field, persistent).await?;
            self.go_to_setpoint().await?;
            self.hold().await?;
        }

        self.heater_on().await?;
        info!("Magnet energized at {} T", persistent);
        Ok(())
    }

    /// De-energize: switch the heater off at field, run the leads down and clamp.
    ///
    /// Ends in `Clamped` with the heater off.
    pub async fn go_to_persistent_mode(&mut self) -> Result<()> {
        let status = self.status().await?;
        match status.heater {
            HeaterState::On => {
                if status.activity == Activity::ToSetpoint {
                    let setpoint = self.read(Parameter::SetpointField).await?;
                    self.converge(Unit::Field, setpoint).await?;
                }
                self.hold().await?;
                self.heater_off().await?;
            }
            HeaterState::OffAtZero | HeaterState::OffAtField => {
                debug!("Heater already off, only running the leads down");
            }
            HeaterState::NoSwitch => {
                return Err(IpsError::UnsafeTransition(
                    "cannot enter persistent mode: no switch fitted".to_string(),
                ));
            }
            HeaterState::Fault => {
                return Err(IpsError::UnsafeTransition(
                    "cannot enter persistent mode: heater fault".to_string(),
                ));
            }
        }

        self.go_to_zero().await?;
        self.clamp().await?;
        info!("Magnet persistent, output clamped");
        Ok(())
    }

    /// Sweep to `target` Tesla and leave the magnet energized.
    pub async fn set_magnet_field(&mut self, target: f64, rate: Option<f64>) -> Result<f64> {
        self.validate_setpoint(Unit::Field, target)?;
        if let Some(rate) = rate {
            Self::validate_rate(Unit::Field, rate)?;
        }

        info!("Setting magnet field to {} T", target);
        if let Some(rate) = rate {
            self.set_sweep_rate(Unit::Field, rate).await?;
        }

        self.go_to_current_field().await?;
        self.ensure_hold().await?;
        self.set_setpoint(Unit::Field, target).await?;
        let reached = self.go_to_setpoint().await?;

        info!("Magnet field at {} T", reached);
        Ok(reached)
    }

    /// Sweep to `target` Tesla, then enter persistent mode.
    pub async fn set_persistent_magnet_field(
        &mut self,
        target: f64,
        rate: Option<f64>,
    ) -> Result<()> {
        self.set_magnet_field(target, rate).await?;
        self.go_to_persistent_mode().await
    }
}
