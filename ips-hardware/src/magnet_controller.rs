//! High-level magnet controller
//!
//! The public face of the crate. Every method locks the session, probes the
//! instrument and then runs one reading, primitive or full workflow to
//! completion. The controller is `Send + Sync` and meant to be shared behind
//! an `Arc`; concurrent callers are served one at a time in arrival order.

use crate::guard::SessionGuard;
use crate::ramp::Magnet;
use crate::serial_driver::{Connector, SerialConnector};
use crate::session::InstrumentSession;
use ips_core::{
    parse_reading, Activity, HeaterState, Parameter, Result, StaticConfig, SystemStatus, Unit,
};
use tracing::info;

/// Magnet power-supply controller
pub struct MagnetController<C: Connector> {
    guard: SessionGuard<C>,
}

impl MagnetController<SerialConnector> {
    /// Controller for the serial device named in `config`
    pub fn open_serial(config: &StaticConfig) -> Result<Self> {
        Self::new(SerialConnector::new(config.serial.clone()), config)
    }
}

impl<C: Connector + 'static> MagnetController<C> {
    /// Create a controller; the channel opens on the first operation.
    ///
    /// Fails with `Config` if `config` does not pass validation.
    pub fn new(connector: C, config: &StaticConfig) -> Result<Self> {
        config.validate()?;
        info!("Magnet controller for {}", connector.describe());
        let session = InstrumentSession::new(connector, config.reconnect.clone());
        Ok(Self {
            guard: SessionGuard::new(Magnet::new(session, config.ramp.clone())),
        })
    }

    async fn read(&self, operation: &'static str, param: Parameter) -> Result<f64> {
        self.guard
            .run(operation, move |magnet| {
                Box::pin(async move { magnet.read(param).await })
            })
            .await
    }

    // --- Readings ---

    /// Output current (A)
    pub async fn get_output_current(&self) -> Result<f64> {
        self.read("get_output_current", Parameter::OutputCurrent)
            .await
    }

    /// Output field (T)
    pub async fn get_output_field(&self) -> Result<f64> {
        self.read("get_output_field", Parameter::OutputField).await
    }

    /// Measured magnet current (A)
    pub async fn get_magnet_current(&self) -> Result<f64> {
        self.read("get_magnet_current", Parameter::MagnetCurrent)
            .await
    }

    /// Supply output voltage (V)
    pub async fn get_supply_voltage(&self) -> Result<f64> {
        self.read("get_supply_voltage", Parameter::SupplyVoltage)
            .await
    }

    pub async fn get_setpoint_current(&self) -> Result<f64> {
        self.read("get_setpoint_current", Parameter::SetpointCurrent)
            .await
    }

    pub async fn get_setpoint_field(&self) -> Result<f64> {
        self.read("get_setpoint_field", Parameter::SetpointField)
            .await
    }

    pub async fn get_sweep_rate_current(&self) -> Result<f64> {
        self.read("get_sweep_rate_current", Parameter::SweepRateCurrent)
            .await
    }

    pub async fn get_sweep_rate_field(&self) -> Result<f64> {
        self.read("get_sweep_rate_field", Parameter::SweepRateField)
            .await
    }

    /// Current trapped in the magnet (A)
    pub async fn get_persistent_current(&self) -> Result<f64> {
        self.read("get_persistent_current", Parameter::PersistentCurrent)
            .await
    }

    /// Field trapped in the magnet (T)
    pub async fn get_persistent_field(&self) -> Result<f64> {
        self.read("get_persistent_field", Parameter::PersistentField)
            .await
    }

    /// Switch heater current (mA)
    pub async fn get_heater_current(&self) -> Result<f64> {
        self.read("get_heater_current", Parameter::HeaterCurrent)
            .await
    }

    /// Any readable parameter
    pub async fn get_parameter(&self, param: Parameter) -> Result<f64> {
        self.read("get_parameter", param).await
    }

    /// Decoded status frame
    pub async fn get_status(&self) -> Result<SystemStatus> {
        self.guard
            .run("get_status", |magnet| {
                Box::pin(async move { magnet.status().await })
            })
            .await
    }

    pub async fn is_heater_on(&self) -> Result<bool> {
        Ok(self.get_status().await?.heater == HeaterState::On)
    }

    pub async fn is_on_hold(&self) -> Result<bool> {
        Ok(self.get_status().await?.activity == Activity::Hold)
    }

    pub async fn is_going_to_setpoint(&self) -> Result<bool> {
        Ok(self.get_status().await?.activity == Activity::ToSetpoint)
    }

    pub async fn is_going_to_zero(&self) -> Result<bool> {
        Ok(self.get_status().await?.activity == Activity::ToZero)
    }

    pub async fn is_clamped(&self) -> Result<bool> {
        Ok(self.get_status().await?.activity == Activity::Clamped)
    }

    // --- Setters ---

    pub async fn set_setpoint_current(&self, amps: f64) -> Result<()> {
        self.guard
            .run("set_setpoint_current", move |magnet| {
                Box::pin(async move { magnet.set_setpoint(Unit::Current, amps).await })
            })
            .await
    }

    pub async fn set_setpoint_field(&self, tesla: f64) -> Result<()> {
        self.guard
            .run("set_setpoint_field", move |magnet| {
                Box::pin(async move { magnet.set_setpoint(Unit::Field, tesla).await })
            })
            .await
    }

    /// Set the current sweep rate (A/min); the sign is ignored.
    pub async fn set_sweep_rate_current(&self, rate: f64) -> Result<()> {
        self.guard
            .run("set_sweep_rate_current", move |magnet| {
                Box::pin(async move { magnet.set_sweep_rate(Unit::Current, rate).await })
            })
            .await
    }

    /// Set the field sweep rate (T/min); the sign is ignored.
    pub async fn set_sweep_rate_field(&self, rate: f64) -> Result<()> {
        self.guard
            .run("set_sweep_rate_field", move |magnet| {
                Box::pin(async move { magnet.set_sweep_rate(Unit::Field, rate).await })
            })
            .await
    }

    // --- Primitive transitions ---

    pub async fn hold(&self) -> Result<()> {
        self.guard
            .run("hold", |magnet| Box::pin(async move { magnet.hold().await }))
            .await
    }

    /// Sweep to the field setpoint and wait for the output to arrive.
    pub async fn go_to_setpoint(&self) -> Result<f64> {
        self.guard
            .run("go_to_setpoint", |magnet| {
                Box::pin(async move { magnet.go_to_setpoint().await })
            })
            .await
    }

    /// Sweep to zero and wait for the output to arrive.
    pub async fn go_to_zero(&self) -> Result<f64> {
        self.guard
            .run("go_to_zero", |magnet| {
                Box::pin(async move { magnet.go_to_zero().await })
            })
            .await
    }

    pub async fn clamp(&self) -> Result<()> {
        self.guard
            .run("clamp", |magnet| Box::pin(async move { magnet.clamp().await }))
            .await
    }

    /// Switch heater on; refused unless the interlock conditions hold.
    pub async fn heater_on(&self) -> Result<()> {
        self.guard
            .run("heater_on", |magnet| {
                Box::pin(async move { magnet.heater_on().await })
            })
            .await
    }

    /// Switch heater off; refused while persistent and output values differ.
    pub async fn heater_off(&self) -> Result<()> {
        self.guard
            .run("heater_off", |magnet| {
                Box::pin(async move { magnet.heater_off().await })
            })
            .await
    }

    // --- Workflows ---

    /// Energize the magnet: output to the persistent field, heater on.
    pub async fn go_to_current_field(&self) -> Result<()> {
        self.guard
            .run("go_to_current_field", |magnet| {
                Box::pin(async move { magnet.go_to_current_field().await })
            })
            .await
    }

    /// De-energize: heater off at field, leads to zero, output clamped.
    pub async fn go_to_persistent_mode(&self) -> Result<()> {
        self.guard
            .run("go_to_persistent_mode", |magnet| {
                Box::pin(async move { magnet.go_to_persistent_mode().await })
            })
            .await
    }

    /// Sweep to `target` Tesla, optionally setting the field rate first.
    ///
    /// Returns the output field once it has converged.
    pub async fn set_magnet_field(&self, target: f64, rate: Option<f64>) -> Result<f64> {
        self.guard
            .run("set_magnet_field", move |magnet| {
                Box::pin(async move { magnet.set_magnet_field(target, rate).await })
            })
            .await
    }

    /// Sweep to `target` Tesla and leave the magnet persistent.
    pub async fn set_persistent_magnet_field(&self, target: f64, rate: Option<f64>) -> Result<()> {
        self.guard
            .run("set_persistent_magnet_field", move |magnet| {
                Box::pin(async move { magnet.set_persistent_magnet_field(target, rate).await })
            })
            .await
    }

    // --- Link management ---

    /// Send a raw command and return the reply verbatim.
    ///
    /// `H0`/`H1` run through the heater interlock, polarity and setpoint
    /// writes are refused with `UnsafeTransition`. A `?` reply is still
    /// reported as `Rejected`.
    pub async fn query(&self, command: &str) -> Result<String> {
        let command = command.trim().to_string();
        self.guard
            .run("query", move |magnet| {
                Box::pin(async move { magnet.passthrough(&command).await })
            })
            .await
    }

    /// Send a raw read command and parse the numeric reply.
    pub async fn query_value(&self, command: &str) -> Result<f64> {
        parse_reading(&self.query(command).await?)
    }

    /// Close and reopen the instrument channel.
    pub async fn reconnect(&self) -> Result<()> {
        self.guard
            .run_unprobed("reconnect", |magnet| {
                Box::pin(async move { magnet.session_mut().reconnect().await })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedIps;

    fn controller(sim: &SimulatedIps) -> MagnetController<crate::simulator::SimulatedConnector> {
        let mut config = StaticConfig::default();
        config.ramp.poll_interval_ms = 1;
        config.ramp.settle_delay_secs = 0.0;
        config.reconnect.initial_delay_ms = 0;
        MagnetController::new(sim.connector(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_first_operation_opens_session() {
        let sim = SimulatedIps::new();
        let ctrl = controller(&sim);
        assert_eq!(sim.connects(), 0);

        let status = ctrl.get_status().await.unwrap();
        assert_eq!(status.activity, Activity::Hold);
        assert_eq!(sim.commands(), vec!["C3", "V", "X"]);
    }

    #[tokio::test]
    async fn test_readings_use_parameter_codes() {
        let sim = SimulatedIps::new();
        let ctrl = controller(&sim);

        assert_eq!(ctrl.get_heater_current().await.unwrap(), 0.0);
        assert_eq!(ctrl.get_sweep_rate_field().await.unwrap(), 0.1);
        assert_eq!(ctrl.get_sweep_rate_current().await.unwrap(), 1.0);

        let reads: Vec<_> = sim
            .commands()
            .into_iter()
            .filter(|c| c.starts_with('R'))
            .collect();
        assert_eq!(reads, vec!["R20", "R9", "R6"]);
    }

    #[tokio::test]
    async fn test_raw_query_passthrough() {
        let sim = SimulatedIps::new();
        let ctrl = controller(&sim);

        assert_eq!(ctrl.query(" V ").await.unwrap(), crate::simulator::VERSION);
        assert_eq!(ctrl.query_value("R18").await.unwrap(), 0.0);
        assert!(matches!(
            ctrl.query("Z9").await,
            Err(ips_core::IpsError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_raw_setpoint_writes_are_refused() {
        let sim = SimulatedIps::new();
        let ctrl = controller(&sim);

        for raw in ["P2", "J1.0000", "I10.000", "h0x"] {
            let err = ctrl.query(raw).await.unwrap_err();
            assert!(
                matches!(err, ips_core::IpsError::UnsafeTransition(_)),
                "{}: {:?}",
                raw,
                err
            );
        }
        assert_eq!(sim.commands(), vec!["C3", "V", "V", "V", "V"]);
    }

    #[tokio::test]
    async fn test_invalid_config_is_refused() {
        let sim = SimulatedIps::new();
        let mut config = StaticConfig::default();
        config.ramp.settle_delay_secs = -1.0;
        assert!(matches!(
            MagnetController::new(sim.connector(), &config),
            Err(ips_core::IpsError::Config(_))
        ));

        config.ramp.settle_delay_secs = 0.0;
        config.ramp.convergence_timeout_secs = 1e30;
        assert!(matches!(
            MagnetController::new(sim.connector(), &config),
            Err(ips_core::IpsError::Config(_))
        ));
        assert_eq!(sim.connects(), 0);
    }

    #[tokio::test]
    async fn test_status_predicates() {
        let sim = SimulatedIps::new();
        let ctrl = controller(&sim);

        assert!(ctrl.is_on_hold().await.unwrap());
        assert!(!ctrl.is_heater_on().await.unwrap());

        ctrl.clamp().await.unwrap();
        assert!(ctrl.is_clamped().await.unwrap());
        assert!(!ctrl.is_going_to_setpoint().await.unwrap());
        assert!(!ctrl.is_going_to_zero().await.unwrap());
    }
}
