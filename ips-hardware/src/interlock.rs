//! Safety interlock for switch heater and polarity changes
//!
//! Pure pre-condition checks. The controller reads fresh values from the
//! instrument, runs the matching check and only then sends the command; a
//! failed check returns `UnsafeTransition` and nothing reaches the wire.

use ips_core::{Activity, HeaterState, IpsError, Polarity, Result, SystemFault, SystemStatus};

/// Whether two readings agree within `tolerance`
#[inline]
pub fn values_match(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// The heater may go off only while the magnet carries exactly what the supply outputs.
pub fn check_heater_off(persistent: f64, output: f64, tolerance: f64) -> Result<()> {
    if !values_match(persistent, output, tolerance) {
        return Err(IpsError::UnsafeTransition(format!(
            "heater off refused: persistent value {} differs from output {}",
            persistent, output
        )));
    }
    Ok(())
}

/// The heater may go on only in `Hold`, with a healthy switch and matching values.
pub fn check_heater_on(
    status: &SystemStatus,
    persistent: f64,
    output: f64,
    tolerance: f64,
) -> Result<()> {
    if status.system_fault != SystemFault::Normal {
        return Err(IpsError::UnsafeTransition(format!(
            "heater on refused: system reports {}",
            status.system_fault
        )));
    }
    match status.heater {
        HeaterState::Fault => {
            return Err(IpsError::UnsafeTransition(
                "heater on refused: heater fault".to_string(),
            ))
        }
        HeaterState::NoSwitch => {
            return Err(IpsError::UnsafeTransition(
                "heater on refused: no switch fitted".to_string(),
            ))
        }
        _ => {}
    }
    if status.activity != Activity::Hold {
        return Err(IpsError::UnsafeTransition(format!(
            "heater on refused: activity is {}, not Hold",
            status.activity
        )));
    }
    if !values_match(persistent, output, tolerance) {
        return Err(IpsError::UnsafeTransition(format!(
            "heater on refused: output {} does not match persistent value {}",
            output, persistent
        )));
    }
    Ok(())
}

/// Reversing the setpoint polarity is only allowed while the output is not sweeping.
pub fn check_polarity(status: &SystemStatus, current_setpoint: f64, target: f64) -> Result<()> {
    let reverses = Polarity::for_target(current_setpoint) != Polarity::for_target(target);
    if reverses && status.activity.is_sweeping() {
        return Err(IpsError::UnsafeTransition(format!(
            "polarity reversal refused while {} (setpoint {} -> {})",
            status.activity, current_setpoint, target
        )));
    }
    Ok(())
}
