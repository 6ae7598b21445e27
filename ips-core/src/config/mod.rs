//! Configuration types for the IPS controller
//!
//! Everything lives in a single TOML file, loaded once at startup:
//! - `[serial]` - line parameters for the instrument channel
//! - `[ramp]` - polling, settle and convergence bounds plus magnet limits
//! - `[reconnect]` - retry budget for the transport session

mod paths;
mod static_config;

pub use paths::default_config_path;
pub use static_config::{Parity, RampConfig, ReconnectConfig, SerialConfig, StaticConfig};
