//! IPS Core Library
//!
//! Shared types, status decoding, and configuration for controlling an
//! Oxford-style IPS superconducting magnet power supply. Used by the
//! hardware crate and the command-line front end.

pub mod config;
pub mod error;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use config::{
    default_config_path, Parity, RampConfig, ReconnectConfig, SerialConfig, StaticConfig,
};
pub use error::*;
pub use status::*;
pub use types::*;
