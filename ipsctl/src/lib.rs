//! IPS CLI Library
//!
//! Building blocks of the `ipsctl` tool: argument definitions and handlers,
//! layered configuration loading and output formatting. The instrument
//! itself is driven through [`ips_hardware::MagnetController`].
//!
//! ```no_run
//! use ipsctl::config::CliConfig;
//! use ips_hardware::MagnetController;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CliConfig::builder()
//!     .with_port("/dev/ttyUSB0")?
//!     .build()?;
//!
//! let magnet = MagnetController::open_serial(&config.instrument)?;
//! println!("Output field: {} T", magnet.get_output_field().await?);
//! # Ok(())
//! # }
//! ```

// Internal CLI implementation - not part of public API
#[doc(hidden)]
pub mod cli;

/// Configuration types for the CLI tool.
pub mod config;

// Internal formatting functions - not part of public API
#[doc(hidden)]
pub mod format;
