//! CLI configuration management
//!
//! Resolves the instrument configuration and CLI settings from, in
//! increasing priority: defaults, the TOML config file, environment
//! variables and command-line arguments.

use anyhow::{Context, Result};
use ips_core::{default_config_path, StaticConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "IPS_CONFIG";
/// Environment variable overriding the serial port
pub const ENV_PORT: &str = "IPS_PORT";
/// Environment variable overriding the output format
pub const ENV_FORMAT: &str = "IPS_FORMAT";

/// Effective CLI configuration
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CliConfig {
    /// Instrument configuration after all overrides
    pub instrument: StaticConfig,

    /// File the instrument configuration was read from, if any
    pub config_path: Option<PathBuf>,

    /// Output format ("table" or "json")
    pub output_format: String,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            instrument: StaticConfig::default(),
            config_path: None,
            output_format: "table".to_string(),
            verbose: false,
        }
    }
}

impl CliConfig {
    /// Create a new builder for constructing configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Read an instrument config file; a missing file yields `None`.
pub async fn load_instrument_config(path: &Path) -> Result<Option<StaticConfig>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("No config file at {}", path.display());
        return Ok(None);
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = StaticConfig::from_toml(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}

/// Write the default instrument configuration to `path`
pub async fn write_default_config(path: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(anyhow::anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create config directory")?;
    }

    let content = StaticConfig::default().to_toml()?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Builder for CLI configuration with validation and priority chain support
///
/// Priority chain (lowest to highest):
/// 1. Defaults
/// 2. Config file
/// 3. Environment variables
/// 4. CLI arguments
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    instrument: Option<StaticConfig>,
    config_path: Option<PathBuf>,
    loaded_from: Option<PathBuf>,
    port: Option<String>,
    output_format: Option<String>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit config file; it must exist.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Set serial port (with validation)
    pub fn with_port(mut self, port: impl Into<String>) -> Result<Self> {
        let port = port.into();
        Self::validate_port(&port)?;
        self.port = Some(port);
        Ok(self)
    }

    /// Set output format (with validation)
    pub fn with_output_format(mut self, format: impl Into<String>) -> Result<Self> {
        let format = format.into();
        Self::validate_output_format(&format)?;
        self.output_format = Some(format);
        Ok(self)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Load the instrument configuration file
    ///
    /// The explicit path wins, then `IPS_CONFIG`, then the default location.
    /// Only an explicitly named file has to exist.
    pub async fn with_config_file(mut self) -> Result<Self> {
        let (path, explicit) = match self.config_path.clone() {
            Some(path) => (path, true),
            None => match std::env::var(ENV_CONFIG) {
                Ok(path) if !path.is_empty() => (PathBuf::from(path), true),
                _ => (default_config_path(), false),
            },
        };

        match load_instrument_config(&path).await? {
            Some(config) => {
                self.instrument = Some(config);
                self.loaded_from = Some(path);
            }
            None if explicit => {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
            None => {}
        }
        Ok(self)
    }

    /// Apply `IPS_PORT` and `IPS_FORMAT` from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from `lookup`
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.is_empty()) {
            self = self
                .with_port(port)
                .with_context(|| format!("Invalid {}", ENV_PORT))?;
        }
        if let Some(format) = lookup(ENV_FORMAT).filter(|f| !f.is_empty()) {
            self = self
                .with_output_format(format)
                .with_context(|| format!("Invalid {}", ENV_FORMAT))?;
        }
        Ok(self)
    }

    /// Build the final configuration with validation
    pub fn build(self) -> Result<CliConfig> {
        let defaults = CliConfig::default();

        let mut instrument = self.instrument.unwrap_or(defaults.instrument);
        if let Some(port) = self.port {
            instrument.serial.port = port;
        }
        instrument.validate()?;

        let output_format = self.output_format.unwrap_or(defaults.output_format);
        Self::validate_output_format(&output_format)?;

        Ok(CliConfig {
            instrument,
            config_path: self.loaded_from,
            output_format,
            verbose: self.verbose.unwrap_or(defaults.verbose),
        })
    }

    fn validate_port(port: &str) -> Result<()> {
        if port.trim().is_empty() {
            return Err(anyhow::anyhow!("Serial port cannot be empty"));
        }
        Ok(())
    }

    fn validate_output_format(format: &str) -> Result<()> {
        match format {
            "table" | "json" => Ok(()),
            _ => Err(anyhow::anyhow!(
                "Invalid output format '{}'. Must be 'table' or 'json'",
                format
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_builder_with_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.instrument.serial.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_port("/dev/ttyS0")
            .unwrap()
            .with_output_format("json")
            .unwrap()
            .with_verbose(true)
            .build()
            .unwrap();

        assert_eq!(config.instrument.serial.port, "/dev/ttyS0");
        assert_eq!(config.output_format, "json");
        assert!(config.verbose);
    }

    #[test]
    fn test_builder_validation() {
        assert!(ConfigBuilder::new().with_port("  ").is_err());
        assert!(ConfigBuilder::new().with_output_format("xml").is_err());
        assert!(ConfigBuilder::new().with_output_format("table").is_ok());
    }

    #[test]
    fn test_env_style_overrides() {
        let env: HashMap<&str, &str> = [(ENV_PORT, "/dev/ttyACM1"), (ENV_FORMAT, "json")]
            .into_iter()
            .collect();

        let config = ConfigBuilder::new()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.instrument.serial.port, "/dev/ttyACM1");
        assert_eq!(config.output_format, "json");
    }

    #[test]
    fn test_cli_beats_environment() {
        let config = ConfigBuilder::new()
            .with_overrides_from(|key| (key == ENV_PORT).then(|| "/dev/env".to_string()))
            .unwrap()
            .with_port("/dev/cli")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.instrument.serial.port, "/dev/cli");
    }

    #[tokio::test]
    async fn test_config_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[serial]\nport = \"/dev/ttyS7\"\n\n[ramp]\nmax_field = 9.0\n")
            .await
            .unwrap();

        let config = ConfigBuilder::new()
            .with_config_path(&path)
            .with_config_file()
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.instrument.serial.port, "/dev/ttyS7");
        assert_eq!(config.instrument.ramp.max_field, 9.0);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ConfigBuilder::new()
            .with_config_path(dir.path().join("absent.toml"))
            .with_config_file()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[reconnect]\nmax_attempts = 0\n")
            .await
            .unwrap();
        assert!(load_instrument_config(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let loaded = load_instrument_config(&dir.path().join("none.toml"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_write_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ips").join("config.toml");

        write_default_config(&path, false).await.unwrap();
        let loaded = load_instrument_config(&path).await.unwrap().unwrap();
        assert_eq!(loaded, StaticConfig::default());

        assert!(write_default_config(&path, false).await.is_err());
        assert!(write_default_config(&path, true).await.is_ok());
    }

    #[test]
    fn test_bad_environment_value_is_reported() {
        let result = ConfigBuilder::new()
            .with_overrides_from(|key| (key == ENV_FORMAT).then(|| "yaml".to_string()));
        assert!(result.is_err());
    }
}
