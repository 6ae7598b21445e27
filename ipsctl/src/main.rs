//! IPS CLI
//!
//! Command-line control for an IPS superconducting magnet power supply.

use anyhow::Result;
use clap::Parser;
use colored::*;
use ips_core::{default_config_path, StaticConfig};
use ips_hardware::{MagnetController, SimulatedIps};
use ipsctl::cli::{handle_config, handle_instrument, handle_ports, Cli, Commands, ConfigCommands};
use ipsctl::config::{CliConfig, ConfigBuilder, ENV_CONFIG};
use ipsctl::format::OutputFormat;
use std::path::PathBuf;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = OutputFormat::from_name(cli.format.as_ref().map_or("table", |f| f.as_str()));

    // Writing a fresh config must not depend on an existing one
    if let Commands::Config {
        command: ConfigCommands::Init { force },
    } = cli.command
    {
        let target = config_target(&cli);
        return exit_on_error(
            handle_config(
                ConfigCommands::Init { force },
                &CliConfig::default(),
                &target,
                &format,
            )
            .await,
            cli.verbose,
        );
    }

    // Build configuration using priority chain: defaults → file → env → CLI args
    let mut builder = CliConfig::builder().with_verbose(cli.verbose);
    if let Some(ref path) = cli.config {
        builder = builder.with_config_path(path);
    }

    let config = match build_config(builder, &cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Configuration error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let format = OutputFormat::from_name(&config.output_format);

    if let Some(ref path) = config.config_path {
        debug!("Using config file {}", path.display());
    }

    let target = config_target(&cli);
    let result = match cli.command {
        Commands::Ports => handle_ports(&format),
        Commands::Config { command } => handle_config(command, &config, &target, &format).await,
        command if cli.mock => {
            info!("Mock mode: using a simulated power supply");
            let sim = SimulatedIps::new();
            match MagnetController::new(sim.connector(), &mock_config(&config.instrument)) {
                Ok(magnet) => handle_instrument(&magnet, command, &format).await,
                Err(e) => Err(e.into()),
            }
        }
        command => {
            debug!("Using serial port {}", config.instrument.serial.port);
            match MagnetController::open_serial(&config.instrument) {
                Ok(magnet) => handle_instrument(&magnet, command, &format).await,
                Err(e) => Err(e.into()),
            }
        }
    };

    exit_on_error(result, config.verbose)
}

async fn build_config(builder: ConfigBuilder, cli: &Cli) -> Result<CliConfig> {
    let mut builder = builder.with_config_file().await?.with_env_overrides()?;

    // CLI arguments have the highest priority
    if let Some(ref port) = cli.port {
        builder = builder.with_port(port)?;
    }
    if let Some(ref format) = cli.format {
        builder = builder.with_output_format(format.as_str())?;
    }
    builder.build()
}

/// Where `config init` writes: --config, then $IPS_CONFIG, then the default path
fn config_target(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| {
            std::env::var(ENV_CONFIG)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(default_config_path)
}

/// Shortened timings so simulated sweeps finish in seconds
fn mock_config(instrument: &StaticConfig) -> StaticConfig {
    let mut config = instrument.clone();
    config.ramp.poll_interval_ms = 20;
    config.ramp.settle_delay_secs = 0.2;
    config.ramp.convergence_timeout_secs = 30.0;
    config.reconnect.initial_delay_ms = 10;
    config
}

fn exit_on_error(result: Result<()>, verbose: bool) -> Result<()> {
    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if verbose {
            eprintln!("Error details: {:?}", e);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
