//! iobridged - I/O bridge daemon
//!
//! Exchanges pin states between the control framework and a USB serial
//! I/O expander, one input frame and one output frame per cycle.
//!
//! Usage:
//!   iobridged [OPTIONS] [config.toml|config.json]
//!
//! If no config file is provided, `--mock` runs against a simulated
//! controller for demo purposes.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use iobridge_core::{BridgeConfig, MemoryRegistry, PinMap, SignalRegistry, TransportKind};
use iobridge_serial::{create_connector, enumerate_ports, PollLoop};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "iobridged")]
#[command(author, version, about = "Serial I/O expander bridge daemon")]
struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(value_name = "CONFIG", conflicts_with = "config")]
    config_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "IOBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Use the simulated controller instead of a serial device
    #[arg(long)]
    mock: bool,

    /// List serial devices and exit
    #[arg(long)]
    list_ports: bool,

    /// Validate the configuration, print the pin table and exit
    #[arg(long)]
    check_config: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn config_file(&self) -> Option<&PathBuf> {
        self.config_path.as_ref().or(self.config.as_ref())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        init_logging(&cli, None)?;
        return list_ports();
    }

    let mut bridge_config = match cli.config_file() {
        Some(path) => config::load(path)?,
        None if cli.mock => config::demo(),
        None => bail!("no configuration file given (use --mock to run without hardware)"),
    };
    if cli.mock {
        bridge_config.transport = TransportKind::Mock;
    }

    init_logging(&cli, bridge_config.log_level.as_deref())?;
    bridge_config
        .validate()
        .context("Invalid configuration")?;

    if cli.check_config {
        return check_config(&bridge_config);
    }

    info!(
        component = %bridge_config.component,
        transport = ?bridge_config.transport,
        "Starting iobridged"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let registry = create_registry(&bridge_config);
    let connector = create_connector(&bridge_config);
    let mut bridge = PollLoop::new(&bridge_config, registry, connector)?;
    bridge.run(&shutdown)?;

    info!("iobridged stopped");
    Ok(())
}

fn init_logging(cli: &Cli, configured_level: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(config::level_directive(cli.verbose, configured_level)?),
    };

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = enumerate_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn check_config(config: &BridgeConfig) -> Result<()> {
    let pins = PinMap::new(config.component.clone(), config.input_count, config.output_count)?;
    println!("Configuration OK");
    println!("{}", pins);
    for pin in pins.pins() {
        println!("  {:<6} {}", format!("{:?}", pin.direction), pins.qualified(&pin.name));
    }
    Ok(())
}

#[cfg(feature = "linuxcnc")]
fn create_registry(config: &BridgeConfig) -> Arc<dyn SignalRegistry> {
    use iobridge_core::registry::hal::HalRegistry;

    match HalRegistry::new(&config.component) {
        Ok(hal) => Arc::new(hal),
        Err(e) => {
            warn!(error = %e, "HAL unavailable, providing shim layer");
            Arc::new(MemoryRegistry::new(config.component.clone()))
        }
    }
}

#[cfg(not(feature = "linuxcnc"))]
fn create_registry(config: &BridgeConfig) -> Arc<dyn SignalRegistry> {
    warn!("HAL unavailable, providing shim layer");
    Arc::new(MemoryRegistry::new(config.component.clone()))
}
