//! Serial driver for low-level instrument communication
//!
//! Provides async, line-terminated command/response exchange with the power supply.

use async_trait::async_trait;
use ips_core::{IpsError, Parity, Result, SerialConfig};
use std::time::Duration;
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

/// Trait for serial transport abstraction
///
/// Lets the session and controller run against mock or simulated
/// instruments as well as real hardware.
#[async_trait]
pub trait SerialTransport: Send {
    /// Send one command and wait for its reply line
    async fn transaction(&mut self, command: &str) -> Result<String>;

    /// Port path, if the transport has one
    fn port_path(&self) -> Option<&str>;
}

/// Opens fresh transports for a session
///
/// Called once at session start and again after every dead link.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SerialTransport>>;

    /// Human-readable target, used in logs
    fn describe(&self) -> String;
}

/// Serial driver for hardware communication
pub struct SerialDriver {
    port: SerialStream,
    port_path: String,
    write_termination: String,
    read_terminator: u8,
    timeout_duration: Duration,
}

impl SerialDriver {
    /// Open the serial device described by `config`
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!("Opening serial port: {}", config.port);

        let read_terminator = config.read_terminator()?;

        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            8 => tokio_serial::DataBits::Eight,
            other => {
                return Err(IpsError::Config(format!(
                    "data_bits must be 5-8, got {}",
                    other
                )))
            }
        };
        let parity = match config.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let stop_bits = match config.stop_bits {
            1 => tokio_serial::StopBits::One,
            2 => tokio_serial::StopBits::Two,
            other => {
                return Err(IpsError::Config(format!(
                    "stop_bits must be 1 or 2, got {}",
                    other
                )))
            }
        };

        let port = tokio_serial::new(&config.port, config.baud_rate)
            .timeout(config.timeout())
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", config.port, e);
                IpsError::Channel(format!("Failed to open serial port: {}", e))
            })?;

        debug!("Serial port opened successfully");

        Ok(Self {
            port,
            port_path: config.port.clone(),
            write_termination: config.write_termination.clone(),
            read_terminator,
            timeout_duration: config.timeout(),
        })
    }

    /// Write one terminated command
    async fn send(&mut self, command: &str) -> Result<()> {
        let full_command = format!("{}{}", command, self.write_termination);
        debug!("TX: {:?}", full_command);

        use tokio::io::AsyncWriteExt;

        timeout(
            self.timeout_duration,
            self.port.write_all(full_command.as_bytes()),
        )
        .await
        .map_err(|_| {
            error!("Write timeout");
            IpsError::Timeout("Write operation timed out".to_string())
        })?
        .map_err(|e| {
            error!("Write failed: {}", e);
            IpsError::Channel(format!("Write failed: {}", e))
        })?;

        timeout(self.timeout_duration, self.port.flush())
            .await
            .map_err(|_| IpsError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| IpsError::Channel(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    /// Read until a non-empty terminated reply arrives
    async fn read_reply(&mut self) -> Result<String> {
        use tokio::io::AsyncBufReadExt;
        use tokio::io::BufReader;

        let terminator = self.read_terminator;
        let mut reader = BufReader::new(&mut self.port);

        let result = timeout(self.timeout_duration, async {
            loop {
                let mut buf = Vec::new();
                match reader.read_until(terminator, &mut buf).await {
                    Ok(0) => {
                        warn!("Serial port returned EOF - device may have been disconnected");
                        return Err(IpsError::Channel(
                            "Serial port returned EOF - device disconnected".to_string(),
                        ));
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim().to_string();
                        if !line.is_empty() {
                            debug!("RX: {:?}", line);
                            return Ok(line);
                        }
                    }
                    Err(e) => {
                        error!("Read error: {}", e);
                        return Err(IpsError::Channel(format!("Read error: {}", e)));
                    }
                }
            }
        })
        .await;

        match result {
            Ok(reply) => reply,
            Err(_) => {
                error!("Read timeout");
                Err(IpsError::Timeout("Read operation timed out".to_string()))
            }
        }
    }

    /// Drop unread input
    fn clear_input_buffer(&mut self) -> Result<()> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| {
                warn!("Failed to clear input buffer: {}", e);
                IpsError::Channel(format!("Failed to clear buffer: {}", e))
            })
    }
}

#[async_trait]
impl SerialTransport for SerialDriver {
    async fn transaction(&mut self, command: &str) -> Result<String> {
        // Drop stale replies from an earlier, interrupted exchange
        self.clear_input_buffer()?;
        self.send(command).await?;
        self.read_reply().await
    }

    fn port_path(&self) -> Option<&str> {
        Some(&self.port_path)
    }
}

/// Connector that opens a [`SerialDriver`] with fixed line parameters
#[derive(Debug, Clone)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Box<dyn SerialTransport>> {
        let driver = SerialDriver::open(&self.config)?;
        Ok(Box::new(driver))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.config.port, self.config.baud_rate)
    }
}

/// List serial devices present on this machine
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(|e| {
        error!("Failed to enumerate serial ports: {}", e);
        IpsError::Channel(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports.into_iter().map(|port| port.port_name).collect())
}
