//! Instrument session with bounded reconnection
//!
//! The session owns the only handle to the instrument channel. Every exchange
//! goes through [`InstrumentSession::query`] or
//! [`InstrumentSession::ensure_connected`], both of which reopen a dead link
//! up to the configured attempt budget before giving up with
//! `ConnectionExhausted`.

use crate::serial_driver::{Connector, SerialTransport};
use ips_core::{check_reply, Command, IpsError, ReconnectConfig, Result};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Owned channel to one physical instrument
pub struct InstrumentSession<C: Connector> {
    connector: C,
    transport: Option<Box<dyn SerialTransport>>,
    reconnect: ReconnectConfig,
}

impl<C: Connector> InstrumentSession<C> {
    /// Create a closed session; the channel is opened lazily on first use.
    pub fn new(connector: C, reconnect: ReconnectConfig) -> Self {
        Self {
            connector,
            transport: None,
            reconnect,
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Open the channel and declare remote & unlocked control.
    pub async fn open(&mut self) -> Result<()> {
        debug!("Opening session to {}", self.connector.describe());
        let transport = self.connector.connect().await?;
        if let Some(path) = transport.port_path() {
            debug!("Channel open on {}", path);
        }
        self.transport = Some(transport);

        let init = Command::RemoteUnlocked.encode();
        let result = match self.send(&init).await {
            Ok(reply) => check_reply(&init, &reply),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.close();
            return Err(e);
        }

        info!("Session open: {}", self.connector.describe());
        Ok(())
    }

    /// Drop the channel handle
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Session to {} closed", self.connector.describe());
        }
    }

    /// One raw exchange on the current channel, no retries.
    pub async fn send(&mut self, command: &str) -> Result<String> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| IpsError::Channel("Session is not open".to_string()))?;
        transport.transaction(command).await
    }

    /// Probe the instrument, reopening the channel if the probe fails.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        let probe = Command::Version.encode();
        let reply = self.exchange_with_retry(&probe).await?;
        debug!("Liveness probe answered: {}", reply);
        Ok(())
    }

    /// Issue a command, retrying dead links, and reject `?` replies.
    pub async fn query(&mut self, command: &Command) -> Result<String> {
        self.query_raw(&command.encode()).await
    }

    /// Same as [`query`](Self::query) for a pre-encoded command string
    pub async fn query_raw(&mut self, command: &str) -> Result<String> {
        let reply = self.exchange_with_retry(command).await?;
        if let Err(e) = check_reply(command, &reply) {
            warn!("{}", e);
            return Err(e);
        }
        Ok(reply)
    }

    /// Close and reopen the channel unconditionally
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("Reconnecting to {}", self.connector.describe());
        self.close();
        self.ensure_connected().await
    }

    async fn exchange_with_retry(&mut self, command: &str) -> Result<String> {
        let attempts = self.reconnect.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let outcome = if self.is_open() {
                self.send(command).await
            } else {
                match self.open().await {
                    Ok(()) => self.send(command).await,
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(reply) => {
                    if attempt > 1 {
                        info!("{:?} succeeded on attempt {}/{}", command, attempt, attempts);
                    }
                    return Ok(reply);
                }
                Err(e) if !e.is_channel_error() => {
                    warn!("{:?} failed without a transport fault: {}", command, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} for {:?} failed: {}",
                        attempt, attempts, command, e
                    );
                    self.close();
                    last_error = e.to_string();

                    if attempt < attempts {
                        sleep(self.reconnect.delay_after(attempt)).await;
                    }
                }
            }
        }

        error!(
            "Giving up on {} after {} attempts",
            self.connector.describe(),
            attempts
        );
        Err(IpsError::ConnectionExhausted {
            attempts,
            reason: last_error,
        })
    }
}
