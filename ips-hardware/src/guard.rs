//! Exclusive access to the instrument session
//!
//! Every public operation runs inside [`SessionGuard::run`]. The lock is a
//! FIFO-fair `tokio::sync::Mutex`, so callers are served in arrival order and
//! a multi-step workflow holds the session from its first command to its last.

use crate::ramp::Magnet;
use crate::serial_driver::Connector;
use ips_core::Result;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Serializes access to one [`Magnet`]
pub struct SessionGuard<C: Connector> {
    magnet: Mutex<Magnet<C>>,
}

impl<C: Connector + 'static> SessionGuard<C> {
    pub fn new(magnet: Magnet<C>) -> Self {
        Self {
            magnet: Mutex::new(magnet),
        }
    }

    /// Run `f` with exclusive access after checking the instrument is alive.
    ///
    /// # Example
    ///
    /// ```ignore
    /// guard.run("get_status", |magnet| Box::pin(async move {
    ///     magnet.status().await
    /// })).await
    /// ```
    pub async fn run<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Magnet<C>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        self.run_inner(operation, true, f).await
    }

    /// Same as [`run`](Self::run) without the liveness probe
    ///
    /// Used by operations that manage the link themselves, such as a forced reconnect.
    pub async fn run_unprobed<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Magnet<C>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        self.run_inner(operation, false, f).await
    }

    async fn run_inner<F, T>(&self, operation: &str, probe: bool, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Magnet<C>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        let requested = Instant::now();
        let mut magnet = self.magnet.lock().await;
        debug!(
            "{} acquired the session after {:?}",
            operation,
            requested.elapsed()
        );

        if probe {
            if let Err(e) = magnet.session_mut().ensure_connected().await {
                warn!("{} aborted, instrument unreachable: {}", operation, e);
                return Err(e);
            }
        }

        let result = f(&mut *magnet).await;
        if let Err(ref e) = result {
            warn!("{} failed: {}", operation, e);
        }
        result
    }
}
