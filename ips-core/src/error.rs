//! Error types for the IPS controller

use crate::status::SystemFault;
use crate::types::Unit;
use thiserror::Error;

/// Core error type for IPS operations
#[derive(Error, Debug)]
pub enum IpsError {
    /// One command/response exchange failed on the serial channel
    #[error("Channel error: {0}")]
    Channel(String),

    /// A read or write on the serial channel did not complete in time
    #[error("Channel timed out: {0}")]
    Timeout(String),

    /// Reconnection budget exceeded
    #[error("Connection exhausted after {attempts} attempts: {reason}")]
    ConnectionExhausted { attempts: u32, reason: String },

    /// Status frame did not match the expected layout or carried an unknown code
    #[error("Malformed status frame: {0}")]
    MalformedStatus(String),

    /// Numeric reply could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The instrument answered with `?<command>`
    #[error("Command rejected by instrument: {0}")]
    Rejected(String),

    /// Output did not reach its target before the deadline
    #[error(
        "{quantity} did not converge to {target} within {waited_secs:.1}s (last reading {last})"
    )]
    ConvergenceTimeout {
        quantity: Unit,
        target: f64,
        last: f64,
        waited_secs: f64,
    },

    /// Interlock refused a transition
    #[error("Unsafe transition: {0}")]
    UnsafeTransition(String),

    /// Instrument reported a system fault while a sequence was running
    #[error("Instrument fault: {0}")]
    InstrumentFault(SystemFault),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IpsError {
    /// Whether this error came from the transport and may be cured by reopening the channel
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            IpsError::Channel(_) | IpsError::Timeout(_) | IpsError::Io(_)
        )
    }
}

/// Result type alias for IPS operations
pub type Result<T> = std::result::Result<T, IpsError>;

impl From<serde_json::Error> for IpsError {
    fn from(err: serde_json::Error) -> Self {
        IpsError::Serialization(err.to_string())
    }
}
