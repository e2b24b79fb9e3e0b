//! Error types.

use telltale_types::{ParseIntervalError, TimestampError};
use thiserror::Error;

/// Errors returned synchronously to callers.
///
/// Transport faults are not in here: they never reach the caller, see
/// [`DeliveryError`].
#[derive(Debug, Error)]
pub enum Error {
    /// A timestamp could not be normalized.
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    /// A plugin registration named an unsupported interval.
    #[error(transparent)]
    PluginInterval(#[from] ParseIntervalError),

    /// `every` was called with a bucket name the scheduler does not have.
    #[error("Interval must be one of these: {expected}, you gave {given:?}")]
    UnknownInterval {
        /// The rejected name.
        given: String,
        /// The accepted names, comma separated.
        expected: String,
    },

    /// The scheduler was disabled and cannot be started.
    #[error("the background scheduler was disabled and cannot be started")]
    SchedulerDisabled,

    /// The scheduler is not running, so there is no bucket to register into.
    #[error("the background scheduler is not running")]
    SchedulerStopped,

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime is available to run the background scheduler")]
    NoRuntime,

    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether this error rejects caller input, as opposed to scheduler
    /// or configuration state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Timestamp(_) | Error::PluginInterval(_) | Error::UnknownInterval { .. }
        )
    }
}

/// Convenience alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a [`Sink`](crate::Sink).
///
/// The client catches these and turns them into a best-effort log message;
/// they are never returned from an emission call.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The encoded message is larger than one datagram may be.
    #[error("message of {size} bytes exceeds the {limit} byte datagram limit")]
    Oversized {
        /// Encoded size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The socket failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// A custom sink refused the message.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Build a [`DeliveryError::Rejected`] from anything displayable.
    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        DeliveryError::Rejected(reason.to_string())
    }
}

/// Failure of one scheduled callback.
///
/// Logged by the scheduler and then discarded; it never stops the worker.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("scheduled callback failed: {0:#}")]
    Failed(anyhow::Error),

    /// The callback panicked.
    #[error("scheduled callback panicked: {0}")]
    Panicked(String),
}
