//! Error handling for the signal bus
//!
//! Provides the error types surfaced by bus operations:
//! - Ordering errors (cyclic before/after constraints)
//! - Dispatch errors (recursive sends, handler failures, cancellation)
//! - Hierarchy and configuration errors
//!
//! "Not found" conditions (unknown signal type, unknown handler or token) are
//! deliberately absent: they are reported through the [`LogSink`] and never
//! returned as errors.
//!
//! [`LogSink`]: crate::config::LogSink

use thiserror::Error;

/// Boxed error type returned by failing handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a single handler invocation.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Marker error a handler returns when it stops because its
/// cancellation token fired.
///
/// The bus maps it to [`SignalBusError::Cancelled`] instead of
/// [`SignalBusError::Handler`].
#[derive(Error, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Ordering constraints that cannot be resolved into a total order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cyclic ordering constraints, unresolved keys: {}", .unresolved.join(", "))]
pub struct CycleError {
    /// Order keys of the subscriptions left on the cycle (or behind it).
    pub unresolved: Vec<String>,
}

/// Signal bus error type
#[derive(Error, Debug)]
pub enum SignalBusError {
    /// Before/after constraints of a signal type contain a cycle
    #[error("Cannot order subscriptions of {signal}: {source}")]
    CycleDetected {
        /// The signal type whose subscriptions could not be ordered.
        signal: &'static str,
        /// The unresolved constraint set.
        #[source]
        source: CycleError,
    },

    /// A send for a type that is already dispatching
    #[error("Recursive send detected for signal type {signal}")]
    ReentrantSend {
        /// The signal type that is already being dispatched.
        signal: &'static str,
    },

    /// A handler returned an error
    #[error("Handler for {signal} failed: {source}")]
    Handler {
        /// The signal type being dispatched.
        signal: &'static str,
        /// The error returned by the handler.
        #[source]
        source: BoxError,
    },

    /// The dispatch observed its cancellation token
    #[error("Dispatch of {signal} was cancelled")]
    Cancelled {
        /// The signal type being dispatched.
        signal: &'static str,
    },

    /// A bus was added as a child of one of its own descendants
    #[error("Bus hierarchy cycle: a bus cannot become its own descendant")]
    HierarchyCycle,

    /// Invalid configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// The reason the configuration was rejected.
        reason: String,
    },
}

impl SignalBusError {
    /// Map a failed handler result into the bus error for `signal`.
    pub(crate) fn from_handler(signal: &'static str, error: BoxError) -> Self {
        if error.is::<Cancelled>() {
            Self::Cancelled { signal }
        } else {
            Self::Handler {
                signal,
                source: error,
            }
        }
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error came from a handler
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }
}

impl From<serde_json::Error> for SignalBusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SignalBusError {
    fn from(err: std::io::Error) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for signal bus operations
pub type Result<T> = std::result::Result<T, SignalBusError>;
