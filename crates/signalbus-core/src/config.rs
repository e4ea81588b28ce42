//! Bus configuration and injected collaborators.
//!
//! [`SignalBusConfig`] holds the serialisable policy knobs. The two
//! collaborators the bus does not own, the notice sink and the token
//! strategy, are traits injected through
//! [`SignalBusBuilder`](crate::bus::SignalBusBuilder).

use crate::error::{Result, SignalBusError};
use crate::subscription::Token;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// What a send does when its signal type is already dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecursionPolicy {
    /// Return [`SignalBusError::ReentrantSend`].
    #[default]
    Error,
    /// Report a notice through the log sink and skip the send.
    Ignore,
}

/// When ordering constraints are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortPolicy {
    /// Re-sort on every registration carrying constraints. Cycles are
    /// reported by `register` and the registration is rolled back.
    #[default]
    Eager,
    /// Flag the type and sort just before its next dispatch. Cycles are
    /// reported by the send.
    Lazy,
}

/// How an asynchronous send drives its handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Await each handler before starting the next.
    #[default]
    Sequential,
    /// Start every handler, then await them all.
    Concurrent,
}

/// Severity for log-sink notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Trace level
    Trace,
    /// Debug level
    #[default]
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
}

impl From<NoticeLevel> for Level {
    fn from(level: NoticeLevel) -> Self {
        match level {
            NoticeLevel::Trace => Level::TRACE,
            NoticeLevel::Debug => Level::DEBUG,
            NoticeLevel::Info => Level::INFO,
            NoticeLevel::Warn => Level::WARN,
        }
    }
}

/// Configuration for the signal bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalBusConfig {
    /// Behaviour of a send whose type is already dispatching.
    pub recursion_policy: RecursionPolicy,
    /// When before/after constraints are resolved.
    pub sort_policy: SortPolicy,
    /// Mode used by the `send_async` shorthands that take no mode.
    pub default_send_mode: SendMode,
    /// Capacity reserved for freshly allocated snapshot buffers.
    pub snapshot_capacity: usize,
    /// Severity of "not found" notices.
    pub not_found_level: NoticeLevel,
}

impl Default for SignalBusConfig {
    fn default() -> Self {
        Self {
            recursion_policy: RecursionPolicy::Error,
            sort_policy: SortPolicy::Eager,
            default_send_mode: SendMode::Sequential,
            snapshot_capacity: 8,
            not_found_level: NoticeLevel::Debug,
        }
    }
}

impl SignalBusConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_capacity == 0 {
            return Err(SignalBusError::Config {
                reason: "snapshot_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Destination for bus notices (unknown types, unknown handlers or tokens,
/// ignored recursive sends).
pub trait LogSink: Send + Sync {
    /// Record a notice
    fn log(&self, level: Level, message: &str);
}

/// Default sink forwarding notices to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "signalbus", "{}", message),
            Level::WARN => tracing::warn!(target: "signalbus", "{}", message),
            Level::INFO => tracing::info!(target: "signalbus", "{}", message),
            Level::DEBUG => tracing::debug!(target: "signalbus", "{}", message),
            _ => tracing::trace!(target: "signalbus", "{}", message),
        }
    }
}

/// Strategy producing tokens for registrations that do not supply one.
pub trait TokenGenerator: Send + Sync {
    /// Produce a token distinct from every token produced before
    fn generate(&self) -> Token;
}

/// Default strategy: random UUID v4 tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn generate(&self) -> Token {
        Token::Uuid(uuid::Uuid::new_v4())
    }
}
