//! # Signalbus Core
//!
//! In-process, type-keyed publish/subscribe signal bus.
//! Provides the subscription registry, the ordering engine for
//! before/after constraints, synchronous and asynchronous dispatch with
//! cancellation, and reusable buffer pools for allocation-free sends.

pub mod bus;
pub mod config;
mod dispatch;
pub mod error;
pub mod listener;
pub mod ordering;
pub mod pool;
pub mod registry;
pub mod signal;
pub mod subscription;

pub use bus::{init_signal_bus, signal_bus, PooledSignal, SignalBus, SignalBusBuilder};

pub use config::{
    LogSink, NoticeLevel, RecursionPolicy, SendMode, SignalBusConfig, SortPolicy, TokenGenerator,
    TracingSink, UuidTokenGenerator,
};

pub use error::{BoxError, Cancelled, CycleError, HandlerResult, Result, SignalBusError};

pub use listener::{AsyncSignalListener, SignalListener};

pub use pool::{Pool, Reusable};

pub use signal::{Signal, SignalKey};

pub use subscription::{
    HandlerId, HandlerOutput, OrderKey, OrderOptions, RegisterOptions, SignalHandler,
    Subscription, Token,
};

// Re-export the cancellation token so callers need not depend on tokio-util
pub use tokio_util::sync::CancellationToken;
