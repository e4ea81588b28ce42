//! # Signalbus
//!
//! An in-process, type-keyed publish/subscribe bus:
//! - Handlers subscribe per signal type and run in registration order,
//!   refined by before/after ordering constraints
//! - Synchronous and asynchronous (sequential or concurrent) dispatch with
//!   cooperative cancellation
//! - Handlers may subscribe, unsubscribe and send while a dispatch runs
//! - Pooled snapshot buffers keep steady-state sends allocation free
//!
//! ## Architecture
//!
//! 1. **signalbus-core** - Registry, ordering, dispatch, pools, bus facade
//! 2. **signalbus** - Re-exports plus logging setup and a demo binary

pub use signalbus_core::{bus, config, error, listener, ordering, pool, signal, subscription};

pub use signalbus_core::{
    emit, init_signal_bus, on_signal, signal_bus, AsyncSignalListener, BoxError, Cancelled,
    CancellationToken, CycleError, HandlerId, HandlerOutput, HandlerResult, LogSink, NoticeLevel,
    OrderKey, OrderOptions, Pool, PooledSignal, RecursionPolicy, RegisterOptions, Result,
    Reusable, SendMode, Signal, SignalBus, SignalBusBuilder, SignalBusConfig, SignalBusError,
    SignalHandler, SignalKey, SignalListener, SortPolicy, Subscription, Token, TokenGenerator,
    TracingSink, UuidTokenGenerator,
};

/// Initialize logging for the application
///
/// Honors `RUST_LOG`; defaults to `info`.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
