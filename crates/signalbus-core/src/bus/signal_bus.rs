//! Signal bus implementation.
//!
//! Provides the SignalBus facade, its builder, and the global instance.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use super::hierarchy::Hierarchy;
use crate::config::{
    LogSink, RecursionPolicy, SendMode, SignalBusConfig, TokenGenerator, TracingSink,
    UuidTokenGenerator,
};
use crate::dispatch::{self, DispatchGuard, InFlight};
use crate::error::{Result, SignalBusError};
use crate::pool::Pool;
use crate::registry::{DispatchStart, Registry};
use crate::signal::{payload_type_id, Signal, SignalKey};
use crate::subscription::{RegisterOptions, SharedPayload, SignalHandler, Token};

pub(super) struct BusInner {
    pub(super) registry: Mutex<Registry>,
    in_flight: Mutex<Pool<Vec<InFlight>>>,
    /// Payload pools keyed by payload type, each a `Pool<T>`.
    pub(super) payloads: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
    pub(super) hierarchy: Mutex<Hierarchy>,
    config: SignalBusConfig,
    log: Arc<dyn LogSink>,
    tokens: Arc<dyn TokenGenerator>,
}

/// In-process, type-keyed publish/subscribe bus.
///
/// Cloning is cheap and yields a handle to the same bus. All methods take
/// `&self`; handlers may call back into the bus (register, deregister,
/// send other types) while a dispatch is running.
#[derive(Clone)]
pub struct SignalBus {
    pub(super) inner: Arc<BusInner>,
}

impl SignalBus {
    /// Create a new signal bus with default configuration
    pub fn new() -> Self {
        Self::with_config(SignalBusConfig::default())
    }

    /// Create a new signal bus with custom configuration
    ///
    /// The configuration is not validated; use [`SignalBus::builder`] for
    /// that.
    pub fn with_config(config: SignalBusConfig) -> Self {
        Self::assemble(config, Arc::new(TracingSink), Arc::new(UuidTokenGenerator))
    }

    /// Start building a bus with injected collaborators
    pub fn builder() -> SignalBusBuilder {
        SignalBusBuilder::new()
    }

    fn assemble(
        config: SignalBusConfig,
        log: Arc<dyn LogSink>,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::new(config.sort_policy, config.snapshot_capacity)),
                in_flight: Mutex::new(Pool::new()),
                payloads: Mutex::new(HashMap::new()),
                hierarchy: Mutex::new(Hierarchy::default()),
                config,
                log,
                tokens,
            }),
        }
    }

    /// Subscribe `handler` to signals of type `T`
    ///
    /// Returns the generated token, usable with
    /// [`deregister_token`](Self::deregister_token).
    pub fn register<T: Signal>(&self, handler: SignalHandler<T>) -> Result<Token> {
        self.register_with(handler, RegisterOptions::default())
    }

    /// Subscribe `handler` with a caller token and/or ordering constraints
    ///
    /// Under the eager sort policy, constraints that close a cycle are
    /// rejected with [`SignalBusError::CycleDetected`] and the registration
    /// does not take effect.
    pub fn register_with<T: Signal>(
        &self,
        handler: SignalHandler<T>,
        options: RegisterOptions,
    ) -> Result<Token> {
        let key = SignalKey::of::<T>();
        let RegisterOptions { token, order } = options;
        let token = token.unwrap_or_else(|| self.inner.tokens.generate());

        let subscription = handler.into_subscription(token.clone(), order);
        self.inner
            .registry
            .lock()
            .register(key, subscription)
            .map_err(|source| SignalBusError::CycleDetected {
                signal: key.name(),
                source,
            })?;

        tracing::debug!("Subscription {} added for {}", token, key);
        Ok(token)
    }

    /// Remove the first subscription of `T` made with `handler` (or a clone
    /// of it)
    ///
    /// Returns true if a subscription was found and removed.
    pub fn deregister<T: Signal>(&self, handler: &SignalHandler<T>) -> bool {
        let key = SignalKey::of::<T>();
        let removed = self
            .inner
            .registry
            .lock()
            .deregister_identity(key.id(), handler.id());
        if removed {
            tracing::debug!("{} removed from {}", handler.id(), key);
        } else {
            self.notice(format_args!("{} is not subscribed to {}", handler.id(), key));
        }
        removed
    }

    /// Remove every subscription registered under `token`, across all
    /// signal types
    ///
    /// Returns the number of subscriptions removed.
    pub fn deregister_token(&self, token: &Token) -> usize {
        let removed = self.inner.registry.lock().deregister_token(token);
        if removed == 0 {
            self.notice(format_args!("No subscriptions registered under {}", token));
        } else {
            tracing::debug!("{} subscription(s) removed for {}", removed, token);
        }
        removed
    }

    /// Drop every subscription of every signal type
    pub fn clear_subscriptions(&self) {
        self.inner.registry.lock().clear();
        tracing::debug!("All subscriptions cleared");
    }

    /// Deliver `signal` to the synchronous subscribers of `T`, in order
    ///
    /// Stops at the first failing handler. Sending a type that has no
    /// subscribers is not an error.
    pub fn send<T: Signal>(&self, signal: &T) -> Result<()> {
        self.dispatch_sync(SignalKey::of::<T>(), signal)
    }

    /// Send a default-constructed `T`
    pub fn send_default<T: Signal + Default>(&self) -> Result<()> {
        self.send(&T::default())
    }

    /// Send a payload whose type is only known at runtime
    ///
    /// Routed by the payload's concrete type, exactly as if it had been
    /// sent with [`send`](Self::send).
    pub fn send_dyn(&self, signal: &dyn Any) -> Result<()> {
        self.dispatch_sync(SignalKey::dynamic(payload_type_id(signal)), signal)
    }

    /// Deliver `signal` to the asynchronous subscribers of `T` using the
    /// configured default send mode
    pub async fn send_async<T: Signal>(&self, signal: T, cancel: &CancellationToken) -> Result<()> {
        self.send_async_with(signal, cancel, self.inner.config.default_send_mode)
            .await
    }

    /// Deliver `signal` to the asynchronous subscribers of `T`
    ///
    /// Sequential mode awaits each handler in order and checks `cancel`
    /// before starting each one. Concurrent mode starts all handlers and
    /// waits for all of them; the first failure is reported after every
    /// handler has finished.
    pub async fn send_async_with<T: Signal>(
        &self,
        signal: T,
        cancel: &CancellationToken,
        mode: SendMode,
    ) -> Result<()> {
        let payload: SharedPayload = Arc::new(signal);
        self.dispatch_async(SignalKey::of::<T>(), payload, cancel, mode)
            .await
    }

    /// Asynchronously send a default-constructed `T`
    pub async fn send_default_async<T: Signal + Default>(
        &self,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.send_async(T::default(), cancel).await
    }

    /// Asynchronously send a payload whose type is only known at runtime
    pub async fn send_dyn_async(
        &self,
        signal: Arc<dyn Any + Send + Sync>,
        cancel: &CancellationToken,
        mode: SendMode,
    ) -> Result<()> {
        let key = SignalKey::dynamic(payload_type_id(signal.as_ref()));
        self.dispatch_async(key, signal, cancel, mode).await
    }

    fn dispatch_sync(&self, key: SignalKey, payload: &dyn Any) -> Result<()> {
        let Some(guard) = self.begin(key, false)? else {
            return Ok(());
        };
        tracing::trace!("Dispatching {} to {} subscriber(s)", guard.key(), guard.snapshot().len());

        let outcome = dispatch::invoke_sync(guard.key(), guard.snapshot(), payload);
        let merged = guard.finish();
        outcome.and(merged)
    }

    async fn dispatch_async(
        &self,
        key: SignalKey,
        payload: SharedPayload,
        cancel: &CancellationToken,
        mode: SendMode,
    ) -> Result<()> {
        let Some(guard) = self.begin(key, true)? else {
            return Ok(());
        };
        tracing::trace!(
            "Dispatching {} to {} async subscriber(s), {:?}",
            guard.key(),
            guard.snapshot().len(),
            mode
        );

        let outcome = match mode {
            SendMode::Sequential => {
                dispatch::invoke_sequential(guard.key(), guard.snapshot(), &payload, cancel).await
            }
            SendMode::Concurrent => {
                let mut in_flight = self.inner.in_flight.lock().rent_buffer(guard.snapshot().len());
                let outcome = dispatch::invoke_concurrent(
                    guard.key(),
                    guard.snapshot(),
                    &payload,
                    cancel,
                    &mut in_flight,
                )
                .await;
                self.inner.in_flight.lock().release(in_flight);
                outcome
            }
        };
        let merged = guard.finish();
        outcome.and(merged)
    }

    /// Enter the dispatching state of `key`, or report why there is
    /// nothing to dispatch.
    fn begin(&self, key: SignalKey, asynchronous: bool) -> Result<Option<DispatchGuard<'_>>> {
        let start = self
            .inner
            .registry
            .lock()
            .begin_dispatch(key, asynchronous);

        match start {
            DispatchStart::Ready(key, snapshot) => {
                Ok(Some(DispatchGuard::new(&self.inner.registry, key, snapshot)))
            }
            DispatchStart::Empty(key) => {
                self.notice(format_args!("No subscriptions for signal type {}", key));
                Ok(None)
            }
            DispatchStart::Busy(key) => match self.inner.config.recursion_policy {
                RecursionPolicy::Error => Err(SignalBusError::ReentrantSend { signal: key.name() }),
                RecursionPolicy::Ignore => {
                    self.inner.log.log(
                        Level::WARN,
                        &format!("Ignoring recursive send of {}", key),
                    );
                    Ok(None)
                }
            },
            DispatchStart::Unsortable(key, source) => Err(SignalBusError::CycleDetected {
                signal: key.name(),
                source,
            }),
        }
    }

    fn notice(&self, message: fmt::Arguments<'_>) {
        let level = self.inner.config.not_found_level.into();
        self.inner.log.log(level, &message.to_string());
    }

    /// Get the number of subscriptions for `T`
    pub fn subscriber_count<T: Signal>(&self) -> usize {
        self.inner
            .registry
            .lock()
            .subscriber_count(TypeId::of::<T>())
    }

    /// Get the number of subscriptions across all signal types
    pub fn total_subscriptions(&self) -> usize {
        self.inner.registry.lock().total_subscriptions()
    }

    /// Keys of all signal types that have subscriptions
    pub fn signal_types(&self) -> Vec<SignalKey> {
        self.inner.registry.lock().signal_types()
    }

    /// Whether a dispatch of `T` is in flight
    pub fn is_dispatching<T: Signal>(&self) -> bool {
        self.inner.registry.lock().is_dispatching(TypeId::of::<T>())
    }

    /// Get the current configuration
    pub fn config(&self) -> &SignalBusConfig {
        &self.inner.config
    }

    /// Whether `self` and `other` are handles to the same bus
    pub fn ptr_eq(&self, other: &SignalBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscriptions", &self.total_subscriptions())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for a [`SignalBus`] with injected collaborators
#[derive(Default)]
pub struct SignalBusBuilder {
    config: SignalBusConfig,
    log_sink: Option<Arc<dyn LogSink>>,
    token_generator: Option<Arc<dyn TokenGenerator>>,
}

impl SignalBusBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for policies and pool sizing
    pub fn config(mut self, config: SignalBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Send notices to `sink` instead of `tracing`
    pub fn log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Generate registration tokens with `generator`
    pub fn token_generator(mut self, generator: impl TokenGenerator + 'static) -> Self {
        self.token_generator = Some(Arc::new(generator));
        self
    }

    /// Validate the configuration and build the bus
    pub fn build(self) -> Result<SignalBus> {
        self.config.validate()?;
        Ok(SignalBus::assemble(
            self.config,
            self.log_sink.unwrap_or_else(|| Arc::new(TracingSink)),
            self.token_generator
                .unwrap_or_else(|| Arc::new(UuidTokenGenerator)),
        ))
    }
}

impl fmt::Debug for SignalBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBusBuilder")
            .field("config", &self.config)
            .field("custom_log_sink", &self.log_sink.is_some())
            .field("custom_token_generator", &self.token_generator.is_some())
            .finish()
    }
}

/// Global signal bus instance
static SIGNAL_BUS: OnceLock<SignalBus> = OnceLock::new();

/// Get or initialize the global signal bus
///
/// This is the primary way to access the bus from code that does not own
/// one.
pub fn signal_bus() -> &'static SignalBus {
    SIGNAL_BUS.get_or_init(SignalBus::new)
}

/// Initialize the global signal bus with custom configuration
///
/// Must be called before any calls to `signal_bus()`. Returns the rejected
/// configuration if the bus has already been initialized.
pub fn init_signal_bus(config: SignalBusConfig) -> std::result::Result<(), SignalBusConfig> {
    SIGNAL_BUS
        .set(SignalBus::with_config(config))
        .map_err(|bus| bus.inner.config.clone())
}

/// Convenience macro to send a signal on the global signal bus
#[macro_export]
macro_rules! emit {
    ($signal:expr) => {
        $crate::bus::signal_bus().send(&$signal)
    };
}

/// Convenience macro to subscribe a payload handler on the global signal bus
#[macro_export]
macro_rules! on_signal {
    ($handler:expr) => {
        $crate::bus::signal_bus().register($crate::SignalHandler::new($handler))
    };
}
