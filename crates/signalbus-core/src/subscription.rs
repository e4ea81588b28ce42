//! Subscriptions and the handler shapes they carry.
//!
//! A [`SignalHandler<T>`] is the caller-facing, typed handle. Registration
//! turns it into a type-erased [`Subscription`] stored by the registry. The
//! four supported callable shapes are kept as a tagged [`Handler`] variant
//! and matched exhaustively at invocation time.

use crate::error::{BoxError, HandlerResult};
use crate::listener::{AsyncSignalListener, SignalListener};
use crate::signal::{short_type_name, Signal};
use futures::future::{self, BoxFuture, FutureExt};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque registration handle used for token-based deregistration.
///
/// Generated tokens are unique per registration. Supplying the same token to
/// several registrations groups them, so one `deregister_token` call removes
/// all of them across every signal type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Random token from the default generator.
    Uuid(Uuid),
    /// Caller-chosen numeric token.
    Id(u64),
    /// Caller-chosen named token.
    Name(Cow<'static, str>),
}

impl Token {
    /// Create a named token
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Name(name.into())
    }
}

impl From<u64> for Token {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<Uuid> for Token {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Uuid(id) => write!(f, "Token({})", &id.to_string()[..8]),
            Token::Id(id) => write!(f, "Token(#{})", id),
            Token::Name(name) => write!(f, "Token({})", name),
        }
    }
}

/// Identity of a handler, used for handler-based deregistration.
///
/// Derived from the address of the handler's shared callable, which the
/// subscription keeps alive, plus whether the handler is asynchronous. A
/// listener wrapped for both shapes therefore yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId {
    address: usize,
    asynchronous: bool,
}

impl HandlerId {
    fn of<P: ?Sized>(shared: &Arc<P>, asynchronous: bool) -> Self {
        Self {
            address: Arc::as_ptr(shared) as *const () as usize,
            asynchronous,
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asynchronous {
            write!(f, "AsyncHandler({:#x})", self.address)
        } else {
            write!(f, "Handler({:#x})", self.address)
        }
    }
}

/// Owner identity used to express ordering constraints.
#[derive(Debug, Clone)]
pub enum OrderKey {
    /// A Rust type used as the owner marker.
    Type {
        /// Type id of the owner marker.
        id: TypeId,
        /// Type name, for diagnostics.
        name: &'static str,
    },
    /// A free-form owner name.
    Name(Cow<'static, str>),
}

impl OrderKey {
    /// Key for the owner type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a named owner
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Name(name.into())
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OrderKey::Type { id: a, .. }, OrderKey::Type { id: b, .. }) => a == b,
            (OrderKey::Name(a), OrderKey::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for OrderKey {}

impl Hash for OrderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            OrderKey::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            OrderKey::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl From<&'static str> for OrderKey {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for OrderKey {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Type { name, .. } => f.write_str(short_type_name(name)),
            OrderKey::Name(name) => f.write_str(name),
        }
    }
}

/// Ordering constraints of one subscription.
///
/// `before` lists owners this subscription must run ahead of; `after` lists
/// owners that must have run first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOptions {
    /// The owner this subscription is ordered as.
    pub key: OrderKey,
    /// Owners that must run after this subscription.
    pub before: Vec<OrderKey>,
    /// Owners that must run before this subscription.
    pub after: Vec<OrderKey>,
}

impl OrderOptions {
    /// Ordering options for `key` with no constraints yet
    pub fn new(key: impl Into<OrderKey>) -> Self {
        Self {
            key: key.into(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Ordering options keyed by the owner type `T`
    pub fn owned_by<T: ?Sized + 'static>() -> Self {
        Self::new(OrderKey::of::<T>())
    }

    /// Run ahead of `key`
    pub fn before(mut self, key: impl Into<OrderKey>) -> Self {
        self.before.push(key.into());
        self
    }

    /// Run after `key`
    pub fn after(mut self, key: impl Into<OrderKey>) -> Self {
        self.after.push(key.into());
        self
    }
}

/// Optional settings for a registration.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Caller-supplied token; a fresh one is generated when absent.
    pub token: Option<Token>,
    /// Ordering constraints.
    pub order: Option<OrderOptions>,
}

impl RegisterOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under a caller-supplied token
    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach ordering constraints
    pub fn order(mut self, order: OrderOptions) -> Self {
        self.order = Some(order);
        self
    }
}

/// Values a handler may return: `()` or `Result<(), E>`.
pub trait HandlerOutput {
    /// Convert into the uniform handler result
    fn into_result(self) -> HandlerResult;
}

impl HandlerOutput for () {
    fn into_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E: Into<BoxError>> HandlerOutput for Result<(), E> {
    fn into_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

/// Type-erased payload for asynchronous handlers.
pub(crate) type SharedPayload = Arc<dyn Any + Send + Sync>;

type UnitFn = dyn Fn() -> HandlerResult + Send + Sync;
type PayloadFn = dyn Fn(&dyn Any) -> HandlerResult + Send + Sync;
type AsyncUnitFn = dyn Fn(CancellationToken) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type AsyncPayloadFn =
    dyn Fn(SharedPayload, CancellationToken) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// The four callable shapes a subscription can bind.
#[derive(Clone)]
pub(crate) enum Handler {
    /// `fn()`
    Unit(Arc<UnitFn>),
    /// `fn(payload)`
    Payload(Arc<PayloadFn>),
    /// `async fn(cancel)`
    AsyncUnit(Arc<AsyncUnitFn>),
    /// `async fn(payload, cancel)`
    AsyncPayload(Arc<AsyncPayloadFn>),
}

impl Handler {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Handler::AsyncUnit(_) | Handler::AsyncPayload(_))
    }

    fn id(&self) -> HandlerId {
        match self {
            Handler::Unit(f) => HandlerId::of(f, false),
            Handler::Payload(f) => HandlerId::of(f, false),
            Handler::AsyncUnit(f) => HandlerId::of(f, true),
            Handler::AsyncPayload(f) => HandlerId::of(f, true),
        }
    }

    /// Run a synchronous shape. Asynchronous shapes are not reachable from
    /// synchronous dispatch and report success.
    pub(crate) fn call(&self, payload: &dyn Any) -> HandlerResult {
        match self {
            Handler::Unit(f) => f(),
            Handler::Payload(f) => f(payload),
            Handler::AsyncUnit(_) | Handler::AsyncPayload(_) => Ok(()),
        }
    }

    /// Start an asynchronous shape. Synchronous shapes run inline and yield
    /// an already completed future.
    pub(crate) fn start(
        &self,
        payload: &SharedPayload,
        cancel: &CancellationToken,
    ) -> BoxFuture<'static, HandlerResult> {
        match self {
            Handler::AsyncUnit(f) => f(cancel.clone()),
            Handler::AsyncPayload(f) => f(Arc::clone(payload), cancel.clone()),
            Handler::Unit(_) | Handler::Payload(_) => {
                future::ready(self.call(payload.as_ref())).boxed()
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Handler::Unit(_) => "Unit",
            Handler::Payload(_) => "Payload",
            Handler::AsyncUnit(_) => "AsyncUnit",
            Handler::AsyncPayload(_) => "AsyncPayload",
        };
        f.write_str(shape)
    }
}

/// Typed, clonable handler for signal type `T`.
///
/// Clones share identity, so a clone can be passed to
/// [`SignalBus::deregister`](crate::SignalBus::deregister) to remove the
/// subscription created from the original.
pub struct SignalHandler<T> {
    handler: Handler,
    id: HandlerId,
    _signal: PhantomData<fn(&T)>,
}

impl<T> Clone for SignalHandler<T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            id: self.id,
            _signal: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SignalHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHandler")
            .field("shape", &self.handler)
            .field("id", &self.id)
            .finish()
    }
}

impl<T: Signal> SignalHandler<T> {
    fn from_handler(handler: Handler) -> Self {
        let id = handler.id();
        Self {
            handler,
            id,
            _signal: PhantomData,
        }
    }

    /// Synchronous handler receiving the payload
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Self::from_handler(Handler::Payload(Arc::new(move |payload: &dyn Any| {
            match payload.downcast_ref::<T>() {
                Some(signal) => f(signal).into_result(),
                None => Ok(()),
            }
        })))
    }

    /// Synchronous handler ignoring the payload
    pub fn unit<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Self::from_handler(Handler::Unit(Arc::new(move || f().into_result())))
    }

    /// Asynchronous handler receiving the payload and a cancellation token
    pub fn future<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Arc<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerOutput + 'static,
    {
        Self::from_handler(Handler::AsyncPayload(Arc::new(
            move |payload: SharedPayload, cancel: CancellationToken| match payload.downcast::<T>()
            {
                Ok(signal) => f(signal, cancel).map(HandlerOutput::into_result).boxed(),
                Err(_) => future::ready(Ok(())).boxed(),
            },
        )))
    }

    /// Asynchronous handler ignoring the payload
    pub fn future_unit<F, Fut, R>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: HandlerOutput + 'static,
    {
        Self::from_handler(Handler::AsyncUnit(Arc::new(move |cancel| {
            f(cancel).map(HandlerOutput::into_result).boxed()
        })))
    }

    /// Wrap a synchronous listener. The handler's identity is the identity
    /// of `listener`.
    pub fn from_listener<L>(listener: Arc<L>) -> Self
    where
        L: SignalListener<T> + 'static,
    {
        let id = HandlerId::of(&listener, false);
        let handler = Handler::Payload(Arc::new(move |payload: &dyn Any| {
            match payload.downcast_ref::<T>() {
                Some(signal) => listener.on_signal(signal),
                None => Ok(()),
            }
        }));
        Self {
            handler,
            id,
            _signal: PhantomData,
        }
    }

    /// Wrap an asynchronous listener. The handler's identity is the identity
    /// of `listener`.
    pub fn from_async_listener<L>(listener: Arc<L>) -> Self
    where
        L: AsyncSignalListener<T> + 'static,
    {
        let id = HandlerId::of(&listener, true);
        let handler = Handler::AsyncPayload(Arc::new(
            move |payload: SharedPayload, cancel: CancellationToken| match payload.downcast::<T>()
            {
                Ok(signal) => {
                    let listener = Arc::clone(&listener);
                    async move { listener.on_signal(signal, cancel).await }.boxed()
                }
                Err(_) => future::ready(Ok(())).boxed(),
            },
        ));
        Self {
            handler,
            id,
            _signal: PhantomData,
        }
    }

    /// Identity used for handler-based deregistration
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Whether this handler is reached by asynchronous sends
    pub fn is_async(&self) -> bool {
        self.handler.is_async()
    }

    pub(crate) fn into_subscription(self, token: Token, order: Option<OrderOptions>) -> Subscription {
        Subscription {
            handler: self.handler,
            identity: self.id,
            token,
            order,
            sequence: 0,
        }
    }
}

/// One registered handler plus its metadata.
#[derive(Debug)]
pub struct Subscription {
    pub(crate) handler: Handler,
    pub(crate) identity: HandlerId,
    pub(crate) token: Token,
    pub(crate) order: Option<OrderOptions>,
    /// Registration sequence within the owning registry; ties in dependency
    /// ordering are broken by it.
    pub(crate) sequence: u64,
}

impl Subscription {
    /// Handler identity
    pub fn identity(&self) -> HandlerId {
        self.identity
    }

    /// Registration token
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Ordering constraints, if any
    pub fn order(&self) -> Option<&OrderOptions> {
        self.order.as_ref()
    }

    /// Whether asynchronous sends reach this subscription
    pub fn is_async(&self) -> bool {
        self.handler.is_async()
    }
}
