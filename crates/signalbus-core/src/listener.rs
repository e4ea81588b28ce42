//! Signal listener interfaces
//!
//! Struct-based alternatives to closures. Wrap a listener with
//! [`SignalHandler::from_listener`](crate::SignalHandler::from_listener) or
//! [`SignalHandler::from_async_listener`](crate::SignalHandler::from_async_listener);
//! the resulting handler's identity is the listener's `Arc`, so wrapping the
//! same `Arc` again yields a handler that deregisters the same subscription.

use crate::error::HandlerResult;
use crate::signal::Signal;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Listener invoked by synchronous sends of `T`
pub trait SignalListener<T: Signal>: Send + Sync {
    /// Called for every synchronous send of `T`
    fn on_signal(&self, signal: &T) -> HandlerResult;
}

/// Listener invoked by asynchronous sends of `T`
///
/// Implementations should watch `cancel` during long-running awaits and
/// return [`Cancelled`](crate::Cancelled) when it fires.
#[async_trait]
pub trait AsyncSignalListener<T: Signal>: Send + Sync {
    /// Called for every asynchronous send of `T`
    async fn on_signal(&self, signal: Arc<T>, cancel: CancellationToken) -> HandlerResult;
}
