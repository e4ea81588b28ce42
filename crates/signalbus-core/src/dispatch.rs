//! Dispatch engine.
//!
//! Invokes a snapshot of subscriptions against one payload. The
//! [`DispatchGuard`] owns the snapshot for the duration of a dispatch and
//! ends the type's dispatching state when it goes away, whether the
//! dispatch finished, a handler panicked, or the async send was dropped.

use crate::error::{Result, SignalBusError};
use crate::registry::{Registry, SubscriptionRef};
use crate::signal::SignalKey;
use crate::subscription::SharedPayload;
use crate::HandlerResult;
use futures::future::{poll_fn, BoxFuture};
use parking_lot::Mutex;
use std::any::Any;
use std::task::Poll;
use tokio_util::sync::CancellationToken;

/// Slot of a concurrently running handler; `None` once it completed.
pub(crate) type InFlight = Option<BoxFuture<'static, HandlerResult>>;

/// Holds the dispatching state of one signal type.
pub(crate) struct DispatchGuard<'a> {
    registry: &'a Mutex<Registry>,
    key: SignalKey,
    snapshot: Option<Vec<SubscriptionRef>>,
}

impl<'a> DispatchGuard<'a> {
    pub(crate) fn new(
        registry: &'a Mutex<Registry>,
        key: SignalKey,
        snapshot: Vec<SubscriptionRef>,
    ) -> Self {
        Self {
            registry,
            key,
            snapshot: Some(snapshot),
        }
    }

    pub(crate) fn key(&self) -> SignalKey {
        self.key
    }

    pub(crate) fn snapshot(&self) -> &[SubscriptionRef] {
        self.snapshot.as_deref().unwrap_or_default()
    }

    /// End the dispatch and merge staged changes.
    pub(crate) fn finish(mut self) -> Result<()> {
        match self.snapshot.take() {
            Some(snapshot) => self
                .registry
                .lock()
                .end_dispatch(self.key.id(), snapshot)
                .map_err(|source| SignalBusError::CycleDetected {
                    signal: self.key.name(),
                    source,
                }),
            None => Ok(()),
        }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(cycle) = self.registry.lock().end_dispatch(self.key.id(), snapshot) {
                tracing::warn!(
                    target: "signalbus",
                    "Interrupted dispatch of {} left unresolved ordering: {}",
                    self.key,
                    cycle
                );
            }
        }
    }
}

/// Run every synchronous subscription in order, stopping at the first
/// failure.
pub(crate) fn invoke_sync(
    key: SignalKey,
    snapshot: &[SubscriptionRef],
    payload: &dyn Any,
) -> Result<()> {
    for subscription in snapshot {
        subscription
            .handler
            .call(payload)
            .map_err(|err| SignalBusError::from_handler(key.name(), err))?;
    }
    Ok(())
}

/// Await each subscription in order. Cancellation is checked before each
/// handler starts; the first failure ends the dispatch.
pub(crate) async fn invoke_sequential(
    key: SignalKey,
    snapshot: &[SubscriptionRef],
    payload: &SharedPayload,
    cancel: &CancellationToken,
) -> Result<()> {
    for subscription in snapshot {
        if cancel.is_cancelled() {
            return Err(SignalBusError::Cancelled { signal: key.name() });
        }
        subscription
            .handler
            .start(payload, cancel)
            .await
            .map_err(|err| SignalBusError::from_handler(key.name(), err))?;
    }
    Ok(())
}

/// Start every subscription, then drive them all to completion.
///
/// A failing handler does not cancel its siblings; the first failure in
/// completion order is reported once all have finished. `in_flight` must be
/// empty and is left holding only `None` slots.
pub(crate) async fn invoke_concurrent(
    key: SignalKey,
    snapshot: &[SubscriptionRef],
    payload: &SharedPayload,
    cancel: &CancellationToken,
    in_flight: &mut Vec<InFlight>,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SignalBusError::Cancelled { signal: key.name() });
    }

    in_flight.extend(
        snapshot
            .iter()
            .map(|subscription| Some(subscription.handler.start(payload, cancel))),
    );

    let mut first_error = None;
    poll_fn(|cx| {
        let mut pending = false;
        for slot in in_flight.iter_mut() {
            let Some(task) = slot.as_mut() else {
                continue;
            };
            match task.as_mut().poll(cx) {
                Poll::Ready(outcome) => {
                    *slot = None;
                    if let Err(err) = outcome {
                        first_error.get_or_insert(err);
                    }
                }
                Poll::Pending => pending = true,
            }
        }
        if pending {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    })
    .await;

    match first_error {
        Some(err) => Err(SignalBusError::from_handler(key.name(), err)),
        None => Ok(()),
    }
}
