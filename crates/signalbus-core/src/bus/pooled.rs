//! Pooled signal payloads.
//!
//! Frequently sent payload types that own allocations (buffers, strings)
//! can be rented from the bus, filled in, and sent; the payload goes back to
//! the bus's pool for its type once the send returns.

use std::any::TypeId;
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::signal_bus::SignalBus;
use crate::error::Result;
use crate::pool::{Pool, Reusable};
use crate::signal::Signal;

/// A payload rented from a [`SignalBus`].
///
/// Dereferences to the payload. Dropping it without sending returns it to
/// the pool as well.
pub struct PooledSignal<'a, T: Signal + Reusable> {
    bus: &'a SignalBus,
    value: Option<T>,
}

impl<'a, T: Signal + Reusable> PooledSignal<'a, T> {
    /// Send the payload synchronously, then return it to the pool
    pub fn send(mut self) -> Result<()> {
        match self.value.take() {
            Some(value) => {
                let outcome = self.bus.send(&value);
                self.bus.release_signal(value);
                outcome
            }
            None => Ok(()),
        }
    }

    /// Broadcast the payload through the bus hierarchy, then return it to
    /// the pool
    pub fn broadcast(mut self) -> Result<()> {
        match self.value.take() {
            Some(value) => {
                let outcome = self.bus.broadcast(&value);
                self.bus.release_signal(value);
                outcome
            }
            None => Ok(()),
        }
    }
}

impl<T: Signal + Reusable> Deref for PooledSignal<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.value.as_ref() {
            Some(value) => value,
            None => unreachable!("pooled signal is only emptied by consuming it"),
        }
    }
}

impl<T: Signal + Reusable> DerefMut for PooledSignal<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_mut() {
            Some(value) => value,
            None => unreachable!("pooled signal is only emptied by consuming it"),
        }
    }
}

impl<T: Signal + Reusable> Drop for PooledSignal<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.bus.release_signal(value);
        }
    }
}

impl<T: Signal + Reusable + fmt::Debug> fmt::Debug for PooledSignal<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledSignal").field(&self.value).finish()
    }
}

impl SignalBus {
    /// Rent a reset payload of type `T`, reusing a previously sent one when
    /// available
    pub fn rent_signal<T: Signal + Reusable + Default>(&self) -> PooledSignal<'_, T> {
        let mut payloads = self.inner.payloads.lock();
        let value = payloads
            .get_mut(&TypeId::of::<T>())
            .and_then(|pool| pool.downcast_mut::<Pool<T>>())
            .map_or_else(T::default, Pool::rent);
        PooledSignal {
            bus: self,
            value: Some(value),
        }
    }

    /// Number of pooled payloads of type `T` waiting to be rented
    pub fn pooled_signals<T: Signal + Reusable>(&self) -> usize {
        self.inner
            .payloads
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.downcast_ref::<Pool<T>>())
            .map_or(0, Pool::available)
    }

    fn release_signal<T: Signal + Reusable>(&self, value: T) {
        let mut payloads = self.inner.payloads.lock();
        let pool = payloads
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Pool::<T>::new()));
        if let Some(pool) = pool.downcast_mut::<Pool<T>>() {
            pool.release(value);
        }
    }
}
