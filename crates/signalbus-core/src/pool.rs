//! Object pooling.
//!
//! A single stack-based pool abstraction backs every reusable allocation on
//! the dispatch path: subscription snapshots, in-flight handler buffers for
//! concurrent dispatch, pending-change sets, and pooled signal payloads.
//!
//! The pool is unbounded. The number of live buffers tracks the depth of
//! in-flight dispatches, not the dispatch volume.

/// A value that can be returned to a [`Pool`] and handed out again.
///
/// `reset` must clear the logical contents while keeping any allocated
/// capacity around for the next user.
pub trait Reusable {
    /// Clear the contents in preparation for reuse.
    fn reset(&mut self);
}

impl<T> Reusable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Stack of previously released values.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self { free: Vec::new() }
    }
}

impl<T: Reusable> Pool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop a released value, or build a fresh one with `create`.
    pub fn rent_with(&mut self, create: impl FnOnce() -> T) -> T {
        self.free.pop().unwrap_or_else(create)
    }

    /// Reset `value` and push it back for reuse.
    pub fn release(&mut self, mut value: T) {
        value.reset();
        self.free.push(value);
    }

    /// Number of values waiting to be rented
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<T: Reusable + Default> Pool<T> {
    /// Pop a released value, or build `T::default()`.
    pub fn rent(&mut self) -> T {
        self.rent_with(T::default)
    }
}

impl<T> Pool<Vec<T>> {
    /// Rent a cleared buffer that can hold at least `min_capacity` items
    /// without reallocating.
    pub fn rent_buffer(&mut self, min_capacity: usize) -> Vec<T> {
        match self.free.pop() {
            Some(mut buffer) => {
                buffer.reserve(min_capacity);
                buffer
            }
            None => Vec::with_capacity(min_capacity),
        }
    }
}
