//! Subscription registry.
//!
//! Owns the per-type subscription lists and the per-type dispatch state.
//! While a type is dispatching, registrations and deregistrations for it are
//! staged in that type's [`PendingChanges`] and merged once the dispatch
//! ends; other types are mutated in place.

use crate::config::SortPolicy;
use crate::error::CycleError;
use crate::ordering::Sorter;
use crate::pool::{Pool, Reusable};
use crate::signal::SignalKey;
use crate::subscription::{HandlerId, Subscription, Token};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared subscription reference, as stored in lists and snapshots.
pub type SubscriptionRef = Arc<Subscription>;

/// Registrations and deregistrations staged during a dispatch.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    added: Vec<SubscriptionRef>,
    removed: Vec<SubscriptionRef>,
}

impl PendingChanges {
    fn is_removed(&self, subscription: &SubscriptionRef) -> bool {
        self.removed.iter().any(|r| Arc::ptr_eq(r, subscription))
    }
}

impl Reusable for PendingChanges {
    fn reset(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}

#[derive(Debug)]
struct TypeEntry {
    key: SignalKey,
    subscriptions: Vec<SubscriptionRef>,
    needs_sort: bool,
    dispatch: Option<PendingChanges>,
}

impl TypeEntry {
    fn new(key: SignalKey) -> Self {
        Self {
            key,
            subscriptions: Vec::new(),
            needs_sort: false,
            dispatch: None,
        }
    }
}

/// Result of trying to start a dispatch.
#[derive(Debug)]
pub(crate) enum DispatchStart {
    /// Nothing subscribed with the requested shape. Carries the registered
    /// key when the type is known, for notices.
    Empty(SignalKey),
    /// The type is already dispatching.
    Busy(SignalKey),
    /// Pending constraints could not be resolved.
    Unsortable(SignalKey, CycleError),
    /// Dispatch state is set; invoke the snapshot, then call `end_dispatch`.
    Ready(SignalKey, Vec<SubscriptionRef>),
}

/// Per-type subscription lists plus the pools backing dispatch.
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<TypeId, TypeEntry>,
    sorter: Sorter,
    sort_policy: SortPolicy,
    snapshot_capacity: usize,
    snapshots: Pool<Vec<SubscriptionRef>>,
    pending: Pool<PendingChanges>,
    next_sequence: u64,
}

impl Registry {
    /// Create an empty registry
    pub fn new(sort_policy: SortPolicy, snapshot_capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sorter: Sorter::new(),
            sort_policy,
            snapshot_capacity,
            snapshots: Pool::new(),
            pending: Pool::new(),
            next_sequence: 0,
        }
    }

    /// Add `subscription` to the list of `key`.
    ///
    /// Staged when `key` is dispatching. Under the eager sort policy a
    /// registration whose constraints cannot be ordered is rolled back,
    /// whether it is applied now or staged.
    pub fn register(&mut self, key: SignalKey, mut subscription: Subscription) -> Result<(), CycleError> {
        subscription.sequence = self.next_sequence;
        self.next_sequence += 1;
        let ordered = subscription.order.is_some();
        let subscription = Arc::new(subscription);
        let entry = self
            .entries
            .entry(key.id())
            .or_insert_with(|| TypeEntry::new(key));

        if let Some(pending) = entry.dispatch.as_mut() {
            if ordered && self.sort_policy == SortPolicy::Eager {
                // Sort the list the merge will produce, so the merge cannot fail.
                let mut merged = self
                    .snapshots
                    .rent_buffer(entry.subscriptions.len() + pending.added.len() + 1);
                merged.extend(
                    entry
                        .subscriptions
                        .iter()
                        .filter(|s| !pending.is_removed(s))
                        .cloned(),
                );
                merged.extend(pending.added.iter().cloned());
                merged.push(Arc::clone(&subscription));
                let checked = self.sorter.sort(&mut merged);
                self.snapshots.release(merged);
                checked?;
            }
            pending.added.push(subscription);
            return Ok(());
        }

        entry.subscriptions.push(subscription);
        if !ordered {
            return Ok(());
        }

        match self.sort_policy {
            SortPolicy::Lazy => {
                entry.needs_sort = true;
                Ok(())
            }
            SortPolicy::Eager => match self.sorter.sort(&mut entry.subscriptions) {
                Ok(()) => {
                    entry.needs_sort = false;
                    Ok(())
                }
                Err(cycle) => {
                    // The sorter leaves the list untouched on failure.
                    entry.subscriptions.pop();
                    Err(cycle)
                }
            },
        }
    }

    /// Remove the first subscription of `type_id` whose handler is `identity`.
    pub fn deregister_identity(&mut self, type_id: TypeId, identity: HandlerId) -> bool {
        let Some(entry) = self.entries.get_mut(&type_id) else {
            return false;
        };
        let TypeEntry {
            subscriptions,
            dispatch,
            ..
        } = entry;

        match dispatch {
            Some(pending) => {
                let live = subscriptions
                    .iter()
                    .find(|s| s.identity == identity && !pending.is_removed(s))
                    .cloned();
                if let Some(subscription) = live {
                    pending.removed.push(subscription);
                    return true;
                }
                match pending.added.iter().position(|s| s.identity == identity) {
                    Some(index) => {
                        pending.added.remove(index);
                        true
                    }
                    None => false,
                }
            }
            None => match subscriptions.iter().position(|s| s.identity == identity) {
                Some(index) => {
                    subscriptions.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    /// Remove every subscription carrying `token`, across all types.
    pub fn deregister_token(&mut self, token: &Token) -> usize {
        let mut removed = 0;

        for entry in self.entries.values_mut() {
            let TypeEntry {
                subscriptions,
                dispatch,
                ..
            } = entry;

            match dispatch {
                Some(pending) => {
                    for subscription in subscriptions.iter() {
                        if subscription.token == *token && !pending.is_removed(subscription) {
                            pending.removed.push(Arc::clone(subscription));
                            removed += 1;
                        }
                    }
                    let before = pending.added.len();
                    pending.added.retain(|s| s.token != *token);
                    removed += before - pending.added.len();
                }
                None => {
                    let before = subscriptions.len();
                    subscriptions.retain(|s| s.token != *token);
                    removed += before - subscriptions.len();
                }
            }
        }

        removed
    }

    /// Drop every subscription of every type.
    ///
    /// Types that are dispatching keep their dispatch state so the
    /// in-flight dispatch can still end cleanly, but lose their staged
    /// changes too.
    pub fn clear(&mut self) {
        self.entries.retain(|_, entry| match entry.dispatch.as_mut() {
            Some(pending) => {
                pending.reset();
                entry.subscriptions.clear();
                entry.needs_sort = false;
                true
            }
            None => false,
        });
    }

    /// Mark `type_id` as dispatching and snapshot its subscriptions of the
    /// requested shape.
    pub(crate) fn begin_dispatch(&mut self, key: SignalKey, asynchronous: bool) -> DispatchStart {
        let Some(entry) = self.entries.get_mut(&key.id()) else {
            return DispatchStart::Empty(key);
        };

        if entry.dispatch.is_some() {
            return DispatchStart::Busy(entry.key);
        }

        if entry.needs_sort {
            if let Err(cycle) = self.sorter.sort(&mut entry.subscriptions) {
                return DispatchStart::Unsortable(entry.key, cycle);
            }
            entry.needs_sort = false;
        }

        let capacity = entry.subscriptions.len().max(self.snapshot_capacity);
        let mut snapshot = self.snapshots.rent_buffer(capacity);
        snapshot.extend(
            entry
                .subscriptions
                .iter()
                .filter(|s| s.handler.is_async() == asynchronous)
                .cloned(),
        );

        if snapshot.is_empty() {
            self.snapshots.release(snapshot);
            return DispatchStart::Empty(entry.key);
        }

        entry.dispatch = Some(self.pending.rent());
        DispatchStart::Ready(entry.key, snapshot)
    }

    /// Leave the dispatching state of `type_id`, merge staged changes and
    /// return `snapshot` to the pool.
    pub(crate) fn end_dispatch(
        &mut self,
        type_id: TypeId,
        snapshot: Vec<SubscriptionRef>,
    ) -> Result<(), CycleError> {
        self.snapshots.release(snapshot);

        let Some(entry) = self.entries.get_mut(&type_id) else {
            return Ok(());
        };
        let Some(mut pending) = entry.dispatch.take() else {
            return Ok(());
        };

        if !pending.removed.is_empty() {
            entry
                .subscriptions
                .retain(|s| !pending.removed.iter().any(|r| Arc::ptr_eq(r, s)));
        }

        let mut ordered = false;
        for subscription in pending.added.drain(..) {
            ordered |= subscription.order.is_some();
            entry.subscriptions.push(subscription);
        }
        self.pending.release(pending);

        if ordered {
            entry.needs_sort = true;
        }
        if entry.needs_sort && self.sort_policy == SortPolicy::Eager {
            self.sorter.sort(&mut entry.subscriptions)?;
            entry.needs_sort = false;
        }
        Ok(())
    }

    /// Number of live subscriptions for `type_id`
    pub fn subscriber_count(&self, type_id: TypeId) -> usize {
        self.entries
            .get(&type_id)
            .map_or(0, |entry| entry.subscriptions.len())
    }

    /// Number of live subscriptions across all types
    pub fn total_subscriptions(&self) -> usize {
        self.entries.values().map(|e| e.subscriptions.len()).sum()
    }

    /// Keys of all types that currently have subscriptions
    pub fn signal_types(&self) -> Vec<SignalKey> {
        self.entries
            .values()
            .filter(|e| !e.subscriptions.is_empty())
            .map(|e| e.key)
            .collect()
    }

    /// Whether `type_id` has a dispatch in flight
    pub fn is_dispatching(&self, type_id: TypeId) -> bool {
        self.entries
            .get(&type_id)
            .is_some_and(|entry| entry.dispatch.is_some())
    }

    /// Live subscriptions of `type_id`, in dispatch order
    pub fn subscriptions(&self, type_id: TypeId) -> &[SubscriptionRef] {
        self.entries
            .get(&type_id)
            .map(|entry| entry.subscriptions.as_slice())
            .unwrap_or_default()
    }
}
