//! Parent/child bus hierarchy.
//!
//! A broadcast sends on the bus itself and then recursively on every child.
//! Children added or removed while a broadcast is running on the parent are
//! staged and applied once the outermost broadcast returns.

use std::any::Any;

use super::signal_bus::SignalBus;
use crate::error::{Result, SignalBusError};
use crate::signal::Signal;

#[derive(Debug, Default)]
pub(crate) struct Hierarchy {
    children: Vec<SignalBus>,
    pending_add: Vec<SignalBus>,
    pending_remove: Vec<SignalBus>,
    depth: usize,
}

impl Hierarchy {
    fn contains(&self, bus: &SignalBus) -> bool {
        self.children.iter().any(|c| c.ptr_eq(bus))
    }

    fn apply_pending(&mut self) {
        for removed in std::mem::take(&mut self.pending_remove) {
            self.children.retain(|c| !c.ptr_eq(&removed));
        }
        for added in std::mem::take(&mut self.pending_add) {
            if !self.contains(&added) {
                self.children.push(added);
            }
        }
    }
}

impl SignalBus {
    /// Attach `child` so broadcasts on this bus reach it
    ///
    /// Adding a bus that already is a child is a no-op. Adding this bus or
    /// one of its ancestors fails with [`SignalBusError::HierarchyCycle`].
    pub fn add_child(&self, child: &SignalBus) -> Result<()> {
        if child.ptr_eq(self) || child.has_descendant(self) {
            return Err(SignalBusError::HierarchyCycle);
        }

        let mut hierarchy = self.inner.hierarchy.lock();
        if hierarchy.depth > 0 {
            hierarchy.pending_remove.retain(|c| !c.ptr_eq(child));
            hierarchy.pending_add.push(child.clone());
        } else if !hierarchy.contains(child) {
            hierarchy.children.push(child.clone());
        }
        Ok(())
    }

    /// Detach `child`
    ///
    /// Returns true if `child` was attached (or staged for attachment).
    pub fn remove_child(&self, child: &SignalBus) -> bool {
        let mut hierarchy = self.inner.hierarchy.lock();
        if hierarchy.depth > 0 {
            let staged = hierarchy.pending_add.len();
            hierarchy.pending_add.retain(|c| !c.ptr_eq(child));
            if hierarchy.pending_add.len() != staged {
                return true;
            }
            if hierarchy.contains(child) && !hierarchy.pending_remove.iter().any(|c| c.ptr_eq(child)) {
                hierarchy.pending_remove.push(child.clone());
                return true;
            }
            false
        } else {
            let before = hierarchy.children.len();
            hierarchy.children.retain(|c| !c.ptr_eq(child));
            hierarchy.children.len() != before
        }
    }

    /// Number of attached child buses
    pub fn child_count(&self) -> usize {
        self.inner.hierarchy.lock().children.len()
    }

    /// Send `signal` on this bus, then broadcast it to every child
    ///
    /// Stops at the first failing bus.
    pub fn broadcast<T: Signal>(&self, signal: &T) -> Result<()> {
        self.broadcast_dyn(signal)
    }

    /// Broadcast a payload whose type is only known at runtime
    pub fn broadcast_dyn(&self, signal: &dyn Any) -> Result<()> {
        self.send_dyn(signal)?;

        let children = {
            let mut hierarchy = self.inner.hierarchy.lock();
            if hierarchy.children.is_empty() {
                return Ok(());
            }
            hierarchy.depth += 1;
            hierarchy.children.clone()
        };

        let outcome = children.iter().try_for_each(|child| child.broadcast_dyn(signal));

        let mut hierarchy = self.inner.hierarchy.lock();
        hierarchy.depth -= 1;
        if hierarchy.depth == 0 {
            hierarchy.apply_pending();
        }
        outcome
    }

    fn has_descendant(&self, target: &SignalBus) -> bool {
        let children: Vec<SignalBus> = {
            let hierarchy = self.inner.hierarchy.lock();
            hierarchy
                .children
                .iter()
                .chain(hierarchy.pending_add.iter())
                .cloned()
                .collect()
        };
        children
            .iter()
            .any(|child| child.ptr_eq(target) || child.has_descendant(target))
    }
}
