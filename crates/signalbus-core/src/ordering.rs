//! Dependency ordering of subscriptions.
//!
//! Resolves before/after constraints between subscription owners into a
//! total order. Entries without ordering options keep their relative order
//! and always land after the ordered prefix.
//!
//! ## Graph
//!
//! An edge `A -> B` means "A runs before B":
//! - `S.after` containing `K` adds `X -> S` for every other ordered entry `X` keyed `K`
//! - `S.before` containing `K` adds `S -> X` for every other ordered entry `X` keyed `K`
//!
//! Entries are visited in registration sequence, never in their current list
//! position, so the result depends only on the set of entries and not on
//! how earlier sorts arranged them. Edges are recorded as predecessor lists
//! in declaration order (entries scanned by sequence, `after` before
//! `before`). The sort emits each entry right after all of its
//! predecessors, depth first, in time linear in nodes plus edges. Meeting a
//! predecessor that is still being expanded means a cycle.

use crate::error::CycleError;
use crate::subscription::{OrderKey, OrderOptions, Subscription};
use std::sync::Arc;

/// Anything carrying optional ordering options.
pub trait Ordered {
    /// The ordering options, `None` for unordered entries
    fn order_options(&self) -> Option<&OrderOptions>;

    /// Position in registration order; unique among the entries sorted together
    fn sequence(&self) -> u64;
}

impl Ordered for Subscription {
    fn order_options(&self) -> Option<&OrderOptions> {
        self.order.as_ref()
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl<T: Ordered + ?Sized> Ordered for Arc<T> {
    fn order_options(&self) -> Option<&OrderOptions> {
        (**self).order_options()
    }

    fn sequence(&self) -> u64 {
        (**self).sequence()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Topological sorter with reusable scratch space.
///
/// Owned by whoever sorts (the registry keeps one), never shared globally.
#[derive(Debug, Default)]
pub struct Sorter {
    ordered: Vec<usize>,
    unordered: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
    marks: Vec<Mark>,
    stack: Vec<(usize, usize)>,
    resolved: Vec<usize>,
}

impl Sorter {
    /// Create a sorter with empty scratch space
    pub fn new() -> Self {
        Self::default()
    }

    /// Reorder `items` so every before/after constraint holds.
    ///
    /// Leaves `items` untouched when no entry is ordered, or when the
    /// constraints contain a cycle.
    pub fn sort<S: Ordered>(&mut self, items: &mut Vec<S>) -> Result<(), CycleError> {
        self.clear();

        for (index, item) in items.iter().enumerate() {
            if item.order_options().is_some() {
                self.ordered.push(index);
            } else {
                self.unordered.push(index);
            }
        }

        if self.ordered.is_empty() {
            return Ok(());
        }
        self.ordered.sort_unstable_by_key(|&index| items[index].sequence());
        self.unordered.sort_unstable_by_key(|&index| items[index].sequence());

        self.build_graph(items);
        if let Err(cycle) = self.resolve() {
            let view: &[S] = items;
            let unresolved = cycle
                .into_iter()
                .filter_map(|node| Self::key_at(view, &self.ordered, node))
                .map(ToString::to_string)
                .collect();
            self.clear();
            return Err(CycleError { unresolved });
        }

        let mut slots: Vec<Option<S>> = items.drain(..).map(Some).collect();
        let order = self
            .resolved
            .iter()
            .map(|&node| self.ordered[node])
            .chain(self.unordered.iter().copied());
        items.extend(order.filter_map(|index| slots[index].take()));

        self.clear();
        Ok(())
    }

    /// Nodes are positions in `self.ordered`, not in `items`.
    fn build_graph<S: Ordered>(&mut self, items: &[S]) {
        let count = self.ordered.len();
        self.marks.resize(count, Mark::Unvisited);
        if self.predecessors.len() < count {
            self.predecessors.resize_with(count, Vec::new);
        }

        for current in 0..count {
            let Some(options) = items[self.ordered[current]].order_options() else {
                continue;
            };

            for key in &options.after {
                for other in 0..count {
                    if other != current && Self::key_at(items, &self.ordered, other) == Some(key) {
                        self.predecessors[current].push(other);
                    }
                }
            }

            for key in &options.before {
                for other in 0..count {
                    if other != current && Self::key_at(items, &self.ordered, other) == Some(key) {
                        self.predecessors[other].push(current);
                    }
                }
            }
        }
    }

    fn key_at<'a, S: Ordered>(items: &'a [S], ordered: &[usize], node: usize) -> Option<&'a OrderKey> {
        items[ordered[node]].order_options().map(|options| &options.key)
    }

    /// Fill `resolved` with every node after its predecessors. On a cycle,
    /// returns the nodes forming it.
    fn resolve(&mut self) -> Result<(), Vec<usize>> {
        for root in 0..self.ordered.len() {
            if self.marks[root] != Mark::Unvisited {
                continue;
            }
            self.marks[root] = Mark::Active;
            self.stack.push((root, 0));

            while let Some(top) = self.stack.len().checked_sub(1) {
                let (node, cursor) = self.stack[top];
                if let Some(&pred) = self.predecessors[node].get(cursor) {
                    self.stack[top].1 += 1;
                    match self.marks[pred] {
                        Mark::Unvisited => {
                            self.marks[pred] = Mark::Active;
                            self.stack.push((pred, 0));
                        }
                        Mark::Active => {
                            let start = self
                                .stack
                                .iter()
                                .position(|&(n, _)| n == pred)
                                .unwrap_or(0);
                            return Err(self.stack[start..].iter().map(|&(n, _)| n).collect());
                        }
                        Mark::Done => {}
                    }
                } else {
                    self.stack.pop();
                    self.marks[node] = Mark::Done;
                    self.resolved.push(node);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.ordered.clear();
        self.unordered.clear();
        for predecessors in &mut self.predecessors {
            predecessors.clear();
        }
        self.marks.clear();
        self.stack.clear();
        self.resolved.clear();
    }
}
