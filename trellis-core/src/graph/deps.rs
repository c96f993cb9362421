//! Dependency Sets
//!
//! The dependency graph is a side table from `(target, key)` to the set of
//! effects that read that key. It owns no observed data: wrappers register
//! their [`TargetId`] on creation and forget it when dropped.
//!
//! # How Resolution Works
//!
//! A write is described by a [`TriggerOp`] and an optional key. Resolution
//! turns that description into the list of dependency sets to notify:
//!
//! - `Clear` notifies every key of the target.
//! - Writing `Length` on a list notifies `Length` plus every index at or past
//!   the new length.
//! - Otherwise the written key is notified, and:
//!   - `Add` on an object also notifies `Iterate`,
//!   - `Add` of an index on a list also notifies `Length`,
//!   - `Delete` on an object also notifies `Iterate`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{DepKey, TargetId, TargetShape, TriggerOp};
use crate::reactive::{EffectId, Subscriber};

/// The subscribers of one `(target, key)` entry.
///
/// Subscribers are held weakly; an effect that has been dropped simply
/// fails to upgrade and is pruned on the next notification.
#[derive(Default)]
pub struct Dep {
    subscribers: RefCell<IndexMap<EffectId, Weak<dyn Subscriber>>>,
}

impl Dep {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn insert(&self, id: EffectId, subscriber: Weak<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, subscriber);
        true
    }

    pub fn remove(&self, id: EffectId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.subscribers.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Upgrade the live subscribers, dropping dead entries.
    pub fn live(&self) -> Vec<Rc<dyn Subscriber>> {
        let mut subscribers = self.subscribers.borrow_mut();
        let mut live = Vec::with_capacity(subscribers.len());
        subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.subscribers.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug)]
struct TargetDeps {
    shape: TargetShape,
    deps: IndexMap<DepKey, Rc<Dep>>,
}

impl TargetDeps {
    fn new(shape: TargetShape) -> Self {
        Self {
            shape,
            deps: IndexMap::new(),
        }
    }
}

/// The `(target, key) -> subscribers` side table.
#[derive(Debug, Default)]
pub struct DepGraph {
    targets: HashMap<TargetId, TargetDeps>,
}

impl DepGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target with its shape.
    pub fn register(&mut self, target: TargetId, shape: TargetShape) {
        self.targets
            .entry(target)
            .or_insert_with(|| TargetDeps::new(shape))
            .shape = shape;
    }

    /// Drop every entry of a target.
    pub fn forget(&mut self, target: TargetId) {
        if let Some(entry) = self.targets.remove(&target) {
            for dep in entry.deps.values() {
                dep.clear();
            }
        }
    }

    /// Get the dependency set for a key, creating it on first read.
    pub fn dep_for(&mut self, target: TargetId, key: &DepKey) -> Rc<Dep> {
        let entry = self
            .targets
            .entry(target)
            .or_insert_with(|| TargetDeps::new(TargetShape::Object));
        if let Some(dep) = entry.deps.get(key) {
            return dep.clone();
        }
        let dep = Dep::new();
        entry.deps.insert(key.clone(), dep.clone());
        dep
    }

    /// Resolve a write into the dependency sets that must be notified.
    ///
    /// `new_length` is only consulted when `key` is [`DepKey::Length`].
    pub fn resolve(
        &self,
        target: TargetId,
        op: TriggerOp,
        key: Option<&DepKey>,
        new_length: Option<usize>,
    ) -> SmallVec<[Rc<Dep>; 4]> {
        let mut out = SmallVec::new();
        let Some(entry) = self.targets.get(&target) else {
            return out;
        };
        let is_list = entry.shape == TargetShape::List;

        if op == TriggerOp::Clear {
            out.extend(entry.deps.values().cloned());
            return out;
        }

        if is_list && key == Some(&DepKey::Length) {
            let bound = new_length.unwrap_or(0);
            for (dep_key, dep) in &entry.deps {
                match dep_key {
                    DepKey::Length => out.push(dep.clone()),
                    DepKey::Index(i) if *i >= bound => out.push(dep.clone()),
                    _ => {}
                }
            }
            return out;
        }

        let mut push = |k: &DepKey| {
            if let Some(dep) = entry.deps.get(k) {
                out.push(dep.clone());
            }
        };

        if let Some(key) = key {
            push(key);
        }

        match op {
            TriggerOp::Add if !is_list => push(&DepKey::Iterate),
            TriggerOp::Add if matches!(key, Some(DepKey::Index(_))) => push(&DepKey::Length),
            TriggerOp::Delete if !is_list => push(&DepKey::Iterate),
            _ => {}
        }

        out
    }

    /// Number of registered targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of keys with a dependency set on a target.
    pub fn key_count(&self, target: TargetId) -> usize {
        self.targets.get(&target).map_or(0, |entry| entry.deps.len())
    }

    /// Number of subscribers recorded for one key.
    pub fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.targets
            .get(&target)
            .and_then(|entry| entry.deps.get(key))
            .map_or(0, |dep| dep.len())
    }
}
