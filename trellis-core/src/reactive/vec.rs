//! Observed Lists
//!
//! [`ReactiveVec`] keeps one dependency key per index plus the synthetic
//! `Length` key, and couples the two the way a growable array must:
//!
//! - writing one past the end adds an index and changes the length,
//! - shrinking the length invalidates every index that fell off the end.
//!
//! Mutators that change the length run with tracking paused, so calling
//! them from inside an effect does not make that effect depend on the
//! list's length (which would re-trigger it on every push).
//!
//! Searches ([`ReactiveVec::contains`], [`ReactiveVec::position`]) compare
//! every element, so they track every index.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use crate::graph::{DepKey, TargetId, TargetShape, TrackOp, TriggerOp};

struct VecInner<T> {
    target: TargetId,
    runtime: WeakRuntime,
    items: RefCell<Vec<T>>,
}

impl<T> Drop for VecInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_target(self.target);
        }
    }
}

/// An observed, growable list.
pub struct ReactiveVec<T: 'static> {
    inner: Rc<VecInner<T>>,
}

impl<T: Clone + PartialEq + 'static> ReactiveVec<T> {
    pub fn new(rt: &Runtime) -> Self {
        Self::from_vec(rt, Vec::new())
    }

    pub fn from_vec(rt: &Runtime, items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(VecInner {
                target: rt.register_target(TargetShape::List),
                runtime: rt.downgrade(),
                items: RefCell::new(items),
            }),
        }
    }

    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    fn track(&self, op: TrackOp, key: DepKey) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.track(self.inner.target, op, key);
        }
    }

    fn track_all(&self) {
        let Some(rt) = self.inner.runtime.upgrade() else {
            return;
        };
        let len = self.inner.items.borrow().len();
        rt.track(self.inner.target, TrackOp::Get, DepKey::Length);
        for index in 0..len {
            rt.track(self.inner.target, TrackOp::Get, DepKey::Index(index));
        }
    }

    fn trigger(&self, op: TriggerOp, key: DepKey, new_length: Option<usize>) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.trigger(self.inner.target, op, Some(key), new_length);
        }
    }

    /// Run a length-changing mutation with tracking paused.
    fn mutate<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.inner.runtime.upgrade() {
            Some(rt) => rt.untracked(f),
            None => f(),
        }
    }

    /// Trigger `Set` for every index in `range` whose value changed.
    fn trigger_shifted(&self, before: &[T], range: std::ops::Range<usize>) {
        let changed: Vec<usize> = {
            let items = self.inner.items.borrow();
            range
                .filter(|&i| before.get(i) != items.get(i))
                .collect()
        };
        for index in changed {
            self.trigger(TriggerOp::Set, DepKey::Index(index), None);
        }
    }

    /// Get a copy of one element. Tracks the index.
    pub fn get(&self, index: usize) -> Option<T> {
        self.track(TrackOp::Get, DepKey::Index(index));
        self.inner.items.borrow().get(index).cloned()
    }

    /// Number of elements. Tracks the length.
    pub fn len(&self) -> usize {
        self.track(TrackOp::Get, DepKey::Length);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all elements. Tracks the length and every index.
    pub fn to_vec(&self) -> Vec<T> {
        self.track_all();
        self.inner.items.borrow().clone()
    }

    /// Whether an equal element is present. Tracks every index.
    pub fn contains(&self, value: &T) -> bool {
        self.track_all();
        self.inner.items.borrow().contains(value)
    }

    /// Index of the first equal element. Tracks every index.
    pub fn position(&self, value: &T) -> Option<usize> {
        self.track_all();
        self.inner.items.borrow().iter().position(|item| item == value)
    }

    /// Overwrite an element.
    ///
    /// Writing at `len()` appends. Returns `false` for indices past the end.
    pub fn set(&self, index: usize, value: T) -> bool {
        let len = self.inner.items.borrow().len();
        if index == len {
            self.push(value);
            return true;
        }
        if index > len {
            return false;
        }
        {
            let mut items = self.inner.items.borrow_mut();
            if items[index] == value {
                return true;
            }
            items[index] = value;
        }
        self.trigger(TriggerOp::Set, DepKey::Index(index), None);
        true
    }

    pub fn push(&self, value: T) {
        self.mutate(|| {
            let index = {
                let mut items = self.inner.items.borrow_mut();
                items.push(value);
                items.len() - 1
            };
            self.trigger(TriggerOp::Add, DepKey::Index(index), None);
        });
    }

    pub fn pop(&self) -> Option<T> {
        self.mutate(|| {
            let (popped, len) = {
                let mut items = self.inner.items.borrow_mut();
                let popped = items.pop();
                (popped, items.len())
            };
            if popped.is_some() {
                self.trigger(TriggerOp::Set, DepKey::Length, Some(len));
            }
            popped
        })
    }

    /// Insert at `index`, shifting later elements. Returns `false` if
    /// `index > len`.
    pub fn insert(&self, index: usize, value: T) -> bool {
        self.mutate(|| {
            let before = {
                let mut items = self.inner.items.borrow_mut();
                if index > items.len() {
                    return false;
                }
                let before = items.clone();
                items.insert(index, value);
                before
            };
            let old_len = before.len();
            self.trigger_shifted(&before, index..old_len);
            self.trigger(TriggerOp::Add, DepKey::Index(old_len), None);
            true
        })
    }

    /// Remove the element at `index`, shifting later elements.
    pub fn remove(&self, index: usize) -> Option<T> {
        self.mutate(|| {
            let (before, removed) = {
                let mut items = self.inner.items.borrow_mut();
                if index >= items.len() {
                    return None;
                }
                let before = items.clone();
                let removed = items.remove(index);
                (before, removed)
            };
            let new_len = before.len() - 1;
            self.trigger_shifted(&before, index..new_len);
            self.trigger(TriggerOp::Set, DepKey::Length, Some(new_len));
            Some(removed)
        })
    }

    /// Shorten to `len` elements.
    pub fn truncate(&self, len: usize) {
        self.mutate(|| {
            let shrunk = {
                let mut items = self.inner.items.borrow_mut();
                let shrunk = len < items.len();
                items.truncate(len);
                shrunk
            };
            if shrunk {
                self.trigger(TriggerOp::Set, DepKey::Length, Some(len));
            }
        });
    }

    pub fn clear(&self) {
        self.truncate(0);
    }
}

impl<T: 'static> Clone for ReactiveVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReactiveVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveVec")
            .field("target", &self.inner.target)
            .field("items", &*self.inner.items.borrow())
            .finish()
    }
}
