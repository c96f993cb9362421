//! Observed Maps
//!
//! [`ReactiveMap`] is a string-keyed record whose reads and writes go
//! through the dependency graph. Besides one key per entry it maintains the
//! structural `Iterate` key, so that computations enumerating the map are
//! invalidated when entries come and go, while computations that read a
//! single unrelated entry are not.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::runtime::{Runtime, WeakRuntime};
use crate::graph::{DepKey, TargetId, TargetShape, TrackOp, TriggerOp};

struct MapInner<V> {
    target: TargetId,
    runtime: WeakRuntime,
    entries: RefCell<IndexMap<String, V>>,
}

impl<V> Drop for MapInner<V> {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_target(self.target);
        }
    }
}

/// An observed, insertion-ordered map with string keys.
///
/// # Example
///
/// ```rust,ignore
/// let user = ReactiveMap::new(&rt);
/// user.insert("name", "Ada".to_string());
///
/// let u = user.clone();
/// let _effect = rt.effect(move || println!("{} fields", u.len()));
///
/// user.insert("role", "admin".to_string()); // prints "2 fields"
/// ```
pub struct ReactiveMap<V: 'static> {
    inner: Rc<MapInner<V>>,
}

impl<V: 'static> ReactiveMap<V> {
    pub fn new(rt: &Runtime) -> Self {
        Self::from_entries(rt, std::iter::empty::<(String, V)>())
    }

    pub fn from_entries<K, I>(rt: &Runtime, entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            inner: Rc::new(MapInner {
                target: rt.register_target(TargetShape::Object),
                runtime: rt.downgrade(),
                entries: RefCell::new(
                    entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
                ),
            }),
        }
    }

    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    pub(super) fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    fn track(&self, op: TrackOp, key: DepKey) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.track(self.inner.target, op, key);
        }
    }

    fn trigger(&self, op: TriggerOp, key: Option<DepKey>) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.trigger(self.inner.target, op, key, None);
        }
    }

    /// Whether `key` is present. Tracks the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.track(TrackOp::Has, DepKey::field(key));
        self.inner.entries.borrow().contains_key(key)
    }

    /// Borrow one entry. Tracks the key, present or not.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(Option<&V>) -> R) -> R {
        self.track(TrackOp::Get, DepKey::field(key));
        f(self.inner.entries.borrow().get(key))
    }

    /// Number of entries. Tracks iteration.
    pub fn len(&self) -> usize {
        self.track(TrackOp::Iterate, DepKey::Iterate);
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys, in insertion order. Tracks iteration.
    pub fn keys(&self) -> Vec<String> {
        self.track(TrackOp::Iterate, DepKey::Iterate);
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Remove an entry, triggering `Delete` if it existed.
    pub fn remove(&self, key: &str) -> Option<V> {
        let removed = self.inner.entries.borrow_mut().shift_remove(key);
        if removed.is_some() {
            self.trigger(TriggerOp::Delete, Some(DepKey::field(key)));
        }
        removed
    }

    /// Remove every entry, triggering `Clear` if the map was not empty.
    pub fn clear(&self) {
        let had_entries = {
            let mut entries = self.inner.entries.borrow_mut();
            let had = !entries.is_empty();
            entries.clear();
            had
        };
        if had_entries {
            self.trigger(TriggerOp::Clear, None);
        }
    }
}

impl<V: Clone + 'static> ReactiveMap<V> {
    /// Get a copy of one entry. Tracks the key, present or not.
    pub fn get(&self, key: &str) -> Option<V> {
        self.track(TrackOp::Get, DepKey::field(key));
        self.inner.entries.borrow().get(key).cloned()
    }

    /// Copy of all entries. Tracks iteration.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.track(TrackOp::Iterate, DepKey::Iterate);
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<V: PartialEq + 'static> ReactiveMap<V> {
    /// Insert or overwrite an entry.
    ///
    /// A new key triggers `Add`; overwriting with a different value triggers
    /// `Set`; overwriting with an equal value triggers nothing.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        let (op, previous) = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(slot) if *slot == value => return Some(value),
                Some(slot) => (TriggerOp::Set, Some(std::mem::replace(slot, value))),
                None => {
                    entries.insert(key.clone(), value);
                    (TriggerOp::Add, None)
                }
            }
        };
        self.trigger(op, Some(DepKey::field(&key)));
        previous
    }
}

impl<V: 'static> Clone for ReactiveMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V: fmt::Debug + 'static> fmt::Debug for ReactiveMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("target", &self.inner.target)
            .field("entries", &*self.inner.entries.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn add_invalidates_iteration_not_unrelated_keys() {
        let rt = Runtime::new();
        let map = ReactiveMap::from_entries(&rt, [("a", 1), ("b", 2)]);

        let (iter_runs, ir) = counter();
        let m = map.clone();
        let _iterating = Effect::new(&rt, move || {
            m.keys();
            ir.set(ir.get() + 1);
        });

        let (a_runs, ar) = counter();
        let m = map.clone();
        let _reading_a = Effect::new(&rt, move || {
            m.get("a");
            ar.set(ar.get() + 1);
        });

        map.insert("c", 3);
        assert_eq!(iter_runs.get(), 2);
        assert_eq!(a_runs.get(), 1);

        map.insert("a", 10);
        assert_eq!(iter_runs.get(), 2);
        assert_eq!(a_runs.get(), 2);
    }

    #[test]
    fn equal_overwrite_is_silent() {
        let rt = Runtime::new();
        let map = ReactiveMap::from_entries(&rt, [("a", 1)]);
        let (runs, r) = counter();
        let m = map.clone();
        let _effect = Effect::new(&rt, move || {
            m.get("a");
            r.set(r.get() + 1);
        });

        assert_eq!(map.insert("a", 1), Some(1));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn read_of_missing_key_sees_later_add() {
        let rt = Runtime::new();
        let map: ReactiveMap<i32> = ReactiveMap::new(&rt);
        let seen = Rc::new(Cell::new(None));

        let (m, s) = (map.clone(), seen.clone());
        let _effect = Effect::new(&rt, move || s.set(m.get("late")));
        assert_eq!(seen.get(), None);

        map.insert("late", 7);
        assert_eq!(seen.get(), Some(7));
    }

    #[test]
    fn delete_and_clear() {
        let rt = Runtime::new();
        let map = ReactiveMap::from_entries(&rt, [("a", 1), ("b", 2)]);
        let (runs, r) = counter();
        let m = map.clone();
        let _effect = Effect::new(&rt, move || {
            m.len();
            r.set(r.get() + 1);
        });

        assert_eq!(map.remove("a"), Some(1));
        assert_eq!(runs.get(), 2);
        assert_eq!(map.remove("missing"), None);
        assert_eq!(runs.get(), 2);

        map.clear();
        assert_eq!(runs.get(), 3);
        map.clear();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn clear_reaches_single_key_readers() {
        let rt = Runtime::new();
        let map = ReactiveMap::from_entries(&rt, [("a", 1)]);
        let (runs, r) = counter();
        let m = map.clone();
        let _effect = Effect::new(&rt, move || {
            m.contains_key("a");
            r.set(r.get() + 1);
        });

        map.clear();
        assert_eq!(runs.get(), 2);
    }
}
