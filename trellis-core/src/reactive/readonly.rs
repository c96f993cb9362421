//! Read-only Views
//!
//! A read-only view shares its source's state and dependency target. Reads
//! go through the source and are tracked as usual, so an effect reading the
//! view re-runs when the source changes. Writes through the view report
//! [`RuntimeError::ReadonlyWrite`] to the runtime's warning sink and leave
//! the state untouched.

use std::fmt;

use super::map::ReactiveMap;
use super::runtime::Runtime;
use super::signal::Signal;
use crate::error::RuntimeError;
use crate::graph::TargetId;

fn reject(rt: Option<Runtime>, op: &'static str, key: Option<&str>) {
    if let Some(rt) = rt {
        rt.warn(&RuntimeError::ReadonlyWrite {
            op,
            key: key.map(str::to_owned),
        });
    }
}

// ----------------------------------------------------------------------------
// Signals
// ----------------------------------------------------------------------------

impl<T: 'static> Signal<T> {
    /// A view of this signal that cannot write it.
    pub fn readonly(&self) -> ReadonlySignal<T> {
        ReadonlySignal {
            source: self.clone(),
        }
    }
}

/// Read-only view of a [`Signal`].
pub struct ReadonlySignal<T: 'static> {
    source: Signal<T>,
}

impl<T: 'static> ReadonlySignal<T> {
    pub fn target(&self) -> TargetId {
        self.source.target()
    }

    /// Borrow the value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.with(f)
    }

    pub fn subscriber_count(&self) -> usize {
        self.source.subscriber_count()
    }

    /// Rejected: warns and leaves the value as it is.
    pub fn set(&self, _value: T) {
        reject(self.source.runtime(), "set", Some("value"));
    }

    /// Rejected: warns without calling `f`.
    pub fn update(&self, _f: impl FnOnce(&mut T)) {
        reject(self.source.runtime(), "set", Some("value"));
    }

    /// Views are already read-only.
    pub fn readonly(&self) -> ReadonlySignal<T> {
        self.clone()
    }
}

impl<T: Clone + 'static> ReadonlySignal<T> {
    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn get_untracked(&self) -> T {
        self.source.get_untracked()
    }
}

impl<T: 'static> Clone for ReadonlySignal<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReadonlySignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadonlySignal").field(&self.source).finish()
    }
}

// ----------------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------------

impl<V: 'static> ReactiveMap<V> {
    /// A view of this map that cannot write it.
    pub fn readonly(&self) -> ReadonlyMap<V> {
        ReadonlyMap {
            source: self.clone(),
        }
    }
}

/// Read-only view of a [`ReactiveMap`].
pub struct ReadonlyMap<V: 'static> {
    source: ReactiveMap<V>,
}

impl<V: 'static> ReadonlyMap<V> {
    pub fn target(&self) -> TargetId {
        self.source.target()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.source.contains_key(key)
    }

    pub fn with<R>(&self, key: &str, f: impl FnOnce(Option<&V>) -> R) -> R {
        self.source.with(key, f)
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.source.keys()
    }

    /// Rejected: warns and returns `None`.
    pub fn insert(&self, key: impl Into<String>, _value: V) -> Option<V> {
        let key = key.into();
        reject(self.source.runtime(), "set", Some(&key));
        None
    }

    /// Rejected: warns and returns `None`.
    pub fn remove(&self, key: &str) -> Option<V> {
        reject(self.source.runtime(), "delete", Some(key));
        None
    }

    /// Rejected: warns and keeps every entry.
    pub fn clear(&self) {
        reject(self.source.runtime(), "clear", None);
    }

    pub fn readonly(&self) -> ReadonlyMap<V> {
        self.clone()
    }
}

impl<V: Clone + 'static> ReadonlyMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.source.get(key)
    }

    pub fn entries(&self) -> Vec<(String, V)> {
        self.source.entries()
    }
}

impl<V: 'static> Clone for ReadonlyMap<V> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<V: fmt::Debug + 'static> fmt::Debug for ReadonlyMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadonlyMap").field(&self.source).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn collect_warnings(rt: &Runtime) -> Rc<RefCell<Vec<RuntimeError>>> {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        rt.set_warn_handler(move |w| sink.borrow_mut().push(w.clone()));
        warnings
    }

    #[test]
    fn readonly_signal_tracks_source_writes() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 1);
        let view = count.readonly();
        let seen = Rc::new(Cell::new(0));

        let (v, s) = (view.clone(), seen.clone());
        let _effect = Effect::new(&rt, move || s.set(v.get()));
        assert_eq!(seen.get(), 1);
        assert_eq!(count.subscriber_count(), 1);

        count.set(2);
        assert_eq!(seen.get(), 2);
        assert_eq!(view.target(), count.target());
    }

    #[test]
    fn readonly_signal_write_warns_and_is_ignored() {
        let rt = Runtime::new();
        let warnings = collect_warnings(&rt);
        let count = Signal::new(&rt, 1);
        let view = count.readonly();

        let runs = Rc::new(Cell::new(0));
        let (c, r) = (count.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            c.get();
            r.set(r.get() + 1);
        });

        view.set(5);
        view.update(|n| *n = 9);

        assert_eq!(count.get_untracked(), 1);
        assert_eq!(runs.get(), 1);
        let expected = RuntimeError::ReadonlyWrite {
            op: "set",
            key: Some("value".into()),
        };
        assert_eq!(*warnings.borrow(), vec![expected.clone(), expected]);
    }

    #[test]
    fn readonly_map_reads_go_through() {
        let rt = Runtime::new();
        let map = ReactiveMap::from_entries(&rt, [("a", 1)]);
        let view = map.readonly();
        let keys = Rc::new(RefCell::new(Vec::new()));

        let (v, k) = (view.clone(), keys.clone());
        let _effect = Effect::new(&rt, move || *k.borrow_mut() = v.keys());

        map.insert("b", 2);
        assert_eq!(*keys.borrow(), vec!["a", "b"]);
        assert_eq!(view.get("b"), Some(2));
        assert!(view.contains_key("a"));
        assert_eq!(view.len(), 2);
        assert_eq!(view.with("a", |v| v.copied()), Some(1));
    }

    #[test]
    fn readonly_map_writes_warn_and_are_ignored() {
        let rt = Runtime::new();
        let warnings = collect_warnings(&rt);
        let map = ReactiveMap::from_entries(&rt, [("a", 1)]);
        let view = map.readonly().readonly();

        assert_eq!(view.insert("a", 10), None);
        assert_eq!(view.remove("a"), None);
        view.clear();

        assert_eq!(map.entries(), vec![("a".to_string(), 1)]);
        assert_eq!(
            *warnings.borrow(),
            vec![
                RuntimeError::ReadonlyWrite {
                    op: "set",
                    key: Some("a".into())
                },
                RuntimeError::ReadonlyWrite {
                    op: "delete",
                    key: Some("a".into())
                },
                RuntimeError::ReadonlyWrite {
                    op: "clear",
                    key: None
                },
            ]
        );
    }
}
