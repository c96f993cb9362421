//! Signal Implementation
//!
//! A Signal is the simplest observed value: one cell behind a single
//! `Value` key.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running effect, the runtime records the
//!    effect as a subscriber of `(signal, Value)`.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, the runtime triggers a `Set` on the same key.
//!
//! 3. Writes that store an equal value are not notifications.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A target id registered with its runtime
//! - A weak handle to the runtime
//! - The value behind a `RefCell`

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use crate::graph::{DepKey, TargetId, TargetShape, TrackOp, TriggerOp};

struct SignalInner<T> {
    target: TargetId,
    runtime: WeakRuntime,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_target(self.target);
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(rt: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                target: rt.register_target(TargetShape::Cell),
                runtime: rt.downgrade(),
                value: RefCell::new(value),
            }),
        }
    }

    /// The signal's graph target.
    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    pub(super) fn runtime(&self) -> Option<Runtime> {
        self.inner.runtime.upgrade()
    }

    fn track(&self) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.track(self.inner.target, TrackOp::Get, DepKey::Value);
        }
    }

    fn trigger(&self) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.trigger(self.inner.target, TriggerOp::Set, Some(DepKey::Value), None);
        }
    }

    /// Borrow the value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Mutate the value in place and notify subscribers unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.trigger();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .upgrade()
            .map_or(0, |rt| rt.subscriber_count(self.inner.target, &DepKey::Value))
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a running effect, this also registers the effect as
    /// a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Store a new value. Subscribers are notified only if it differs from
    /// the current one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.trigger();
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("target", &self.inner.target)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, vec![1]);
        signal.update(|v| v.push(2));
        assert_eq!(signal.get(), vec![1, 2]);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 1);
        let runs = Rc::new(Cell::new(0));

        let (s, r) = (signal.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            s.get();
            r.set(r.get() + 1);
        });

        signal.set(1);
        assert_eq!(runs.get(), 1);
        signal.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn subscriber_count_follows_effects() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        assert_eq!(signal.subscriber_count(), 0);

        let s = signal.clone();
        let effect = Effect::new(&rt, move || s.with(|v| *v));
        assert_eq!(signal.subscriber_count(), 1);

        effect.stop();
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = Signal::new(&rt, 0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.target(), signal2.target());
    }

    #[test]
    fn dropping_last_handle_forgets_target() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let other = Signal::new(&rt, 0);
        assert_eq!(rt.target_count(), 2);

        drop(signal);
        assert_eq!(rt.target_count(), 1);
        drop(other);
        assert_eq!(rt.target_count(), 0);
    }
}
