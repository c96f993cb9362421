//! Computed Values
//!
//! A Computed is a derived value that caches its result and re-evaluates
//! only when it is read after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect; nothing is computed on creation.
//!
//! 2. Reading the value while dirty runs the effect once and caches the
//!    result. Reading it while clean returns the cache.
//!
//! 3. When a dependency changes, the effect's scheduler does not recompute.
//!    It marks the value dirty and triggers the computed's own `Value` key,
//!    so effects that read the computed are invalidated in turn.
//!
//! Each invalidation therefore costs at most one getter call, and none at
//! all if nobody reads the value again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, WeakRuntime};
use crate::error::RuntimeError;
use crate::graph::{DepKey, TargetId, TargetShape, TrackOp, TriggerOp};

struct ComputedInner<T: 'static> {
    target: TargetId,
    runtime: WeakRuntime,
    effect: Effect<T>,
    dirty: Rc<Cell<bool>>,
    value: RefCell<Option<T>>,
    setter: Option<Box<dyn Fn(T)>>,
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_target(self.target);
        }
    }
}

/// A cached, lazily re-evaluated derived value.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 1);
///
/// let c = count.clone();
/// let doubled = Computed::new(&rt, move || c.get() * 2);
///
/// assert_eq!(doubled.get(), 2);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a read-only computed value.
    pub fn new<F>(rt: &Runtime, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(rt, getter, None)
    }

    /// Create a computed value whose writes are forwarded to `setter`.
    pub fn writable<F, S>(rt: &Runtime, getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(rt, getter, Some(Box::new(setter)))
    }

    fn build<F>(rt: &Runtime, getter: F, setter: Option<Box<dyn Fn(T)>>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let target = rt.register_target(TargetShape::Cell);
        let dirty = Rc::new(Cell::new(true));

        let scheduler = {
            let dirty = dirty.clone();
            let runtime = rt.downgrade();
            move || {
                if dirty.get() {
                    return;
                }
                dirty.set(true);
                if let Some(rt) = runtime.upgrade() {
                    rt.trigger(target, TriggerOp::Set, Some(DepKey::Value), None);
                }
            }
        };

        let effect = Effect::with_options(
            rt,
            getter,
            EffectOptions::new().lazy().computed().scheduler(scheduler),
        );

        Self {
            inner: Rc::new(ComputedInner {
                target,
                runtime: rt.downgrade(),
                effect,
                dirty,
                value: RefCell::new(None),
                setter,
            }),
        }
    }

    /// Get the value, recomputing it first if it is dirty.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        if inner.dirty.get() {
            let fresh = match inner.effect.run() {
                Some(value) => value,
                None => inner.effect.run_untracked(),
            };
            *inner.value.borrow_mut() = Some(fresh);
            inner.dirty.set(false);
        }

        if let Some(rt) = inner.runtime.upgrade() {
            rt.track(inner.target, TrackOp::Get, DepKey::Value);
        }

        let cached = inner.value.borrow().clone();
        match cached {
            Some(value) => value,
            None => inner.effect.run_untracked(),
        }
    }

    /// Write through the setter. Writing a read-only computed reports
    /// [`RuntimeError::ReadonlyComputed`] to the warning sink and is ignored.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => {
                if let Some(rt) = self.inner.runtime.upgrade() {
                    rt.warn(&RuntimeError::ReadonlyComputed);
                }
            }
        }
    }
}

impl<T: 'static> Computed<T> {
    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// The effect driving the getter.
    pub fn effect(&self) -> &Effect<T> {
        &self.inner.effect
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("dirty", &self.inner.dirty.get())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
