//! Reactive Context
//!
//! The reactive context tracks which effect is currently running and whether
//! reads should be recorded at all. This is what makes dependency tracking
//! automatic: when a wrapper is read, the runtime asks the context who is
//! reading.
//!
//! # Implementation
//!
//! Each runtime owns one context. Running an effect pushes it onto the
//! effect stack and enables tracking; the returned [`EffectScope`] guard pops
//! both when dropped, even if the effect body panics.
//!
//! Tracking can be suspended independently with [`TrackingContext::pause`].
//! Pause and enable push the previous state onto a second stack, and
//! [`TrackingContext::reset`] restores it, so suspensions nest.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscriber::{EffectId, Subscriber};

/// Per-runtime tracking state.
pub(crate) struct TrackingContext {
    effect_stack: RefCell<Vec<Rc<dyn Subscriber>>>,
    should_track: Cell<bool>,
    track_stack: RefCell<Vec<bool>>,
}

impl TrackingContext {
    pub fn new() -> Self {
        Self {
            effect_stack: RefCell::new(Vec::new()),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
        }
    }

    /// Enter the scope of a running effect.
    ///
    /// The effect is current until the returned guard is dropped.
    pub fn enter(&self, effect: Rc<dyn Subscriber>) -> EffectScope<'_> {
        let id = effect.id();
        self.enable();
        self.effect_stack.borrow_mut().push(effect);
        EffectScope { context: self, id }
    }

    /// The innermost running effect.
    pub fn active_effect(&self) -> Option<Rc<dyn Subscriber>> {
        self.effect_stack.borrow().last().cloned()
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.should_track.get() && !self.effect_stack.borrow().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.effect_stack.borrow().len()
    }

    pub fn pause(&self) {
        self.track_stack.borrow_mut().push(self.should_track.get());
        self.should_track.set(false);
    }

    pub fn enable(&self) {
        self.track_stack.borrow_mut().push(self.should_track.get());
        self.should_track.set(true);
    }

    pub fn reset(&self) {
        let last = self.track_stack.borrow_mut().pop();
        self.should_track.set(last.unwrap_or(true));
    }
}

/// Guard that pops the running effect when dropped.
pub(crate) struct EffectScope<'a> {
    context: &'a TrackingContext,
    id: EffectId,
}

impl Drop for EffectScope<'_> {
    fn drop(&mut self) {
        let popped = self.context.effect_stack.borrow_mut().pop();
        self.context.reset();

        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.id,
                "EffectScope mismatch: expected {:?}, got {:?}",
                self.id,
                effect.id()
            );
        }
    }
}

/// Guard that resumes tracking when dropped. See [`Runtime::untracked`].
///
/// [`Runtime::untracked`]: super::Runtime::untracked
pub(crate) struct PauseScope<'a> {
    context: &'a TrackingContext,
}

impl<'a> PauseScope<'a> {
    pub fn new(context: &'a TrackingContext) -> Self {
        context.pause();
        Self { context }
    }
}

impl Drop for PauseScope<'_> {
    fn drop(&mut self) {
        self.context.reset();
    }
}
