//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes plain effects, the effects behind computed values, and
//! component render effects.

use std::fmt;
use std::rc::Rc;

use crate::graph::{Dep, DepKey, TargetId, TrackOp, TriggerOp};

/// Unique identifier for an effect.
///
/// Ids are handed out by a runtime from a monotonic counter, so an effect
/// created earlier always has a smaller id. The scheduler relies on this to
/// run parent render jobs before child render jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// What happened to a dependency, as reported to debugger hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Payload of the `on_track` and `on_trigger` hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub target: TargetId,
    pub op: DebugOp,
    pub key: Option<DepKey>,
}

/// A computation that can be notified when its dependencies change.
///
/// The dependency graph only ever sees subscribers through this trait, held
/// as `Weak<dyn Subscriber>`.
pub trait Subscriber {
    /// The subscriber's id.
    fn id(&self) -> EffectId;

    /// Whether a trigger fired while this subscriber runs may notify it.
    fn allow_recurse(&self) -> bool;

    /// Record the reverse edge of a freshly tracked dependency.
    fn add_dep(&self, dep: Rc<Dep>);

    /// Called when a tracked dependency is recorded, if debug hooks are on.
    fn on_track(&self, _event: &DebuggerEvent) {}

    /// Computed subscribers are notified before plain effects so that an
    /// effect re-running synchronously never reads a stale cached value.
    fn is_computed(&self) -> bool {
        false
    }

    /// React to a change of one of the dependencies.
    ///
    /// Subscribers with a scheduler hand themselves to it; others re-run
    /// immediately.
    fn notify(self: Rc<Self>, event: Option<&DebuggerEvent>);

    /// Detach from every dependency and never run tracked again.
    fn stop(&self);
}
