//! Reactive Primitives
//!
//! This module implements the core reactive system: observed values,
//! effects and computed values, all coordinated by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Observed values
//!
//! [`Signal`], [`ReactiveMap`] and [`ReactiveVec`] wrap plain data. Their
//! accessors record reads into the dependency graph and their mutators
//! trigger the effects that read the changed keys.
//!
//! [`ReadonlySignal`] and [`ReadonlyMap`] are views over the same state.
//! Reads track as usual; writes are reported to the warning sink and
//! dropped.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation whose reads are tracked. When one of them
//! changes, the effect re-runs, or hands itself to its scheduler.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazy effect with a cached result. Invalidation only
//! marks it dirty; the getter runs again on the next read.
//!
//! # Implementation Notes
//!
//! Everything here is single threaded and owned by an explicit runtime
//! handle rather than global state, so independent runtimes can coexist.
//! The dependency graph holds effects weakly: an effect lives exactly as
//! long as some [`Effect`] handle does.

mod computed;
mod context;
mod effect;
mod map;
mod readonly;
mod runtime;
mod signal;
mod subscriber;
mod vec;

pub use computed::Computed;
pub use effect::{DebugHook, Effect, EffectHandle, EffectOptions, WeakEffect};
pub use map::ReactiveMap;
pub use readonly::{ReadonlyMap, ReadonlySignal};
pub use runtime::{ErrorHandler, Runtime, WarnHandler, WeakRuntime};
pub use signal::Signal;
pub use subscriber::{DebugOp, DebuggerEvent, EffectId, Subscriber};
pub use vec::ReactiveVec;
