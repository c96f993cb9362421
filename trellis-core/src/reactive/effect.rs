//! Effect Implementation
//!
//! An Effect wraps a computation so that every observed read performed
//! while it runs is recorded as a dependency.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately (unless it is
//!    lazy) to establish its initial dependencies.
//!
//! 2. Before every run, the effect removes itself from all dependency sets
//!    it joined last time, so branches that are no longer taken stop
//!    triggering it.
//!
//! 3. When a dependency changes, the effect either re-runs immediately or,
//!    if it has a scheduler, hands the re-run to the scheduler.
//!
//! # Re-entrancy
//!
//! An effect that is already running is not entered again unless it allows
//! recursion. The running effect is pushed on the tracking context for the
//! duration of the body by a scoped guard, so the stack stays balanced even
//! if the body panics.
//!
//! # Ownership
//!
//! Dependency sets only hold weak references. Dropping the last [`Effect`]
//! handle detaches the effect from the graph; keep the handle alive for as
//! long as the effect should react.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::debug;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{DebuggerEvent, EffectId, Subscriber};
use crate::graph::Dep;

/// Callback receiving debugger events.
pub type DebugHook = Rc<dyn Fn(&DebuggerEvent)>;

/// Options for [`Effect::with_options`].
///
/// # Example
///
/// ```rust,ignore
/// let options = EffectOptions::new()
///     .lazy()
///     .scheduler(move || runtime.enqueue_job(&job));
/// ```
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    computed: bool,
    allow_recurse: bool,
    scheduler: Option<Rc<dyn Fn()>>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
    on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run on creation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Let the effect re-enter itself and be triggered by its own writes.
    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }

    /// Called instead of re-running when a dependency changes.
    pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_track = Some(Rc::new(hook));
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_trigger = Some(Rc::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_stop = Some(Rc::new(hook));
        self
    }

    pub(crate) fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("allow_recurse", &self.allow_recurse)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner<T: 'static> {
    id: EffectId,
    runtime: WeakRuntime,
    body: Box<dyn Fn() -> T>,
    active: Cell<bool>,
    running: Cell<usize>,
    run_count: Cell<usize>,
    deps: RefCell<SmallVec<[Rc<Dep>; 4]>>,
    options: EffectOptions,
}

impl<T: 'static> EffectInner<T> {
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            dep.remove(self.id);
        }
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn allow_recurse(&self) -> bool {
        self.options.allow_recurse
    }

    fn add_dep(&self, dep: Rc<Dep>) {
        self.deps.borrow_mut().push(dep);
    }

    fn on_track(&self, event: &DebuggerEvent) {
        if let Some(hook) = &self.options.on_track {
            hook(event);
        }
    }

    fn is_computed(&self) -> bool {
        self.options.computed
    }

    fn notify(self: Rc<Self>, event: Option<&DebuggerEvent>) {
        // may have been stopped by an earlier subscriber of the same trigger
        if !self.active.get() {
            return;
        }
        if let (Some(hook), Some(event)) = (&self.options.on_trigger, event) {
            hook(event);
        }
        match &self.options.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                Effect { inner: self }.run();
            }
        }
    }

    fn stop(&self) {
        if !self.active.get() {
            return;
        }
        self.cleanup();
        if let Some(hook) = &self.options.on_stop {
            hook();
        }
        self.active.set(false);
        debug!(effect = %self.id, "effect stopped");
    }
}

impl<T: 'static> Drop for EffectInner<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Decrements the running depth when dropped.
struct RunningGuard<'a>(&'a Cell<usize>);

impl<'a> RunningGuard<'a> {
    fn new(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// A tracked computation.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let c = count.clone();
/// let effect = Effect::new(&rt, move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once.
    pub fn new<F>(rt: &Runtime, body: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(rt, body, EffectOptions::default())
    }

    /// Create an effect with explicit options.
    pub fn with_options<F>(rt: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let lazy = options.lazy;
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: rt.next_effect_id(),
                runtime: rt.downgrade(),
                body: Box::new(body),
                active: Cell::new(true),
                running: Cell::new(0),
                run_count: Cell::new(0),
                deps: RefCell::new(SmallVec::new()),
                options,
            }),
        };

        if !lazy {
            effect.run();
        }
        effect
    }

    /// Run the body, tracking its reads.
    ///
    /// Returns `None` when the run was skipped: the effect is already
    /// running and does not allow recursion, or it has been stopped and has
    /// a scheduler. A stopped effect without a scheduler still runs its body,
    /// untracked.
    pub fn run(&self) -> Option<T> {
        let inner = &self.inner;
        if !inner.active.get() {
            return match inner.options.scheduler {
                Some(_) => None,
                None => Some((inner.body)()),
            };
        }
        if inner.running.get() > 0 && !inner.options.allow_recurse {
            return None;
        }
        let Some(rt) = inner.runtime.upgrade() else {
            return Some((inner.body)());
        };

        inner.cleanup();
        let _running = RunningGuard::new(&inner.running);
        let _scope = rt.context().enter(inner.clone());
        inner.run_count.set(inner.run_count.get() + 1);
        Some((inner.body)())
    }

    /// Run the body without touching the graph.
    pub(crate) fn run_untracked(&self) -> T {
        (self.inner.body)()
    }

    /// Detach the effect from the graph permanently.
    pub fn stop(&self) {
        Subscriber::stop(&*self.inner);
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get() > 0
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dependency sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Type-erased handle for owners that only need to stop the effect.
    pub fn handle(&self) -> EffectHandle {
        EffectHandle {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Non-owning handle to an [`Effect`].
pub struct WeakEffect<T: 'static = ()> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Owning, type-erased effect handle.
#[derive(Clone)]
pub struct EffectHandle {
    inner: Rc<dyn Subscriber>,
}

impl EffectHandle {
    pub fn id(&self) -> EffectId {
        self.inner.id()
    }

    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectHandle").field(&self.inner.id()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TriggerOp;
    use crate::reactive::Signal;

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();

        let effect = Effect::new(&rt, move || r.set(r.get() + 1));

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn lazy_effect_does_not_run_on_creation() {
        let rt = Runtime::new();
        let effect = Effect::with_options(&rt, || 7, EffectOptions::new().lazy());

        assert_eq!(effect.run_count(), 0);
        assert_eq!(effect.run(), Some(7));
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_on_change() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let seen = Rc::new(Cell::new(-1));

        let (c, s) = (count.clone(), seen.clone());
        let _effect = Effect::new(&rt, move || s.set(c.get()));
        assert_eq!(seen.get(), 0);

        count.set(42);
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn stale_branch_is_dropped() {
        let rt = Runtime::new();
        let use_a = Signal::new(&rt, true);
        let a = Signal::new(&rt, 1);
        let b = Signal::new(&rt, 2);

        let (flag, a2, b2) = (use_a.clone(), a.clone(), b.clone());
        let effect = Effect::new(&rt, move || if flag.get() { a2.get() } else { b2.get() });
        assert_eq!(effect.dependency_count(), 2);

        use_a.set(false);
        assert_eq!(effect.run_count(), 2);

        a.set(10);
        assert_eq!(effect.run_count(), 2);

        b.set(20);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn stopped_effect_is_not_triggered() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let stopped = Rc::new(Cell::new(false));

        let c = count.clone();
        let s = stopped.clone();
        let effect = Effect::with_options(
            &rt,
            move || {
                c.get();
            },
            EffectOptions::new().on_stop(move || s.set(true)),
        );

        effect.stop();
        assert!(!effect.is_active());
        assert!(stopped.get());
        assert_eq!(effect.dependency_count(), 0);

        count.set(1);
        assert_eq!(effect.run_count(), 1);

        // Without a scheduler, a manual run still executes the body untracked.
        assert_eq!(effect.run(), Some(()));
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn stopped_effect_with_scheduler_skips() {
        let rt = Runtime::new();
        let effect = Effect::with_options(&rt, || 1, EffectOptions::new().scheduler(|| {}));
        effect.stop();
        assert_eq!(effect.run(), None);
    }

    #[test]
    fn effect_stopped_mid_trigger_is_skipped() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let victim: Rc<RefCell<Option<EffectHandle>>> = Rc::new(RefCell::new(None));

        let (c, v) = (count.clone(), victim.clone());
        let _stopper = Effect::new(&rt, move || {
            if c.get() == 1 {
                if let Some(handle) = v.borrow().as_ref() {
                    handle.stop();
                }
            }
        });

        let fired = Rc::new(Cell::new(0));
        let (c, f) = (count.clone(), fired.clone());
        let effect = Effect::with_options(
            &rt,
            move || c.get(),
            EffectOptions::new().scheduler(move || f.set(f.get() + 1)),
        );
        *victim.borrow_mut() = Some(effect.handle());

        count.set(1);
        assert!(!effect.is_active());
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let scheduled = Rc::new(Cell::new(0));

        let c = count.clone();
        let s = scheduled.clone();
        let effect = Effect::with_options(
            &rt,
            move || c.get(),
            EffectOptions::new().scheduler(move || s.set(s.get() + 1)),
        );

        count.set(1);
        count.set(2);
        assert_eq!(scheduled.get(), 2);
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.run(), Some(2));
    }

    #[test]
    fn self_write_does_not_retrigger() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);

        let c = count.clone();
        let effect = Effect::new(&rt, move || {
            let v = c.get();
            if v < 10 {
                c.set(v + 1);
            }
        });

        assert_eq!(effect.run_count(), 1);
        assert_eq!(count.get_untracked(), 1);
    }

    #[test]
    fn debugger_hooks_fire() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let tracked = Rc::new(RefCell::new(Vec::new()));
        let triggered = Rc::new(RefCell::new(Vec::new()));

        let c = count.clone();
        let (t1, t2) = (tracked.clone(), triggered.clone());
        let effect = Effect::with_options(
            &rt,
            move || c.get(),
            EffectOptions::new()
                .on_track(move |e| t1.borrow_mut().push(e.clone()))
                .on_trigger(move |e| t2.borrow_mut().push(e.clone())),
        );

        assert_eq!(tracked.borrow().len(), 1);
        assert_eq!(tracked.borrow()[0].effect, effect.id());
        assert_eq!(tracked.borrow()[0].target, count.target());

        count.set(3);
        let triggered = triggered.borrow();
        assert_eq!(triggered.len(), 1);
        assert_eq!(
            triggered[0].op,
            crate::reactive::DebugOp::Trigger(TriggerOp::Set)
        );
    }

    #[test]
    fn dropping_effect_detaches_it() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let runs = Rc::new(Cell::new(0));

        let (c, r) = (count.clone(), runs.clone());
        let effect = Effect::new(&rt, move || {
            c.get();
            r.set(r.get() + 1);
        });
        drop(effect);

        count.set(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn nested_effects_track_separately() {
        let rt = Runtime::new();
        let outer_src = Signal::new(&rt, 0);
        let inner_src = Signal::new(&rt, 0);
        let inner_slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let (o, i, slot, rt2) = (outer_src.clone(), inner_src.clone(), inner_slot.clone(), rt.clone());
        let outer = Effect::new(&rt, move || {
            o.get();
            if slot.borrow().is_none() {
                let i = i.clone();
                let inner = Effect::new(&rt2, move || {
                    i.get();
                });
                *slot.borrow_mut() = Some(inner);
            }
        });

        assert_eq!(outer.dependency_count(), 1);
        inner_src.set(1);
        assert_eq!(outer.run_count(), 1);
        let inner_runs = inner_slot.borrow().as_ref().map(Effect::run_count);
        assert_eq!(inner_runs, Some(2));
    }
}
