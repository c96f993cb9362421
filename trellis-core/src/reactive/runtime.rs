//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observed values,
//! effects and the scheduler. It owns the dependency graph, the tracking
//! context and the flush queues.
//!
//! # How It Works
//!
//! 1. When an observed wrapper is created, it registers a target with the
//!    runtime.
//!
//! 2. When an effect reads a wrapper, the runtime records the dependency in
//!    both directions: the effect joins the key's subscriber set, and the set
//!    is remembered by the effect for cleanup.
//!
//! 3. When a wrapper is written, the runtime:
//!    a. Resolves the write into the affected subscriber sets
//!    b. Skips the currently running effect unless it allows recursion
//!    c. Notifies computed values first, then everything else
//!    d. Each subscriber either hands itself to its scheduler or re-runs
//!
//! # Threading
//!
//! A runtime is single threaded (`!Send`). Independent runtimes do not share
//! any state and can coexist on the same thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{error, trace, warn};

use super::computed::Computed;
use super::context::{PauseScope, TrackingContext};
use super::effect::{Effect, EffectOptions};
use super::map::ReactiveMap;
use super::signal::Signal;
use super::vec::ReactiveVec;
use super::subscriber::{DebugOp, DebuggerEvent, EffectId, Subscriber};
use crate::config::RuntimeConfig;
use crate::error::{ErrorPhase, Result, RuntimeError};
use crate::graph::{DepGraph, DepKey, TargetId, TargetShape, TrackOp, TriggerOp};
use crate::scheduler::{Job, Scheduler};

/// Injected error handler. Returning `Ok` swallows the error, returning
/// `Err` re-raises it out of the current entry point.
pub type ErrorHandler = dyn Fn(&RuntimeError, ErrorPhase) -> Result<()>;

/// Injected warning sink.
pub type WarnHandler = dyn Fn(&RuntimeError);

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<DepGraph>,
    context: TrackingContext,
    scheduler: Scheduler,
    next_effect_id: Cell<u64>,
    next_target_id: Cell<u64>,
    error_handler: RefCell<Option<Rc<ErrorHandler>>>,
    warn_handler: RefCell<Option<Rc<WarnHandler>>>,
}

/// Handle to a reactive runtime.
///
/// Cloning the handle is cheap; all clones share one runtime.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let c = count.clone();
/// let _effect = rt.effect(move || println!("count is {}", c.get()));
///
/// count.set(1); // prints "count is 1"
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning handle to a runtime.
#[derive(Clone, Default)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new(config.recursion_limit);
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(DepGraph::new()),
                context: TrackingContext::new(),
                scheduler,
                next_effect_id: Cell::new(0),
                next_target_id: Cell::new(0),
                error_handler: RefCell::new(None),
                warn_handler: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn context(&self) -> &TrackingContext {
        &self.inner.context
    }

    pub(crate) fn next_effect_id(&self) -> EffectId {
        let id = self.inner.next_effect_id.get();
        self.inner.next_effect_id.set(id + 1);
        EffectId::from_raw(id)
    }

    // ------------------------------------------------------------------
    // Dependency graph
    // ------------------------------------------------------------------

    /// Register a new observed target.
    pub fn register_target(&self, shape: TargetShape) -> TargetId {
        let raw = self.inner.next_target_id.get();
        self.inner.next_target_id.set(raw + 1);
        let id = TargetId::from_raw(raw);
        self.inner.graph.borrow_mut().register(id, shape);
        id
    }

    /// Drop every dependency entry of a target.
    pub fn forget_target(&self, target: TargetId) {
        self.inner.graph.borrow_mut().forget(target);
    }

    /// Number of targets with graph entries.
    pub fn target_count(&self) -> usize {
        self.inner.graph.borrow().target_count()
    }

    /// Number of keys with a dependency set on a target.
    pub fn tracked_keys(&self, target: TargetId) -> usize {
        self.inner.graph.borrow().key_count(target)
    }

    /// Number of subscribers recorded for one key of a target.
    pub fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.inner.graph.borrow().subscriber_count(target, key)
    }

    /// Record that the running effect read `key` of `target`.
    ///
    /// Does nothing while tracking is paused or outside of an effect.
    pub fn track(&self, target: TargetId, op: TrackOp, key: DepKey) {
        let context = &self.inner.context;
        if !context.is_tracking() {
            return;
        }
        let Some(effect) = context.active_effect() else {
            return;
        };

        let dep = self.inner.graph.borrow_mut().dep_for(target, &key);
        if dep.insert(effect.id(), Rc::downgrade(&effect)) {
            trace!(effect = %effect.id(), %target, %key, "track");
            effect.add_dep(dep);
            if self.inner.config.debug_hooks {
                effect.on_track(&DebuggerEvent {
                    effect: effect.id(),
                    target,
                    op: DebugOp::Track(op),
                    key: Some(key),
                });
            }
        }
    }

    /// Notify the subscribers affected by a write to `target`.
    ///
    /// `new_length` is the length after the write when `key` is
    /// [`DepKey::Length`].
    pub fn trigger(
        &self,
        target: TargetId,
        op: TriggerOp,
        key: Option<DepKey>,
        new_length: Option<usize>,
    ) {
        let deps = self
            .inner
            .graph
            .borrow()
            .resolve(target, op, key.as_ref(), new_length);
        if deps.is_empty() {
            return;
        }

        let active = self.inner.context.active_effect().map(|effect| effect.id());
        let mut computed: IndexMap<EffectId, Rc<dyn Subscriber>> = IndexMap::new();
        let mut effects: IndexMap<EffectId, Rc<dyn Subscriber>> = IndexMap::new();
        for dep in &deps {
            for subscriber in dep.live() {
                let id = subscriber.id();
                if Some(id) == active && !subscriber.allow_recurse() {
                    continue;
                }
                if subscriber.is_computed() {
                    computed.entry(id).or_insert(subscriber);
                } else {
                    effects.entry(id).or_insert(subscriber);
                }
            }
        }

        trace!(
            %target,
            ?op,
            key = ?key,
            computed = computed.len(),
            effects = effects.len(),
            "trigger"
        );

        let debug = self.inner.config.debug_hooks;
        for (id, subscriber) in computed.into_iter().chain(effects) {
            let event = debug.then(|| DebuggerEvent {
                effect: id,
                target,
                op: DebugOp::Trigger(op),
                key: key.clone(),
            });
            subscriber.notify(event.as_ref());
        }
    }

    /// The id of the innermost running effect.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.context.active_effect().map(|effect| effect.id())
    }

    /// Whether a read right now would be recorded.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Suspend tracking until the matching [`reset_tracking`](Self::reset_tracking).
    pub fn pause_tracking(&self) {
        self.inner.context.pause();
    }

    /// Force tracking on until the matching [`reset_tracking`](Self::reset_tracking).
    pub fn enable_tracking(&self) {
        self.inner.context.enable();
    }

    /// Restore the tracking state saved by the last pause or enable.
    pub fn reset_tracking(&self) {
        self.inner.context.reset();
    }

    /// Run `f` with tracking paused.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = PauseScope::new(&self.inner.context);
        f()
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Create a [`Signal`] owned by this runtime.
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new(self, value)
    }

    /// Create and run an [`Effect`].
    pub fn effect<T: 'static>(&self, body: impl Fn() -> T + 'static) -> Effect<T> {
        Effect::new(self, body)
    }

    /// Create an [`Effect`] with options.
    pub fn effect_with<T: 'static>(
        &self,
        body: impl Fn() -> T + 'static,
        options: EffectOptions,
    ) -> Effect<T> {
        Effect::with_options(self, body, options)
    }

    /// Create a read-only [`Computed`].
    pub fn computed<T: Clone + 'static>(&self, getter: impl Fn() -> T + 'static) -> Computed<T> {
        Computed::new(self, getter)
    }

    pub fn reactive_map<V: 'static>(&self) -> ReactiveMap<V> {
        ReactiveMap::new(self)
    }

    pub fn reactive_vec<T: Clone + PartialEq + 'static>(&self, items: Vec<T>) -> ReactiveVec<T> {
        ReactiveVec::from_vec(self, items)
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// Queue a job for the next flush.
    pub fn enqueue_job(&self, job: &Job) -> bool {
        self.inner.scheduler.queue_job(job)
    }

    /// Withdraw a queued job that has not started yet.
    pub fn invalidate_job(&self, job: &Job) {
        self.inner.scheduler.invalidate_job(job);
    }

    pub fn queue_pre_flush(&self, cb: &Job) {
        self.inner.scheduler.queue_pre_flush(cb);
    }

    pub fn queue_post_flush(&self, cb: &Job) {
        self.inner.scheduler.queue_post_flush(cb);
    }

    pub fn queue_post_flush_all(&self, cbs: impl IntoIterator<Item = Job>) {
        self.inner.scheduler.queue_post_flush_all(cbs);
    }

    /// Drain pending pre-flush callbacks now.
    pub fn flush_pre_flush_cbs(&self, parent: Option<&Job>) -> Result<()> {
        self.inner.scheduler.flush_pre_flush_cbs(self, parent)
    }

    /// Drain pending post-flush callbacks now.
    pub fn flush_post_flush_cbs(&self) -> Result<()> {
        self.inner.scheduler.flush_post_flush_cbs(self)
    }

    /// Microtask checkpoint. Runs the pending flush, if one is scheduled,
    /// and reports whether it did.
    pub fn tick(&self) -> Result<bool> {
        self.inner.scheduler.tick(self)
    }

    /// Run a flush now, whether or not one is scheduled. Does nothing when
    /// called from inside a flush.
    pub fn flush(&self) -> Result<()> {
        if self.inner.scheduler.is_flushing() {
            return Ok(());
        }
        self.inner.scheduler.flush_jobs(self)
    }

    pub fn is_flush_pending(&self) -> bool {
        self.inner.scheduler.is_flush_pending()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.scheduler.is_flushing()
    }

    /// Number of live jobs in the main queue.
    pub fn queued_jobs(&self) -> usize {
        self.inner.scheduler.queued_jobs()
    }

    /// Resolves once the pending flush has completed, or immediately if
    /// nothing is pending.
    pub fn next_flush_settled(&self) -> impl Future<Output = ()> + 'static {
        self.inner.scheduler.next_flush_settled()
    }

    // ------------------------------------------------------------------
    // Errors and warnings
    // ------------------------------------------------------------------

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&RuntimeError, ErrorPhase) -> Result<()> + 'static,
    {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn clear_error_handler(&self) {
        self.inner.error_handler.borrow_mut().take();
    }

    pub fn set_warn_handler<F>(&self, handler: F)
    where
        F: Fn(&RuntimeError) + 'static,
    {
        *self.inner.warn_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Route an error raised in `phase`.
    ///
    /// Fatal errors always propagate. Others go to the injected handler, or
    /// propagate when none is installed.
    pub fn handle_error(&self, err: RuntimeError, phase: ErrorPhase) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        let handler = self.inner.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(&err, phase),
            None => {
                error!(%phase, error = %err, "unhandled runtime error");
                Err(err)
            }
        }
    }

    /// Report a diagnostic to the warning sink.
    pub fn warn(&self, warning: &RuntimeError) {
        let handler = self.inner.warn_handler.borrow().clone();
        match handler {
            Some(handler) => handler(warning),
            None => warn!("{warning}"),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("targets", &self.target_count())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}
