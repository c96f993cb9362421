//! Components
//!
//! A [`Component`] is a definition: a name plus a setup function. Mounting
//! a component node creates a [`ComponentInstance`], runs setup once, and
//! drives the returned render function from a render effect.
//!
//! # How Components Update
//!
//! 1. The render effect reads reactive state while rendering. When that
//!    state changes, the effect does not re-render inline. Its scheduler
//!    enqueues the instance's update job, ordered by the effect id so that
//!    parents (created first) re-render before their children.
//!
//! 2. When a parent re-renders and passes different props, it withdraws
//!    the child's queued job and runs the child's update synchronously.
//!    The child writes the new props into its reactive prop map and drains
//!    pending pre-flush callbacks before rendering.
//!
//! 3. Effects and computed values created through the [`SetupContext`]
//!    belong to the instance and stop when it unmounts.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::node::{PropValue, Props, VNode};
use crate::error::{Result, RuntimeError};
use crate::reactive::{
    Computed, Effect, EffectHandle, EffectOptions, ReactiveMap, Runtime, WeakRuntime,
};
use crate::render::HostHandle;
use crate::scheduler::Job;

/// Render function returned by setup.
pub type RenderFn = Box<dyn Fn(&ReactiveMap<PropValue>) -> VNode>;

type SetupFn = Box<dyn Fn(&SetupContext<'_>) -> RenderFn>;

type Hook = Rc<dyn Fn()>;

fn next_uid() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A component definition.
///
/// # Example
///
/// ```rust,ignore
/// let counter = Component::new("counter", |ctx| {
///     let count = ctx.runtime().signal(0);
///     move |_props| VNode::element("span").text_content(count.get().to_string())
/// });
/// renderer.render(Some(VNode::component(&counter)), root)?;
/// ```
pub struct Component {
    name: Cow<'static, str>,
    setup: SetupFn,
}

impl Component {
    pub fn new<S, R>(name: impl Into<Cow<'static, str>>, setup: S) -> Rc<Self>
    where
        S: Fn(&SetupContext<'_>) -> R + 'static,
        R: Fn(&ReactiveMap<PropValue>) -> VNode + 'static,
    {
        Rc::new(Self {
            name: name.into(),
            setup: Box::new(move |ctx: &SetupContext<'_>| -> RenderFn { Box::new(setup(ctx)) }),
        })
    }

    /// A component with no setup state whose render reads nothing but
    /// reactive state it captured.
    pub fn from_render(
        name: impl Into<Cow<'static, str>>,
        render: impl Fn() -> VNode + 'static,
    ) -> Rc<Self> {
        let render: Rc<dyn Fn() -> VNode> = Rc::new(render);
        Self::new(name, move |_ctx| {
            let render = Rc::clone(&render);
            move |_props: &ReactiveMap<PropValue>| render()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

#[derive(Default)]
struct LifecycleHooks {
    mounted: Vec<Hook>,
    updated: Vec<Hook>,
    unmounted: Vec<Hook>,
}

/// Which lifecycle hooks to queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Mounted,
    Updated,
    Unmounted,
}

/// Passed to a component's setup function.
pub struct SetupContext<'a> {
    runtime: &'a Runtime,
    props: &'a ReactiveMap<PropValue>,
    effects: RefCell<Vec<EffectHandle>>,
    hooks: RefCell<LifecycleHooks>,
}

impl SetupContext<'_> {
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// The instance's props. Reads are tracked like any reactive map.
    pub fn props(&self) -> &ReactiveMap<PropValue> {
        self.props
    }

    /// Create an effect owned by the instance.
    pub fn effect<T: 'static>(&self, body: impl Fn() -> T + 'static) -> Effect<T> {
        self.effect_with(body, EffectOptions::new())
    }

    pub fn effect_with<T: 'static>(
        &self,
        body: impl Fn() -> T + 'static,
        options: EffectOptions,
    ) -> Effect<T> {
        let effect = Effect::with_options(self.runtime, body, options);
        self.effects.borrow_mut().push(effect.handle());
        effect
    }

    /// Create a computed value owned by the instance.
    pub fn computed<T: Clone + 'static>(&self, getter: impl Fn() -> T + 'static) -> Computed<T> {
        let computed = Computed::new(self.runtime, getter);
        self.effects.borrow_mut().push(computed.effect().handle());
        computed
    }

    /// Run after the first render is in the host tree.
    pub fn on_mounted(&self, hook: impl Fn() + 'static) {
        self.hooks.borrow_mut().mounted.push(Rc::new(hook));
    }

    /// Run after every re-render is in the host tree.
    pub fn on_updated(&self, hook: impl Fn() + 'static) {
        self.hooks.borrow_mut().updated.push(Rc::new(hook));
    }

    /// Run after the instance was torn down.
    pub fn on_unmounted(&self, hook: impl Fn() + 'static) {
        self.hooks.borrow_mut().unmounted.push(Rc::new(hook));
    }
}

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    def: Rc<Component>,
    runtime: WeakRuntime,
    props: ReactiveMap<PropValue>,
    render: RenderFn,
    scope: Vec<EffectHandle>,
    hooks: LifecycleHooks,

    pub(crate) sub_tree: RefCell<Option<VNode>>,
    update: RefCell<Option<(Effect, Job)>>,
    pub(crate) next_props: RefCell<Option<Props>>,
    pub(crate) mount_target: Cell<Option<(HostHandle, Option<HostHandle>)>>,
    pending_error: RefCell<Option<RuntimeError>>,

    is_mounted: Cell<bool>,
    is_unmounted: Cell<bool>,
    render_count: Cell<usize>,
}

impl ComponentInstance {
    /// Instantiate `def` and run its setup with tracking paused.
    pub(crate) fn new(def: &Rc<Component>, rt: &Runtime, props: &Props) -> Rc<Self> {
        let reactive_props =
            ReactiveMap::from_entries(rt, props.iter().map(|(k, v)| (k.clone(), v.clone())));

        let ctx = SetupContext {
            runtime: rt,
            props: &reactive_props,
            effects: RefCell::new(Vec::new()),
            hooks: RefCell::new(LifecycleHooks::default()),
        };
        let render = rt.untracked(|| (def.setup)(&ctx));
        let scope = ctx.effects.into_inner();
        let hooks = ctx.hooks.into_inner();

        Rc::new(Self {
            uid: next_uid(),
            def: Rc::clone(def),
            runtime: rt.downgrade(),
            props: reactive_props,
            render,
            scope,
            hooks,
            sub_tree: RefCell::new(None),
            update: RefCell::new(None),
            next_props: RefCell::new(None),
            mount_target: Cell::new(None),
            pending_error: RefCell::new(None),
            is_mounted: Cell::new(false),
            is_unmounted: Cell::new(false),
            render_count: Cell::new(0),
        })
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn definition(&self) -> &Rc<Component> {
        &self.def
    }

    pub fn props(&self) -> &ReactiveMap<PropValue> {
        &self.props
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.get()
    }

    /// Set once the instance was torn down; asynchronous work holding the
    /// instance should check it before touching the tree.
    pub fn is_unmounted(&self) -> bool {
        self.is_unmounted.get()
    }

    /// How many times the render function ran.
    pub fn render_count(&self) -> usize {
        self.render_count.get()
    }

    /// First host node of the current render output.
    pub fn host_el(&self) -> Option<HostHandle> {
        self.sub_tree.borrow().as_ref().and_then(VNode::el)
    }

    /// Queue a re-render for the next flush.
    pub fn schedule_update(&self) -> bool {
        match (self.job(), self.runtime.upgrade()) {
            (Some(job), Some(rt)) if !self.is_unmounted.get() => rt.enqueue_job(&job),
            _ => false,
        }
    }

    pub(crate) fn job(&self) -> Option<Job> {
        self.update.borrow().as_ref().map(|(_, job)| job.clone())
    }

    pub(crate) fn install_update(&self, effect: Effect, job: Job) {
        *self.update.borrow_mut() = Some((effect, job));
    }

    /// Run the render effect now and surface any error it recorded.
    pub(crate) fn run_update(&self) -> Result<()> {
        let effect = self.update.borrow().as_ref().map(|(effect, _)| effect.clone());
        if let Some(effect) = effect {
            effect.run();
        }
        match self.pending_error.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn record_error(&self, err: RuntimeError) {
        *self.pending_error.borrow_mut() = Some(err);
    }

    pub(crate) fn render_tree(&self) -> VNode {
        self.render_count.set(self.render_count.get() + 1);
        (self.render)(&self.props)
    }

    pub(crate) fn mark_mounted(&self) {
        self.is_mounted.set(true);
    }

    /// Write parent-supplied props into the reactive prop map.
    pub(crate) fn update_props(&self, next: &Props) {
        let apply = || {
            for (key, value) in next {
                self.props.insert(key.clone(), value.clone());
            }
            for key in self.props.keys() {
                if !next.contains_key(&key) {
                    self.props.remove(&key);
                }
            }
        };
        match self.runtime.upgrade() {
            Some(rt) => rt.untracked(apply),
            None => apply(),
        }
    }

    /// Stop every effect of the instance and withdraw its queued update.
    pub(crate) fn teardown(&self) {
        for effect in &self.scope {
            effect.stop();
        }
        if let Some((effect, job)) = self.update.borrow().as_ref() {
            effect.stop();
            if let Some(rt) = self.runtime.upgrade() {
                rt.invalidate_job(job);
            }
        }
        self.is_unmounted.set(true);
        debug!(component = %self.name(), uid = self.uid, "component torn down");
    }

    /// Queue the hooks for `stage` as post-flush callbacks.
    pub(crate) fn queue_hooks(&self, stage: Lifecycle) {
        let hooks = match stage {
            Lifecycle::Mounted => &self.hooks.mounted,
            Lifecycle::Updated => &self.hooks.updated,
            Lifecycle::Unmounted => &self.hooks.unmounted,
        };
        let Some(rt) = self.runtime.upgrade() else {
            return;
        };
        for hook in hooks {
            let hook = Rc::clone(hook);
            let label = format!("{} {:?} hook", self.name(), stage);
            rt.queue_post_flush(&Job::builder().label(label).build(move || {
                hook();
                Ok(())
            }));
        }
    }
}

/// Whether a parent re-render must re-render the child.
pub(crate) fn should_update_component(prev: &VNode, next: &VNode) -> bool {
    prev.props != next.props
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name())
            .field("uid", &self.uid)
            .field("is_mounted", &self.is_mounted.get())
            .field("is_unmounted", &self.is_unmounted.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
