//! Component Mounting
//!
//! Glue between component instances and the reconciler: every instance
//! gets a lazy render effect whose scheduler enqueues an update job, and a
//! job that runs the effect.
//!
//! The render effect never returns errors directly. It records them on the
//! instance; whoever ran the effect (the initial mount, a parent-forced
//! update, or the scheduled job) picks the error up and propagates it, so
//! each failure is routed exactly once.

use std::rc::{Rc, Weak};

use super::host::{HostHandle, HostOps};
use super::renderer::{log_component, RendererCore};
use crate::error::{ErrorPhase, Result, RuntimeError};
use crate::reactive::{Effect, EffectOptions};
use crate::scheduler::Job;
use crate::vdom::{should_update_component, ComponentInstance, Lifecycle, NodeKind, VNode};

impl<H: HostOps + 'static> RendererCore<H> {
    pub(crate) fn process_component(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        match prev {
            None => self.mount_component(next, container, anchor),
            Some(prev) => self.update_component(prev, next),
        }
    }

    fn mount_component(
        &self,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        let NodeKind::Component(def) = &next.kind else {
            return Err(RuntimeError::InvalidReconciliationTarget {
                expected: "component",
                found: next.kind.name(),
            });
        };

        let instance = ComponentInstance::new(def, &self.runtime, &next.props);
        next.component = Some(Rc::clone(&instance));
        self.setup_render_effect(&instance, container, anchor)
    }

    fn setup_render_effect(
        &self,
        instance: &Rc<ComponentInstance>,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        instance.mount_target.set(Some((container, anchor)));

        let body = {
            let instance = Rc::downgrade(instance);
            let core: Weak<RendererCore<H>> = self.this.clone();
            move || {
                let (Some(instance), Some(core)) = (instance.upgrade(), core.upgrade()) else {
                    return;
                };
                if let Err(err) = core.render_component(&instance) {
                    instance.record_error(err);
                }
            }
        };

        let scheduler = {
            let instance = Rc::downgrade(instance);
            let runtime = self.runtime.downgrade();
            move || {
                let (Some(instance), Some(rt)) = (instance.upgrade(), runtime.upgrade()) else {
                    return;
                };
                if let Some(job) = instance.job() {
                    rt.enqueue_job(&job);
                }
            }
        };

        let effect = Effect::with_options(
            &self.runtime,
            body,
            EffectOptions::new()
                .lazy()
                .allow_recurse()
                .scheduler(scheduler),
        );

        let job = {
            let instance = Rc::downgrade(instance);
            Job::builder()
                .id(effect.id().raw() as i64)
                .allow_recurse(true)
                .phase(ErrorPhase::Render)
                .label(format!("{} render", instance_name(&instance)))
                .build(move || match instance.upgrade() {
                    Some(instance) if !instance.is_unmounted() => instance.run_update(),
                    _ => Ok(()),
                })
        };

        instance.install_update(effect, job);
        instance.run_update()
    }

    /// Body of a render effect: first mount or re-render.
    fn render_component(&self, instance: &Rc<ComponentInstance>) -> Result<()> {
        if !instance.is_mounted() {
            let (container, anchor) = instance
                .mount_target
                .take()
                .ok_or(RuntimeError::NotMounted { kind: "component" })?;

            let mut tree = instance.render_tree();
            let result = self.patch(None, &mut tree, container, anchor);
            *instance.sub_tree.borrow_mut() = Some(tree);
            instance.mark_mounted();
            log_component("mounted", instance.name(), instance.uid());
            result?;
            instance.queue_hooks(Lifecycle::Mounted);
            return Ok(());
        }

        let next_props = instance.next_props.borrow_mut().take();
        if let Some(next_props) = next_props {
            instance.update_props(&next_props);
            self.runtime.flush_pre_flush_cbs(instance.job().as_ref())?;
        }

        let mut next_tree = instance.render_tree();
        let prev_tree = instance.sub_tree.borrow_mut().take();
        let Some(mut prev_tree) = prev_tree else {
            return Err(RuntimeError::NotMounted { kind: "component" });
        };

        let container = prev_tree
            .el()
            .and_then(|el| self.host.parent(el))
            .ok_or(RuntimeError::NotMounted { kind: "component" });
        let result = container.and_then(|container| {
            let anchor = self.next_host_node(&prev_tree);
            self.patch(Some(&mut prev_tree), &mut next_tree, container, anchor)
        });

        match result {
            Ok(()) => {
                *instance.sub_tree.borrow_mut() = Some(next_tree);
                log_component("updated", instance.name(), instance.uid());
                instance.queue_hooks(Lifecycle::Updated);
                Ok(())
            }
            Err(err) => {
                // keep whichever tree holds the host state
                let keep = if next_tree.is_mounted() { next_tree } else { prev_tree };
                *instance.sub_tree.borrow_mut() = Some(keep);
                Err(err)
            }
        }
    }

    /// Parent re-render: re-render the child now if its props changed,
    /// otherwise just carry the instance over.
    fn update_component(&self, prev: &mut VNode, next: &mut VNode) -> Result<()> {
        Self::expect_same(prev, next)?;
        let instance = prev
            .component
            .clone()
            .ok_or(RuntimeError::NotMounted { kind: "component" })?;
        next.component = Some(Rc::clone(&instance));

        if !should_update_component(prev, next) {
            return Ok(());
        }

        *instance.next_props.borrow_mut() = Some(next.props.clone());
        if let Some(job) = instance.job() {
            // the queued run would repeat this one
            self.runtime.invalidate_job(&job);
        }
        instance.run_update()
    }

    pub(crate) fn unmount_component(
        &self,
        instance: &Rc<ComponentInstance>,
        do_remove: bool,
    ) -> Result<()> {
        instance.teardown();
        let sub_tree = instance.sub_tree.borrow_mut().take();
        let result = match sub_tree {
            Some(mut tree) => self.unmount(&mut tree, do_remove),
            None => Ok(()),
        };
        instance.queue_hooks(Lifecycle::Unmounted);
        log_component("unmounted", instance.name(), instance.uid());
        result
    }
}

fn instance_name(instance: &Weak<ComponentInstance>) -> String {
    instance
        .upgrade()
        .map_or_else(|| String::from("component"), |i| i.name().to_string())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::reactive::{ReactiveMap, Runtime, Signal};
    use crate::render::{MemoryHost, Renderer};
    use crate::vdom::{Component, PropValue, VNode};

    fn label(props: &ReactiveMap<PropValue>) -> String {
        props
            .get("label")
            .and_then(|p| p.as_data().and_then(|v| v.as_str().map(String::from)))
            .unwrap_or_default()
    }

    #[test]
    fn state_change_rerenders_on_flush() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        let count = Signal::new(&rt, 0);

        let c = count.clone();
        renderer
            .mount(root, move || VNode::element("b").text_content(c.get().to_string()))
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<b>0</b>");

        count.set(1);
        // re-render is batched until the flush
        assert_eq!(renderer.host().serialize(root), "<b>0</b>");
        assert!(rt.tick().unwrap());
        assert_eq!(renderer.host().serialize(root), "<b>1</b>");
    }

    #[test]
    fn parent_forces_child_update_once() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();

        let child_renders = Rc::new(Cell::new(0));
        let cr = child_renders.clone();
        let child = Component::new("child", move |_ctx| {
            let cr = cr.clone();
            move |props: &ReactiveMap<PropValue>| {
                cr.set(cr.get() + 1);
                VNode::element("span").text_content(label(props))
            }
        });

        let text = Signal::new(&rt, String::from("a"));
        let (t, def) = (text.clone(), child.clone());
        renderer
            .mount(root, move || {
                VNode::element("div").child(VNode::component(&def).prop("label", t.get()))
            })
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<div><span>a</span></div>");

        text.set("b".into());
        rt.flush().unwrap();
        assert_eq!(renderer.host().serialize(root), "<div><span>b</span></div>");
        assert_eq!(child_renders.get(), 2);
    }

    #[test]
    fn unchanged_props_skip_child_render() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();

        let child_renders = Rc::new(Cell::new(0));
        let cr = child_renders.clone();
        let child = Component::from_render("static", move || {
            cr.set(cr.get() + 1);
            VNode::text("static")
        });

        let tick = Signal::new(&rt, 0);
        let (t, def) = (tick.clone(), child.clone());
        renderer
            .mount(root, move || {
                VNode::fragment([VNode::text(t.get().to_string()), VNode::component(&def)])
            })
            .unwrap();

        tick.set(1);
        rt.flush().unwrap();
        assert_eq!(renderer.host().serialize(root), "1static");
        assert_eq!(child_renders.get(), 1);
    }

    #[test]
    fn lifecycle_hooks_run_after_flush() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let def = Component::new("hooks", move |ctx| {
            let (m, u) = (l.clone(), l.clone());
            ctx.on_mounted(move || m.borrow_mut().push("mounted"));
            ctx.on_unmounted(move || u.borrow_mut().push("unmounted"));
            |_props: &ReactiveMap<PropValue>| VNode::comment("c")
        });

        renderer.render(Some(VNode::component(&def)), root).unwrap();
        assert_eq!(*log.borrow(), vec!["mounted"]);
        renderer.render(None, root).unwrap();
        assert_eq!(*log.borrow(), vec!["mounted", "unmounted"]);
    }

    #[test]
    fn unmounted_component_stops_reacting() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        let count = Signal::new(&rt, 0);

        let c = count.clone();
        renderer
            .mount(root, move || VNode::text(c.get().to_string()))
            .unwrap();
        let instance = renderer
            .with_root(root, |tree| tree.and_then(|t| t.component_instance().cloned()))
            .unwrap();

        renderer.render(None, root).unwrap();
        assert!(instance.is_unmounted());
        count.set(5);
        assert!(!rt.is_flush_pending());
        assert_eq!(renderer.host().serialize(root), "");
        assert_eq!(instance.render_count(), 1);
    }
}
