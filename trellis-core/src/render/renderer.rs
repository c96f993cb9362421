//! Renderer
//!
//! The renderer turns render trees into host mutations. It owns a host,
//! remembers the last tree rendered into each container, and patches new
//! trees against old ones.
//!
//! # How Patching Works
//!
//! `patch(prev, next, container, anchor)` dispatches on the kind of
//! `next`:
//!
//! 1. Without a previous node, `next` is mounted: host nodes are created,
//!    filled and inserted before `anchor`.
//!
//! 2. When `prev` is not diff-compatible with `next`, `prev` is unmounted
//!    first and `next` mounted in the position `prev` occupied.
//!
//! 3. Otherwise `next` takes over `prev`'s host nodes and only the
//!    differences are written.
//!
//! After every patch the node's ref binding is refreshed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::host::{HostHandle, HostOps};
use crate::error::{ErrorPhase, Result, RuntimeError};
use crate::reactive::Runtime;
use crate::scheduler::Job;
use crate::vdom::{
    Children, Component, NodeKind, NodeRef, PatchFlags, Props, RefTarget, RendererInternals,
    VNode,
};

/// Post-flush id for ref updates; they run before other post callbacks.
const REF_JOB_ID: i64 = -1;

/// Renders trees into containers of a host.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let renderer = Renderer::new(&rt, MemoryHost::new());
/// let root = renderer.host().create_root();
///
/// renderer.render(Some(VNode::element("p").text_content("one")), root)?;
/// renderer.render(Some(VNode::element("p").text_content("two")), root)?;
/// renderer.render(None, root)?;
/// ```
pub struct Renderer<H: HostOps + 'static> {
    core: Rc<RendererCore<H>>,
}

impl<H: HostOps + 'static> Renderer<H> {
    pub fn new(rt: &Runtime, host: H) -> Self {
        Self {
            core: Rc::new_cyclic(|this| RendererCore {
                host,
                runtime: rt.clone(),
                roots: RefCell::new(HashMap::new()),
                this: this.clone(),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.core.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.core.runtime
    }

    /// Render `tree` into `container`, patching against whatever was
    /// rendered there before. `None` unmounts the previous tree.
    ///
    /// Failures are routed through the runtime's error handler; they
    /// surface here only if the handler re-raises or none is installed.
    /// Post-flush callbacks (ref updates, lifecycle hooks) run before
    /// returning.
    pub fn render(&self, tree: Option<VNode>, container: HostHandle) -> Result<()> {
        let core = &self.core;
        let prev = core.roots.borrow_mut().remove(&container);

        let result = match (prev, tree) {
            (None, None) => Ok(()),
            (Some(mut prev), None) => core.unmount(&mut prev, true),
            (mut prev, Some(mut next)) => {
                let result = core.patch(prev.as_mut(), &mut next, container, None);
                core.roots.borrow_mut().insert(container, next);
                result
            }
        };

        if let Err(err) = result {
            core.runtime.handle_error(err, ErrorPhase::Render)?;
        }
        core.runtime.flush_post_flush_cbs()
    }

    /// Mount a reactive root: `render` runs inside a render effect and the
    /// container is re-patched whenever state it read changes.
    pub fn mount(&self, container: HostHandle, render: impl Fn() -> VNode + 'static) -> Result<()> {
        let root = Component::from_render("root", render);
        self.render(Some(VNode::component(&root)), container)
    }

    /// Run `f` with the tree currently rendered into `container`.
    pub fn with_root<R>(&self, container: HostHandle, f: impl FnOnce(Option<&VNode>) -> R) -> R {
        f(self.core.roots.borrow().get(&container))
    }

    /// Patch without routing errors or draining post-flush callbacks.
    pub fn patch(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        self.core.patch(prev, next, container, anchor)
    }

    /// Unmount and remove a tree patched with [`Renderer::patch`].
    pub fn unmount(&self, node: &mut VNode) -> Result<()> {
        self.core.unmount(node, true)
    }

    pub fn internals(&self) -> &dyn RendererInternals {
        &*self.core
    }
}

impl<H: HostOps + fmt::Debug + 'static> fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("host", &self.core.host)
            .field("roots", &self.core.roots.borrow().len())
            .finish()
    }
}

/// Shared state behind a [`Renderer`]. Render effects of components hold a
/// weak reference to it.
pub(crate) struct RendererCore<H: HostOps + 'static> {
    pub(crate) host: H,
    pub(crate) runtime: Runtime,
    roots: RefCell<HashMap<HostHandle, VNode>>,
    pub(crate) this: Weak<RendererCore<H>>,
}

impl<H: HostOps + 'static> RendererCore<H> {
    pub(crate) fn patch(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        let mut anchor = anchor;
        let prev = match prev {
            Some(prev) if !prev.is_same_type(next) => {
                anchor = self.next_host_node(prev);
                self.unmount(prev, true)?;
                None
            }
            other => other,
        };

        let old_ref = prev.as_ref().and_then(|p| p.node_ref.clone());

        match next.kind {
            NodeKind::Text => self.process_text(prev, next, container, anchor)?,
            NodeKind::Comment => self.process_comment(prev, next, container, anchor)?,
            NodeKind::Element(_) => match prev {
                None => self.mount_element(next, container, anchor)?,
                Some(prev) => self.patch_element(prev, next)?,
            },
            NodeKind::Fragment => self.process_fragment(prev, next, container, anchor)?,
            NodeKind::Component(_) => self.process_component(prev, next, container, anchor)?,
            NodeKind::Extension(ref ext) => {
                let ext = Rc::clone(ext);
                match prev {
                    None => ext.mount(next, container, anchor, self)?,
                    Some(prev) => ext.update(prev, next, container, anchor, self)?,
                }
            }
        }

        self.set_ref(old_ref, next);
        Ok(())
    }

    pub(crate) fn expect_same(prev: &VNode, next: &VNode) -> Result<()> {
        if prev.is_same_type(next) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidReconciliationTarget {
                expected: next.kind.name(),
                found: prev.kind.name(),
            })
        }
    }

    fn mounted_el(node: &VNode) -> Result<HostHandle> {
        node.el.ok_or(RuntimeError::NotMounted {
            kind: node.kind.name(),
        })
    }

    fn process_text(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        match prev {
            None => {
                let el = self.host.create_text(next.text_str())?;
                next.el = Some(el);
                self.host.insert(el, container, anchor)?;
            }
            Some(prev) => {
                Self::expect_same(prev, next)?;
                let el = Self::mounted_el(prev)?;
                next.el = Some(el);
                if prev.text_str() != next.text_str() {
                    self.host.set_text(el, next.text_str())?;
                }
            }
        }
        Ok(())
    }

    /// Comments are static: updates only carry the handle over.
    fn process_comment(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        match prev {
            None => {
                let el = self.host.create_comment(next.text_str())?;
                next.el = Some(el);
                self.host.insert(el, container, anchor)?;
            }
            Some(prev) => {
                Self::expect_same(prev, next)?;
                next.el = Some(Self::mounted_el(prev)?);
            }
        }
        Ok(())
    }

    fn mount_element(
        &self,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        let NodeKind::Element(tag) = &next.kind else {
            return Err(RuntimeError::InvalidReconciliationTarget {
                expected: "element",
                found: next.kind.name(),
            });
        };
        let el = self.host.create_element(tag)?;
        next.el = Some(el);

        match &mut next.children {
            Children::Text(text) => self.host.set_element_text(el, text)?,
            Children::Nodes(children) => self.mount_children(children, el, None)?,
            Children::None => {}
        }
        for (key, value) in &next.props {
            self.host.patch_prop(el, key, None, Some(value))?;
        }

        self.host.insert(el, container, anchor)?;
        trace!(%el, "element mounted");
        Ok(())
    }

    pub(crate) fn patch_element(&self, prev: &mut VNode, next: &mut VNode) -> Result<()> {
        Self::expect_same(prev, next)?;
        let el = Self::mounted_el(prev)?;
        next.el = Some(el);

        // once a node needed a full prop diff, later renders of it do too
        let flags = next.patch_flags | (prev.patch_flags & PatchFlags::FULL_PROPS);

        if !flags.is_hinted() {
            self.patch_props(el, &prev.props, &next.props)?;
            return self.patch_children(prev, next, el, None);
        }

        if flags.contains(PatchFlags::FULL_PROPS) {
            self.patch_props(el, &prev.props, &next.props)?;
        } else {
            if flags.contains(PatchFlags::CLASS) {
                let (old, new) = (prev.props.get("class"), next.props.get("class"));
                if old != new {
                    self.host.patch_prop(el, "class", old, new)?;
                }
            }
            if flags.contains(PatchFlags::STYLE) {
                self.host
                    .patch_prop(el, "style", prev.props.get("style"), next.props.get("style"))?;
            }
            if flags.contains(PatchFlags::PROPS) {
                for key in &next.dynamic_props {
                    let (old, new) = (prev.props.get(key), next.props.get(key));
                    if old != new || self.host.force_patch_prop(el, key) {
                        self.host.patch_prop(el, key, old, new)?;
                    }
                }
            }
        }

        if flags.contains(PatchFlags::TEXT) {
            if prev.text_str() != next.text_str() {
                self.host.set_element_text(el, next.text_str())?;
            }
            return Ok(());
        }
        self.patch_children(prev, next, el, None)
    }

    /// Full prop diff: changed or force-patched keys are written, keys
    /// only present in `old` are cleared.
    fn patch_props(&self, el: HostHandle, old: &Props, new: &Props) -> Result<()> {
        for (key, value) in new {
            let prev = old.get(key);
            if prev != Some(value) || self.host.force_patch_prop(el, key) {
                self.host.patch_prop(el, key, prev, Some(value))?;
            }
        }
        for (key, value) in old {
            if !new.contains_key(key) {
                self.host.patch_prop(el, key, Some(value), None)?;
            }
        }
        Ok(())
    }

    fn process_fragment(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        match prev {
            None => {
                let start = self.host.create_text("")?;
                let end = self.host.create_text("")?;
                next.el = Some(start);
                next.anchor = Some(end);
                self.host.insert(start, container, anchor)?;
                self.host.insert(end, container, anchor)?;
                if let Children::Nodes(children) = &mut next.children {
                    self.mount_children(children, container, Some(end))?;
                }
            }
            Some(prev) => {
                Self::expect_same(prev, next)?;
                next.el = Some(Self::mounted_el(prev)?);
                let end = prev.anchor.ok_or(RuntimeError::NotMounted { kind: "fragment" })?;
                next.anchor = Some(end);
                self.patch_children(prev, next, container, Some(end))?;
            }
        }
        Ok(())
    }

    pub(crate) fn mount_children(
        &self,
        children: &mut [VNode],
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        for child in children {
            self.patch(None, child, container, anchor)?;
        }
        Ok(())
    }

    pub(crate) fn unmount_children(&self, children: &mut [VNode], do_remove: bool) -> Result<()> {
        for child in children {
            self.unmount(child, do_remove)?;
        }
        Ok(())
    }

    /// Relocate everything `node` occupies before `anchor`.
    pub(crate) fn move_node(
        &self,
        node: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        match &node.kind {
            NodeKind::Component(_) => {
                let Some(instance) = &node.component else {
                    return Err(RuntimeError::NotMounted { kind: "component" });
                };
                let sub_tree = instance.sub_tree.borrow();
                match sub_tree.as_ref() {
                    Some(tree) => self.move_node(tree, container, anchor),
                    None => Ok(()),
                }
            }
            NodeKind::Extension(ext) => ext.move_to(node, container, anchor, self),
            NodeKind::Fragment => {
                self.host.insert(Self::mounted_el(node)?, container, anchor)?;
                if let Children::Nodes(children) = &node.children {
                    for child in children {
                        self.move_node(child, container, anchor)?;
                    }
                }
                let end = node.anchor.ok_or(RuntimeError::NotMounted { kind: "fragment" })?;
                self.host.insert(end, container, anchor)?;
                Ok(())
            }
            _ => {
                let el = Self::mounted_el(node)?;
                trace!(%el, "moving host node");
                self.host.insert(el, container, anchor)?;
                Ok(())
            }
        }
    }

    /// Tear `node` down. With `do_remove == false` host nodes are left in
    /// place because an ancestor's removal takes them along.
    pub(crate) fn unmount(&self, node: &mut VNode, do_remove: bool) -> Result<()> {
        if let Some(node_ref) = &node.node_ref {
            node_ref.clear();
        }

        if let Some(hook) = node.retain.clone() {
            trace!(kind = node.kind.name(), "handing node to retain hook");
            return hook.retain(node, self);
        }

        match node.kind {
            NodeKind::Component(_) => {
                let Some(instance) = node.component.clone() else {
                    return Ok(());
                };
                self.unmount_component(&instance, do_remove)
            }
            NodeKind::Extension(ref ext) => {
                let ext = Rc::clone(ext);
                ext.unmount(node, do_remove, self)
            }
            _ => {
                if let Children::Nodes(children) = &mut node.children {
                    self.unmount_children(children, false)?;
                }
                if do_remove {
                    self.remove(node)?;
                }
                Ok(())
            }
        }
    }

    /// Remove a node's host nodes from the host tree.
    fn remove(&self, node: &VNode) -> Result<()> {
        let el = Self::mounted_el(node)?;
        if let (NodeKind::Fragment, Some(end)) = (&node.kind, node.anchor) {
            return self.remove_fragment(el, end);
        }
        trace!(%el, "removing host node");
        self.host.remove(el)?;
        Ok(())
    }

    /// Remove every host node from `start` up to and including `end`.
    fn remove_fragment(&self, start: HostHandle, end: HostHandle) -> Result<()> {
        let mut cur = start;
        while cur != end {
            let next = self.host.next_sibling(cur);
            self.host.remove(cur)?;
            match next {
                Some(next) => cur = next,
                None => break,
            }
        }
        self.host.remove(end)?;
        Ok(())
    }

    /// The host node after everything `node` occupies.
    pub(crate) fn next_host_node(&self, node: &VNode) -> Option<HostHandle> {
        match &node.kind {
            NodeKind::Component(_) => {
                let instance = node.component.as_ref()?;
                let sub_tree = instance.sub_tree.borrow();
                self.next_host_node(sub_tree.as_ref()?)
            }
            NodeKind::Extension(ext) => ext.next_host_node(node, self),
            _ => self.host.next_sibling(node.anchor.or(node.el)?),
        }
    }

    /// Refresh `node`'s ref binding after a patch.
    ///
    /// A ref that is no longer attached is cleared at once; the new value is
    /// written after the flush, when the whole tree is in place.
    fn set_ref(&self, old: Option<NodeRef>, node: &VNode) {
        if let Some(old) = &old {
            let kept = node.node_ref.as_ref().is_some_and(|new| new.ptr_eq(old));
            if !kept {
                old.clear();
            }
        }

        let Some(node_ref) = &node.node_ref else {
            return;
        };
        let target = match &node.component {
            Some(instance) => Some(RefTarget::Component(Rc::clone(instance))),
            None => node.el.map(RefTarget::Host),
        };
        match target {
            Some(target) => {
                let node_ref = node_ref.clone();
                let job = Job::builder()
                    .id(REF_JOB_ID)
                    .label("ref update")
                    .build(move || {
                        node_ref.set(target.clone());
                        Ok(())
                    });
                self.runtime.queue_post_flush(&job);
            }
            None => node_ref.clear(),
        }
    }
}

impl<H: HostOps + 'static> RendererInternals for RendererCore<H> {
    fn patch(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        RendererCore::patch(self, prev, next, container, anchor)
    }

    fn unmount(&self, node: &mut VNode, do_remove: bool) -> Result<()> {
        RendererCore::unmount(self, node, do_remove)
    }

    fn move_node(
        &self,
        node: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        RendererCore::move_node(self, node, container, anchor)
    }

    fn mount_children(
        &self,
        children: &mut [VNode],
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        RendererCore::mount_children(self, children, container, anchor)
    }

    fn patch_children(
        &self,
        prev: &mut VNode,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        RendererCore::patch_children(self, prev, next, container, anchor)
    }

    fn next_host_node(&self, node: &VNode) -> Option<HostHandle> {
        RendererCore::next_host_node(self, node)
    }

    fn host(&self) -> &dyn HostOps {
        &self.host
    }

    fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

pub(crate) fn log_component(action: &'static str, name: &str, uid: u64) {
    debug!(component = name, uid, "component {action}");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HostOp, MemoryHost};

    fn setup() -> (Renderer<MemoryHost>, HostHandle) {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        (renderer, root)
    }

    #[test]
    fn mounts_and_unmounts_elements() {
        let (renderer, root) = setup();
        let tree = VNode::element("div")
            .prop("id", "main")
            .child(VNode::text("hello"))
            .child(VNode::comment("note"));
        renderer.render(Some(tree), root).unwrap();
        assert_eq!(
            renderer.host().serialize(root),
            "<div id=\"main\">hello<!--note--></div>"
        );

        renderer.render(None, root).unwrap();
        assert_eq!(renderer.host().serialize(root), "");
        assert!(renderer.with_root(root, |tree| tree.is_none()));
    }

    #[test]
    fn text_update_reuses_node() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::text("a")), root).unwrap();
        renderer.host().clear_ops();

        renderer.render(Some(VNode::text("b")), root).unwrap();
        let ops = renderer.host().ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], HostOp::SetText { text, .. } if text == "b"));
    }

    #[test]
    fn kind_change_replaces_in_place() {
        let (renderer, root) = setup();
        let tree = |middle: VNode| {
            VNode::fragment([VNode::text("a"), middle, VNode::text("c")])
        };
        renderer.render(Some(tree(VNode::element("b"))), root).unwrap();
        renderer.render(Some(tree(VNode::element("i"))), root).unwrap();
        assert_eq!(renderer.host().serialize(root), "a<i></i>c");
    }

    #[test]
    fn full_prop_diff_clears_removed_keys() {
        let (renderer, root) = setup();
        let el = |props: &[(&str, &str)]| {
            props
                .iter()
                .fold(VNode::element("a"), |node, (k, v)| node.prop(*k, *v))
        };
        renderer
            .render(Some(el(&[("href", "/x"), ("title", "t")])), root)
            .unwrap();
        renderer.host().clear_ops();

        renderer.render(Some(el(&[("href", "/y")])), root).unwrap();
        assert_eq!(renderer.host().serialize(root), "<a href=\"/y\"></a>");
        assert_eq!(renderer.host().op_count(), 2);
    }

    #[test]
    fn hints_limit_the_diff() {
        let (renderer, root) = setup();
        let el = |class: &str| VNode::element("p").prop("class", class).prop("title", "one");
        renderer
            .render(Some(el("a").patch_flags(PatchFlags::CLASS)), root)
            .unwrap();
        renderer.host().clear_ops();
        renderer
            .render(Some(el("b").patch_flags(PatchFlags::CLASS)), root)
            .unwrap();

        // only the hinted class is written
        assert!(matches!(
            renderer.host().ops().as_slice(),
            [HostOp::PatchProp { key, .. }] if key == "class"
        ));

        let (full, full_root) = setup();
        full.render(Some(el("a")), full_root).unwrap();
        full.render(Some(el("b")), full_root).unwrap();
        assert_eq!(
            renderer.host().serialize(root),
            full.host().serialize(full_root)
        );
        assert_eq!(
            renderer.host().serialize(root),
            "<p class=\"b\" title=\"one\"></p>"
        );
    }

    #[test]
    fn text_hint_skips_child_diff() {
        let (renderer, root) = setup();
        let el = |text: &str| {
            VNode::element("span")
                .text_content(text)
                .patch_flags(PatchFlags::TEXT)
        };
        renderer.render(Some(el("1")), root).unwrap();
        renderer.host().clear_ops();
        renderer.render(Some(el("2")), root).unwrap();
        assert_eq!(renderer.host().op_count(), 1);
        assert_eq!(renderer.host().serialize(root), "<span>2</span>");
    }

    #[test]
    fn force_patched_props_are_rewritten() {
        let (renderer, root) = setup();
        let input = || VNode::element("input").prop("value", "x");
        renderer.render(Some(input()), root).unwrap();
        renderer.host().clear_ops();
        renderer.render(Some(input()), root).unwrap();
        assert!(matches!(
            renderer.host().ops().as_slice(),
            [HostOp::PatchProp { key, .. }] if key == "value"
        ));
    }

    #[test]
    fn fragments_use_anchors() {
        let (renderer, root) = setup();
        let frag = |items: &[&str]| VNode::fragment(items.iter().map(|t| VNode::text(*t)));
        renderer
            .render(Some(VNode::element("div").child(frag(&["a", "b"])).child(VNode::text("z"))), root)
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<div>abz</div>");

        renderer
            .render(Some(VNode::element("div").child(frag(&["a", "b", "c"])).child(VNode::text("z"))), root)
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<div>abcz</div>");

        renderer
            .render(Some(VNode::element("div").child(VNode::text("z"))), root)
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<div>z</div>");
    }

    #[test]
    fn mismatched_in_place_patch_is_rejected() {
        let (renderer, root) = setup();
        let mut prev = VNode::text("x");
        renderer.patch(None, &mut prev, root, None).unwrap();
        let mut next = VNode::element("span");
        let err = renderer.core.patch_element(&mut prev, &mut next).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidReconciliationTarget {
                expected: "element",
                found: "text",
            }
        );
    }

    #[test]
    fn refs_are_set_after_flush_and_cleared_on_unmount() {
        let (renderer, root) = setup();
        let node_ref = NodeRef::new();
        renderer
            .render(Some(VNode::element("div").node_ref(&node_ref)), root)
            .unwrap();
        let el = node_ref.host().unwrap();
        assert_eq!(renderer.host().children(root), vec![el]);

        renderer.render(Some(VNode::element("div")), root).unwrap();
        assert!(!node_ref.is_set());
    }
}
