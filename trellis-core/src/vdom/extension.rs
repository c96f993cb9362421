//! Extension Points
//!
//! Node kinds the reconciler does not know about plug in through
//! [`NodeExtension`]: the extension receives the same internals the
//! built-in kinds use (patch, unmount, move, child diff, host access) and
//! decides where its host nodes live. A portal that renders its children
//! into another container is the typical example.
//!
//! [`RetainHook`] intercepts unmounting of a single node so that its host
//! structure can be parked instead of destroyed.

use super::node::VNode;
use crate::error::Result;
use crate::reactive::Runtime;
use crate::render::{HostHandle, HostOps};

/// Operations of the reconciler available to extensions and hooks.
pub trait RendererInternals {
    /// Patch `next` against `prev`, mounting when there is no previous
    /// node and replacing when the two are not diff-compatible.
    fn patch(
        &self,
        prev: Option<&mut VNode>,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()>;

    /// Unmount a node; with `do_remove == false` its host nodes stay in
    /// place.
    fn unmount(&self, node: &mut VNode, do_remove: bool) -> Result<()>;

    /// Relocate a mounted node's host nodes before `anchor` in `container`.
    fn move_node(
        &self,
        node: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()>;

    fn mount_children(
        &self,
        children: &mut [VNode],
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()>;

    /// Diff the children of two nodes into `container`.
    fn patch_children(
        &self,
        prev: &mut VNode,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()>;

    /// The host node following everything `node` occupies.
    fn next_host_node(&self, node: &VNode) -> Option<HostHandle>;

    fn host(&self) -> &dyn HostOps;

    fn runtime(&self) -> &Runtime;
}

/// A custom node kind.
///
/// Nodes built with the same `Rc<dyn NodeExtension>` are diff-compatible;
/// the reconciler calls `update` for them and `mount`/`unmount` otherwise.
pub trait NodeExtension {
    fn name(&self) -> &str;

    fn mount(
        &self,
        node: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()>;

    fn update(
        &self,
        prev: &mut VNode,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()>;

    fn unmount(
        &self,
        node: &mut VNode,
        do_remove: bool,
        internals: &dyn RendererInternals,
    ) -> Result<()>;

    fn move_to(
        &self,
        node: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        internals: &dyn RendererInternals,
    ) -> Result<()>;

    /// Defaults to the sibling after the node's own host handle.
    fn next_host_node(&self, node: &VNode, internals: &dyn RendererInternals) -> Option<HostHandle> {
        let last = node.anchor().or_else(|| node.el())?;
        internals.host().next_sibling(last)
    }
}

/// Called instead of destroying a node that carries it.
pub trait RetainHook {
    fn retain(&self, node: &VNode, internals: &dyn RendererInternals) -> Result<()>;
}
