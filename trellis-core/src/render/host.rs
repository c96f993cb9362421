//! Host Operations
//!
//! The reconciler never touches a concrete node tree. Every mutation goes
//! through [`HostOps`], implemented once per target (a DOM binding, a
//! terminal buffer, or the in-memory host used in tests).

use std::fmt;

use crate::error::HostError;
use crate::vdom::PropValue;

/// Opaque reference to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(u64);

impl HostHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a host operation.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// The primitive operations a render target must provide.
///
/// Methods take `&self`; hosts keep their node tree behind interior
/// mutability, the same way the runtime does.
pub trait HostOps {
    fn create_element(&self, tag: &str) -> HostResult<HostHandle>;

    fn create_text(&self, text: &str) -> HostResult<HostHandle>;

    fn create_comment(&self, text: &str) -> HostResult<HostHandle>;

    /// Insert `child` into `parent` before `anchor`, or append when there is
    /// no anchor. A child that is already attached somewhere is moved.
    fn insert(
        &self,
        child: HostHandle,
        parent: HostHandle,
        anchor: Option<HostHandle>,
    ) -> HostResult<()>;

    /// Detach `child` from its parent.
    fn remove(&self, child: HostHandle) -> HostResult<()>;

    /// Replace the content of a text or comment node.
    fn set_text(&self, node: HostHandle, text: &str) -> HostResult<()>;

    /// Replace all children of an element with a single text content.
    fn set_element_text(&self, el: HostHandle, text: &str) -> HostResult<()>;

    /// Apply one prop change. `next == None` removes the prop.
    fn patch_prop(
        &self,
        el: HostHandle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
    ) -> HostResult<()>;

    fn parent(&self, node: HostHandle) -> Option<HostHandle>;

    fn next_sibling(&self, node: HostHandle) -> Option<HostHandle>;

    /// Props that must be re-applied even when unchanged, because the host
    /// can change them behind the reconciler's back.
    fn force_patch_prop(&self, _el: HostHandle, key: &str) -> bool {
        key == "value"
    }
}

impl<H: HostOps + ?Sized> HostOps for std::rc::Rc<H> {
    fn create_element(&self, tag: &str) -> HostResult<HostHandle> {
        (**self).create_element(tag)
    }

    fn create_text(&self, text: &str) -> HostResult<HostHandle> {
        (**self).create_text(text)
    }

    fn create_comment(&self, text: &str) -> HostResult<HostHandle> {
        (**self).create_comment(text)
    }

    fn insert(
        &self,
        child: HostHandle,
        parent: HostHandle,
        anchor: Option<HostHandle>,
    ) -> HostResult<()> {
        (**self).insert(child, parent, anchor)
    }

    fn remove(&self, child: HostHandle) -> HostResult<()> {
        (**self).remove(child)
    }

    fn set_text(&self, node: HostHandle, text: &str) -> HostResult<()> {
        (**self).set_text(node, text)
    }

    fn set_element_text(&self, el: HostHandle, text: &str) -> HostResult<()> {
        (**self).set_element_text(el, text)
    }

    fn patch_prop(
        &self,
        el: HostHandle,
        key: &str,
        prev: Option<&PropValue>,
        next: Option<&PropValue>,
    ) -> HostResult<()> {
        (**self).patch_prop(el, key, prev, next)
    }

    fn parent(&self, node: HostHandle) -> Option<HostHandle> {
        (**self).parent(node)
    }

    fn next_sibling(&self, node: HostHandle) -> Option<HostHandle> {
        (**self).next_sibling(node)
    }

    fn force_patch_prop(&self, el: HostHandle, key: &str) -> bool {
        (**self).force_patch_prop(el, key)
    }
}
