//! Node References
//!
//! A [`NodeRef`] is a shared slot that the reconciler fills with the host
//! node (or component instance) a tree node mounted to. Setting happens in
//! a post-flush callback, after the whole tree is in place; clearing
//! happens immediately on unmount.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::component::ComponentInstance;
use crate::render::HostHandle;

/// What a ref points at.
#[derive(Clone)]
pub enum RefTarget {
    Host(HostHandle),
    Component(Rc<ComponentInstance>),
}

impl fmt::Debug for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Host(handle) => write!(f, "Host({handle})"),
            RefTarget::Component(instance) => write!(f, "Component({})", instance.name()),
        }
    }
}

/// A shared, initially empty ref slot.
#[derive(Clone, Default)]
pub struct NodeRef {
    slot: Rc<RefCell<Option<RefTarget>>>,
}

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<RefTarget> {
        self.slot.borrow().clone()
    }

    /// The host node, if the ref points at one.
    pub fn host(&self) -> Option<HostHandle> {
        match &*self.slot.borrow() {
            Some(RefTarget::Host(handle)) => Some(*handle),
            _ => None,
        }
    }

    /// The component instance, if the ref points at one.
    pub fn instance(&self) -> Option<Rc<ComponentInstance>> {
        match &*self.slot.borrow() {
            Some(RefTarget::Component(instance)) => Some(Rc::clone(instance)),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub(crate) fn set(&self, target: RefTarget) {
        *self.slot.borrow_mut() = Some(target);
    }

    pub(crate) fn clear(&self) {
        *self.slot.borrow_mut() = None;
    }

    /// Whether both handles share one slot.
    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&*self.slot.borrow()).finish()
    }
}
