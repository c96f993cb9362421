//! Render Trees
//!
//! The vocabulary shared by render functions and the reconciler: nodes,
//! keys, props, hint flags, components, refs and extension points.
//!
//! Trees are plain owned values. A render function builds a fresh tree on
//! every run; after patching, the new tree holds the host handles and
//! component instances and becomes the "previous" tree of the next patch.

mod component;
mod extension;
mod flags;
mod node;
mod node_ref;

pub use component::{Component, ComponentInstance, RenderFn, SetupContext};
pub use extension::{NodeExtension, RendererInternals, RetainHook};
pub use flags::{PatchFlags, ShapeFlags};
pub use node::{Children, Handler, Key, NodeKind, PropValue, Props, VNode};
pub use node_ref::{NodeRef, RefTarget};

pub(crate) use component::{should_update_component, Lifecycle};
