//! Tree Nodes
//!
//! A [`VNode`] describes one piece of the desired host tree. Render
//! functions build fresh trees on every run; the reconciler compares the
//! new tree with the previous one and records the host handles it created
//! or reused back into the new tree.
//!
//! # Diff Compatibility
//!
//! Two nodes can be patched in place only if they have the same kind (same
//! tag, same component definition, same extension) and equal keys.
//! Otherwise the old node is unmounted and the new one mounted in its
//! place.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use super::component::{Component, ComponentInstance};
use super::extension::{NodeExtension, RetainHook};
use super::flags::{PatchFlags, ShapeFlags};
use super::node_ref::NodeRef;
use crate::render::HostHandle;

/// Sibling identity used by the keyed child diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::Int(n as i64)
    }
}

/// Event handler attached as a prop.
pub type Handler = Rc<dyn Fn(&Value)>;

/// A prop value: plain data, or a handler compared by identity.
#[derive(Clone)]
pub enum PropValue {
    Data(Value),
    Handler(Handler),
}

impl PropValue {
    pub fn handler(f: impl Fn(&Value) + 'static) -> Self {
        PropValue::Handler(Rc::new(f))
    }

    /// The data payload, if this is not a handler.
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            PropValue::Data(value) => Some(value),
            PropValue::Handler(_) => None,
        }
    }

    /// Invoke the handler. Does nothing for data props.
    pub fn call(&self, event: &Value) {
        if let PropValue::Handler(handler) = self {
            handler(event);
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Data(a), PropValue::Data(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Data(value) => write!(f, "{value}"),
            PropValue::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Data(value)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Data(Value::from(s))
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Data(Value::from(s))
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Data(Value::from(n))
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Data(Value::from(n))
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Data(Value::from(b))
    }
}

/// Props in insertion order.
pub type Props = IndexMap<String, PropValue>;

/// Children of a node.
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(String),
    Nodes(Vec<VNode>),
}

impl Children {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_nodes(&self) -> Option<&[VNode]> {
        match self {
            Children::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }
}

/// What a node renders to.
#[derive(Clone)]
pub enum NodeKind {
    /// A host text node. The content lives in `children` as text.
    Text,
    /// A host comment node. The content lives in `children` as text.
    Comment,
    /// A host element with the given tag.
    Element(Rc<str>),
    /// A list of siblings delimited by two empty text anchors.
    Fragment,
    /// A component; instantiated on mount.
    Component(Rc<Component>),
    /// A node whose behaviour is supplied from outside the reconciler.
    Extension(Rc<dyn NodeExtension>),
}

impl NodeKind {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::Element(_) => "element",
            NodeKind::Fragment => "fragment",
            NodeKind::Component(_) => "component",
            NodeKind::Extension(_) => "extension",
        }
    }

    fn same_as(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Text, NodeKind::Text)
            | (NodeKind::Comment, NodeKind::Comment)
            | (NodeKind::Fragment, NodeKind::Fragment) => true,
            (NodeKind::Element(a), NodeKind::Element(b)) => a == b,
            (NodeKind::Component(a), NodeKind::Component(b)) => Rc::ptr_eq(a, b),
            (NodeKind::Extension(a), NodeKind::Extension(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Element(tag) => write!(f, "Element({tag})"),
            NodeKind::Component(def) => write!(f, "Component({})", def.name()),
            NodeKind::Extension(ext) => write!(f, "Extension({})", ext.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// One node of a render tree.
///
/// # Example
///
/// ```rust,ignore
/// let list = VNode::element("ul").children(
///     items.iter().map(|item| VNode::element("li").key(item.id).text(&item.label)),
/// );
/// ```
#[derive(Clone)]
pub struct VNode {
    pub(crate) kind: NodeKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) children: Children,
    pub(crate) shape_flags: ShapeFlags,
    pub(crate) patch_flags: PatchFlags,
    pub(crate) dynamic_props: Vec<String>,
    pub(crate) node_ref: Option<NodeRef>,
    pub(crate) retain: Option<Rc<dyn RetainHook>>,

    /// First host node; for fragments, the start anchor.
    pub(crate) el: Option<HostHandle>,
    /// Fragment end anchor.
    pub(crate) anchor: Option<HostHandle>,
    pub(crate) component: Option<Rc<ComponentInstance>>,
}

impl VNode {
    fn with_kind(kind: NodeKind, shape_flags: ShapeFlags) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: Children::None,
            shape_flags,
            patch_flags: PatchFlags::empty(),
            dynamic_props: Vec::new(),
            node_ref: None,
            retain: None,
            el: None,
            anchor: None,
            component: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        let mut node = Self::with_kind(NodeKind::Text, ShapeFlags::empty());
        node.children = Children::Text(content.into());
        node
    }

    pub fn comment(content: impl Into<String>) -> Self {
        let mut node = Self::with_kind(NodeKind::Comment, ShapeFlags::empty());
        node.children = Children::Text(content.into());
        node
    }

    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeKind::Element(Rc::from(tag)), ShapeFlags::ELEMENT)
    }

    pub fn fragment(children: impl IntoIterator<Item = VNode>) -> Self {
        Self::with_kind(NodeKind::Fragment, ShapeFlags::empty()).children(children)
    }

    pub fn component(def: &Rc<Component>) -> Self {
        Self::with_kind(NodeKind::Component(Rc::clone(def)), ShapeFlags::COMPONENT)
    }

    pub fn extension(ext: Rc<dyn NodeExtension>) -> Self {
        Self::with_kind(NodeKind::Extension(ext), ShapeFlags::EXTENSION)
    }

    // ---- Builders ----

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Replace the children with a node list.
    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.set_children(Children::Nodes(children.into_iter().collect()));
        self
    }

    /// Append one child node.
    pub fn child(mut self, child: VNode) -> Self {
        match &mut self.children {
            Children::Nodes(nodes) => nodes.push(child),
            _ => self.set_children(Children::Nodes(vec![child])),
        }
        self
    }

    /// Replace the children with text content.
    pub fn text_content(mut self, text: impl Into<String>) -> Self {
        self.set_children(Children::Text(text.into()));
        self
    }

    pub fn patch_flags(mut self, flags: PatchFlags) -> Self {
        self.patch_flags = flags;
        self
    }

    /// Names of the props covered by [`PatchFlags::PROPS`].
    pub fn dynamic_props<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dynamic_props = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Hand the node to `hook` instead of destroying it on unmount.
    pub fn retain(mut self, hook: Rc<dyn RetainHook>) -> Self {
        self.retain = Some(hook);
        self.shape_flags |= ShapeFlags::RETAINED;
        self
    }

    fn set_children(&mut self, children: Children) {
        if matches!(self.kind, NodeKind::Element(_)) {
            self.shape_flags -= ShapeFlags::TEXT_CHILDREN | ShapeFlags::ARRAY_CHILDREN;
            match &children {
                Children::Text(_) => self.shape_flags |= ShapeFlags::TEXT_CHILDREN,
                Children::Nodes(_) => self.shape_flags |= ShapeFlags::ARRAY_CHILDREN,
                Children::None => {}
            }
        }
        self.children = children;
    }

    // ---- Host state ----
    //
    // Extensions place their own host nodes and record them here so the
    // reconciler can anchor siblings against them.

    pub fn set_el(&mut self, el: Option<HostHandle>) {
        self.el = el;
    }

    pub fn set_anchor(&mut self, anchor: Option<HostHandle>) {
        self.anchor = anchor;
    }

    /// Mutable child list, if the node has node children.
    pub fn children_mut(&mut self) -> Option<&mut [VNode]> {
        match &mut self.children {
            Children::Nodes(nodes) => Some(nodes),
            _ => None,
        }
    }

    // ---- Accessors ----

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn get_key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn get_props(&self) -> &Props {
        &self.props
    }

    pub fn get_children(&self) -> &Children {
        &self.children
    }

    pub fn shape_flags(&self) -> ShapeFlags {
        self.shape_flags
    }

    pub fn get_patch_flags(&self) -> PatchFlags {
        self.patch_flags
    }

    /// Text of a text or comment node, or text children of an element.
    pub fn text_str(&self) -> &str {
        self.children.as_text().unwrap_or("")
    }

    /// The first host node this tree occupies.
    ///
    /// For a component this is the first host node of its current render
    /// output, which follows the component's own re-renders.
    pub fn el(&self) -> Option<HostHandle> {
        match &self.component {
            Some(instance) => instance.host_el(),
            None => self.el,
        }
    }

    /// End anchor of a fragment.
    pub fn anchor(&self) -> Option<HostHandle> {
        self.anchor
    }

    /// The mounted instance of a component node.
    pub fn component_instance(&self) -> Option<&Rc<ComponentInstance>> {
        self.component.as_ref()
    }

    /// Whether the node currently holds host state.
    pub fn is_mounted(&self) -> bool {
        self.el().is_some()
    }

    /// Whether the two nodes can be patched in place.
    pub fn is_same_type(&self, other: &VNode) -> bool {
        self.key == other.key && self.kind.same_as(&other.kind)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("kind", &self.kind);
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if !self.props.is_empty() {
            s.field("props", &self.props);
        }
        match &self.children {
            Children::None => {}
            children => {
                s.field("children", children);
            }
        }
        if let Some(el) = self.el {
            s.field("el", &el);
        }
        s.finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
