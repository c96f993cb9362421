//! In-Memory Host
//!
//! [`MemoryHost`] keeps a node tree in plain maps and logs every mutation
//! it receives. It backs the crate's tests and benchmarks, and is a
//! reference for what a real host has to provide.
//!
//! Failures can be injected per operation with [`MemoryHost::fail_next`] to
//! exercise error routing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::host::{HostHandle, HostOps, HostResult};
use crate::error::HostError;
use crate::vdom::PropValue;

/// One mutation received by a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: HostHandle, tag: String },
    CreateText { node: HostHandle, text: String },
    CreateComment { node: HostHandle, text: String },
    Insert {
        child: HostHandle,
        parent: HostHandle,
        anchor: Option<HostHandle>,
    },
    Remove { child: HostHandle },
    SetText { node: HostHandle, text: String },
    SetElementText { el: HostHandle, text: String },
    PatchProp {
        el: HostHandle,
        key: String,
        next: Option<PropValue>,
    },
}

impl HostOp {
    /// Whether the operation created a node.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateComment { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeData {
    Root,
    Element(String),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct MemoryNode {
    data: NodeData,
    parent: Option<HostHandle>,
    children: Vec<HostHandle>,
    /// Text content set through `set_element_text`.
    text: String,
    props: IndexMap<String, PropValue>,
}

impl MemoryNode {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            text: String::new(),
            props: IndexMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    nodes: HashMap<HostHandle, MemoryNode>,
    ops: Vec<HostOp>,
    fail: HashMap<&'static str, String>,
}

impl MemoryState {
    fn alloc(&mut self, data: NodeData) -> HostHandle {
        self.next_id += 1;
        let handle = HostHandle::new(self.next_id);
        self.nodes.insert(handle, MemoryNode::new(data));
        handle
    }

    fn check(&mut self, op: &'static str) -> HostResult<()> {
        match self.fail.remove(op) {
            Some(message) => Err(HostError::new(op, message)),
            None => Ok(()),
        }
    }

    fn node(&self, op: &'static str, handle: HostHandle) -> HostResult<&MemoryNode> {
        self.nodes
            .get(&handle)
            .ok_or_else(|| HostError::new(op, format!("unknown node {handle}")))
    }

    fn node_mut(&mut self, op: &'static str, handle: HostHandle) -> HostResult<&mut MemoryNode> {
        self.nodes
            .get_mut(&handle)
            .ok_or_else(|| HostError::new(op, format!("unknown node {handle}")))
    }

    fn detach(&mut self, child: HostHandle) {
        let parent = self.nodes.get_mut(&child).and_then(|node| node.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|&c| c != child);
        }
    }
}

/// A host whose nodes live in memory.
///
/// # Example
///
/// ```rust,ignore
/// let host = MemoryHost::new();
/// let root = host.create_root();
/// let renderer = Renderer::new(&rt, host);
/// renderer.render(Some(VNode::element("p").text_content("hi")), root)?;
/// assert_eq!(renderer.host().serialize(root), "<p>hi</p>");
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RefCell<MemoryState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container node.
    pub fn create_root(&self) -> HostHandle {
        self.state.borrow_mut().alloc(NodeData::Root)
    }

    /// Make the next call of `op` (e.g. `"insert"`) fail with `message`.
    pub fn fail_next(&self, op: &'static str, message: impl Into<String>) {
        self.state.borrow_mut().fail.insert(op, message.into());
    }

    /// Every mutation since creation or the last [`clear_ops`](Self::clear_ops).
    pub fn ops(&self) -> Vec<HostOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn op_count(&self) -> usize {
        self.state.borrow().ops.len()
    }

    /// Inserts of nodes that existed before the current op log started.
    pub fn moves(&self) -> Vec<HostHandle> {
        let state = self.state.borrow();
        let mut created = Vec::new();
        let mut moved = Vec::new();
        for op in &state.ops {
            match op {
                HostOp::CreateElement { node, .. }
                | HostOp::CreateText { node, .. }
                | HostOp::CreateComment { node, .. } => created.push(*node),
                HostOp::Insert { child, .. } if !created.contains(child) => moved.push(*child),
                _ => {}
            }
        }
        moved
    }

    /// Nodes removed since the op log started.
    pub fn removals(&self) -> Vec<HostHandle> {
        self.state
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                HostOp::Remove { child } => Some(*child),
                _ => None,
            })
            .collect()
    }

    pub fn children(&self, node: HostHandle) -> Vec<HostHandle> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn prop(&self, el: HostHandle, key: &str) -> Option<PropValue> {
        self.state.borrow().nodes.get(&el)?.props.get(key).cloned()
    }

    /// Content of a text node, or the text content of an element.
    pub fn text(&self, node: HostHandle) -> Option<String> {
        let state = self.state.borrow();
        let node = state.nodes.get(&node)?;
        Some(match &node.data {
            NodeData::Text(text) | NodeData::Comment(text) => text.clone(),
            _ => node.text.clone(),
        })
    }

    /// Markup-like rendering of the children of `node`.
    ///
    /// Elements print as `<tag key="value">...</tag>` with data props in
    /// insertion order and handlers omitted, comments as `<!--text-->`,
    /// and empty text nodes (fragment anchors) print nothing.
    pub fn serialize(&self, node: HostHandle) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        if let Some(node) = state.nodes.get(&node) {
            out.push_str(&node.text);
            for child in &node.children {
                write_node(&state, *child, &mut out);
            }
        }
        out
    }
}

fn write_node(state: &MemoryState, handle: HostHandle, out: &mut String) {
    let Some(node) = state.nodes.get(&handle) else {
        return;
    };
    match &node.data {
        NodeData::Text(text) => out.push_str(text),
        NodeData::Comment(text) => {
            let _ = write!(out, "<!--{text}-->");
        }
        NodeData::Root | NodeData::Element(_) => {
            let tag = match &node.data {
                NodeData::Element(tag) => tag.as_str(),
                _ => "root",
            };
            out.push('<');
            out.push_str(tag);
            for (key, value) in &node.props {
                match value {
                    PropValue::Data(serde_json::Value::String(s)) => {
                        let _ = write!(out, " {key}=\"{s}\"");
                    }
                    PropValue::Data(other) => {
                        let _ = write!(out, " {key}=\"{other}\"");
                    }
                    PropValue::Handler(_) => {}
                }
            }
            out.push('>');
            out.push_str(&node.text);
            for child in &node.children {
                write_node(state, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl HostOps for MemoryHost {
    fn create_element(&self, tag: &str) -> HostResult<HostHandle> {
        let mut state = self.state.borrow_mut();
        state.check("create_element")?;
        let node = state.alloc(NodeData::Element(tag.to_string()));
        state.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        Ok(node)
    }

    fn create_text(&self, text: &str) -> HostResult<HostHandle> {
        let mut state = self.state.borrow_mut();
        state.check("create_text")?;
        let node = state.alloc(NodeData::Text(text.to_string()));
        state.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        Ok(node)
    }

    fn create_comment(&self, text: &str) -> HostResult<HostHandle> {
        let mut state = self.state.borrow_mut();
        state.check("create_comment")?;
        let node = state.alloc(NodeData::Comment(text.to_string()));
        state.ops.push(HostOp::CreateComment {
            node,
            text: text.to_string(),
        });
        Ok(node)
    }

    fn insert(
        &self,
        child: HostHandle,
        parent: HostHandle,
        anchor: Option<HostHandle>,
    ) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("insert")?;
        state.node("insert", child)?;
        state.node("insert", parent)?;
        if anchor == Some(child) {
            return Err(HostError::new("insert", "node cannot anchor itself"));
        }

        state.detach(child);
        let siblings = &mut state.node_mut("insert", parent)?.children;
        let at = match anchor {
            Some(anchor) => siblings.iter().position(|&c| c == anchor).ok_or_else(|| {
                HostError::new("insert", format!("anchor {anchor} is not a child of {parent}"))
            })?,
            None => siblings.len(),
        };
        siblings.insert(at, child);
        state.node_mut("insert", child)?.parent = Some(parent);
        state.ops.push(HostOp::Insert {
            child,
            parent,
            anchor,
        });
        Ok(())
    }

    fn remove(&self, child: HostHandle) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("remove")?;
        state.node("remove", child)?;
        state.detach(child);
        state.ops.push(HostOp::Remove { child });
        Ok(())
    }

    fn set_text(&self, node: HostHandle, text: &str) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("set_text")?;
        let target = state.node_mut("set_text", node)?;
        match &mut target.data {
            NodeData::Text(content) | NodeData::Comment(content) => *content = text.to_string(),
            _ => return Err(HostError::new("set_text", format!("{node} is not a text node"))),
        }
        state.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
        Ok(())
    }

    fn set_element_text(&self, el: HostHandle, text: &str) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("set_element_text")?;
        let children = std::mem::take(&mut state.node_mut("set_element_text", el)?.children);
        for child in children {
            if let Some(node) = state.nodes.get_mut(&child) {
                node.parent = None;
            }
        }
        state.node_mut("set_element_text", el)?.text = text.to_string();
        state.ops.push(HostOp::SetElementText {
            el,
            text: text.to_string(),
        });
        Ok(())
    }

    fn patch_prop(
        &self,
        el: HostHandle,
        key: &str,
        _prev: Option<&PropValue>,
        next: Option<&PropValue>,
    ) -> HostResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("patch_prop")?;
        let props = &mut state.node_mut("patch_prop", el)?.props;
        match next {
            Some(value) => {
                props.insert(key.to_string(), value.clone());
            }
            None => {
                props.shift_remove(key);
            }
        }
        state.ops.push(HostOp::PatchProp {
            el,
            key: key.to_string(),
            next: next.cloned(),
        });
        Ok(())
    }

    fn parent(&self, node: HostHandle) -> Option<HostHandle> {
        self.state.borrow().nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: HostHandle) -> Option<HostHandle> {
        let state = self.state.borrow();
        let parent = state.nodes.get(&node)?.parent?;
        let siblings = &state.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_anchor_and_move() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let a = host.create_text("a").unwrap();
        let b = host.create_text("b").unwrap();
        host.insert(a, root, None).unwrap();
        host.insert(b, root, Some(a)).unwrap();
        assert_eq!(host.serialize(root), "ba");

        host.clear_ops();
        host.insert(b, root, None).unwrap();
        assert_eq!(host.serialize(root), "ab");
        assert_eq!(host.moves(), vec![b]);
        assert_eq!(host.next_sibling(a), Some(b));
        assert_eq!(host.next_sibling(b), None);
    }

    #[test]
    fn elements_serialize_props_and_text() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let div = host.create_element("div").unwrap();
        host.patch_prop(div, "class", None, Some(&"box".into())).unwrap();
        host.patch_prop(div, "onclick", None, Some(&PropValue::handler(|_| {})))
            .unwrap();
        host.set_element_text(div, "hi").unwrap();
        host.insert(div, root, None).unwrap();
        assert_eq!(host.serialize(root), "<div class=\"box\">hi</div>");

        host.patch_prop(div, "class", None, None).unwrap();
        assert_eq!(host.prop(div, "class"), None);
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let host = MemoryHost::new();
        let root = host.create_root();
        host.fail_next("create_text", "out of nodes");
        let err = host.create_text("x").unwrap_err();
        assert_eq!(err.op, "create_text");
        let node = host.create_text("x").unwrap();
        host.insert(node, root, None).unwrap();
        assert_eq!(host.serialize(root), "x");
    }

    #[test]
    fn foreign_anchor_is_rejected() {
        let host = MemoryHost::new();
        let root = host.create_root();
        let other = host.create_root();
        let stray = host.create_text("s").unwrap();
        host.insert(stray, other, None).unwrap();
        let node = host.create_text("n").unwrap();
        assert!(host.insert(node, root, Some(stray)).is_err());
    }
}
