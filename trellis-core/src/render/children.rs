//! Child List Reconciliation
//!
//! Diffs the children of two diff-compatible nodes.
//!
//! # Algorithm
//!
//! Keyed lists are reconciled in six steps:
//!
//! 1. Patch the common prefix of diff-compatible nodes
//! 2. Patch the common suffix
//! 3. If the old list is exhausted, mount what is left of the new list
//! 4. If the new list is exhausted, unmount what is left of the old list
//! 5. Otherwise map the keys of the new remainder to positions, walk the
//!    old remainder, unmount nodes that have no counterpart and patch those
//!    that do, recording for every new position its old position plus one
//! 6. Walk the new remainder backwards: mount positions with no old
//!    counterpart and move the ones outside the longest increasing
//!    subsequence of old positions, each before its already placed
//!    successor
//!
//! Unkeyed lists flagged as such by the tree builder skip all of this and
//! are patched position by position.

use std::collections::HashMap;

use tracing::warn;

use super::host::{HostHandle, HostOps};
use super::renderer::RendererCore;
use super::sequence::longest_increasing_subsequence;
use crate::error::{Result, RuntimeError};
use crate::vdom::{Children, Key, PatchFlags, VNode};

impl<H: HostOps + 'static> RendererCore<H> {
    /// Diff `prev`'s children into `next`'s inside `container`.
    pub(crate) fn patch_children(
        &self,
        prev: &mut VNode,
        next: &mut VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        let flags = next.patch_flags;
        if flags.is_optimized() {
            if let (Children::Nodes(old), Children::Nodes(new)) =
                (&mut prev.children, &mut next.children)
            {
                if flags.contains(PatchFlags::KEYED_FRAGMENT) {
                    return self.patch_keyed_children(old, new, container, anchor);
                }
                if flags.contains(PatchFlags::UNKEYED_FRAGMENT) {
                    return self.patch_unkeyed_children(old, new, container, anchor);
                }
            }
        }

        match (&mut prev.children, &mut next.children) {
            (Children::Nodes(old), Children::Text(text)) => {
                self.unmount_children(old, true)?;
                self.host.set_element_text(container, text)?;
            }
            (old, Children::Text(text)) => {
                if old.as_text() != Some(text.as_str()) {
                    self.host.set_element_text(container, text)?;
                }
            }
            (Children::Nodes(old), Children::Nodes(new)) => {
                self.patch_keyed_children(old, new, container, anchor)?;
            }
            (Children::Nodes(old), Children::None) => {
                self.unmount_children(old, true)?;
            }
            (old, new) => {
                if old.as_text().is_some() {
                    self.host.set_element_text(container, "")?;
                }
                if let Children::Nodes(new) = new {
                    self.mount_children(new, container, anchor)?;
                }
            }
        }
        Ok(())
    }

    /// Patch position by position, then mount or unmount the tail.
    pub(crate) fn patch_unkeyed_children(
        &self,
        old: &mut [VNode],
        new: &mut [VNode],
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) -> Result<()> {
        let common = old.len().min(new.len());
        for (prev, next) in old.iter_mut().zip(new.iter_mut()) {
            self.patch(Some(prev), next, container, None)?;
        }
        if old.len() > new.len() {
            self.unmount_children(&mut old[common..], true)
        } else {
            self.mount_children(&mut new[common..], container, anchor)
        }
    }

    pub(crate) fn patch_keyed_children(
        &self,
        old: &mut [VNode],
        new: &mut [VNode],
        container: HostHandle,
        parent_anchor: Option<HostHandle>,
    ) -> Result<()> {
        let new_len = new.len();
        let mut i = 0;
        // exclusive ends of the unsettled ranges
        let mut old_end = old.len();
        let mut new_end = new_len;

        // 1. prefix
        while i < old_end && i < new_end && old[i].is_same_type(&new[i]) {
            self.patch(Some(&mut old[i]), &mut new[i], container, None)?;
            i += 1;
        }

        // 2. suffix
        while i < old_end && i < new_end && old[old_end - 1].is_same_type(&new[new_end - 1]) {
            self.patch(
                Some(&mut old[old_end - 1]),
                &mut new[new_end - 1],
                container,
                None,
            )?;
            old_end -= 1;
            new_end -= 1;
        }

        // 3. only insertions left
        if i >= old_end {
            if i < new_end {
                let anchor = if new_end < new_len {
                    new[new_end].el()
                } else {
                    parent_anchor
                };
                for node in &mut new[i..new_end] {
                    self.patch(None, node, container, anchor)?;
                }
            }
            return Ok(());
        }

        // 4. only removals left
        if i >= new_end {
            return self.unmount_children(&mut old[i..old_end], true);
        }

        // 5. unknown sequence
        let (old_start, new_start) = (i, i);

        // 5.1 key -> new index
        let mut key_to_new_index: HashMap<Key, usize> = HashMap::new();
        for (index, node) in new.iter().enumerate().take(new_end).skip(new_start) {
            if let Some(key) = &node.key {
                if key_to_new_index.insert(key.clone(), index).is_some() {
                    self.warn_duplicate_key(key);
                }
            }
        }

        // 5.2 patch matched nodes, unmount the rest
        let to_be_patched = new_end - new_start;
        let mut patched = 0;
        // old index + 1 for each new position; 0 = no old counterpart
        let mut new_to_old = vec![0usize; to_be_patched];
        let mut moved = false;
        let mut max_new_index_so_far = 0;

        for old_index in old_start..old_end {
            if patched >= to_be_patched {
                // every new node is matched; the rest can only go
                self.unmount(&mut old[old_index], true)?;
                continue;
            }

            let new_index = match &old[old_index].key {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (new_start..new_end).find(|&j| {
                    new_to_old[j - new_start] == 0 && old[old_index].is_same_type(&new[j])
                }),
            };

            match new_index {
                None => self.unmount(&mut old[old_index], true)?,
                // a duplicate key already claimed this slot
                Some(new_index) if new_to_old[new_index - new_start] != 0 => {
                    self.unmount(&mut old[old_index], true)?
                }
                Some(new_index) => {
                    new_to_old[new_index - new_start] = old_index + 1;
                    if new_index >= max_new_index_so_far {
                        max_new_index_so_far = new_index;
                    } else {
                        moved = true;
                    }
                    self.patch(Some(&mut old[old_index]), &mut new[new_index], container, None)?;
                    patched += 1;
                }
            }
        }

        // 5.3 move and mount
        let stable = if moved {
            longest_increasing_subsequence(&new_to_old)
        } else {
            Vec::new()
        };
        let mut stable_iter = stable.iter().rev().peekable();

        for offset in (0..to_be_patched).rev() {
            let index = new_start + offset;
            let anchor = if index + 1 < new_len {
                new[index + 1].el()
            } else {
                parent_anchor
            };

            if new_to_old[offset] == 0 {
                self.patch(None, &mut new[index], container, anchor)?;
            } else if moved {
                if stable_iter.peek() == Some(&&offset) {
                    stable_iter.next();
                } else {
                    self.move_node(&new[index], container, anchor)?;
                }
            }
        }
        Ok(())
    }

    fn warn_duplicate_key(&self, key: &Key) {
        if !self.runtime.config().warn_duplicate_keys {
            return;
        }
        warn!(%key, "duplicate sibling key");
        self.runtime
            .warn(&RuntimeError::DuplicateSiblingKey { key: key.to_string() });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::reactive::Runtime;
    use crate::render::{MemoryHost, Renderer};
    use crate::vdom::{PatchFlags, VNode};

    fn keyed(keys: &[&str]) -> VNode {
        VNode::element("ul").children(
            keys.iter()
                .map(|k| VNode::element("li").key(*k).text_content(*k)),
        )
    }

    fn markup(keys: &[&str]) -> String {
        let items: String = keys.iter().map(|k| format!("<li>{k}</li>")).collect();
        format!("<ul>{items}</ul>")
    }

    #[test]
    fn prefix_suffix_insert_and_remove() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();

        for keys in [
            &["a", "b"][..],
            &["a", "x", "b"],
            &["a", "x", "y", "b"],
            &["a", "b"],
            &["b"],
            &[],
        ] {
            renderer.render(Some(keyed(keys)), root).unwrap();
            assert_eq!(renderer.host().serialize(root), markup(keys));
        }
    }

    #[test]
    fn reverse_moves_all_but_one() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();

        renderer.render(Some(keyed(&["a", "b", "c", "d"])), root).unwrap();
        renderer.host().clear_ops();
        renderer.render(Some(keyed(&["d", "c", "b", "a"])), root).unwrap();

        assert_eq!(renderer.host().serialize(root), markup(&["d", "c", "b", "a"]));
        // one node stays put, the other three move around it
        assert_eq!(renderer.host().moves().len(), 3);
        assert!(renderer.host().removals().is_empty());
    }

    #[test]
    fn unkeyed_fragment_patches_by_position() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        let list = |items: &[&str]| {
            VNode::fragment(items.iter().map(|t| VNode::element("i").text_content(*t)))
                .patch_flags(PatchFlags::UNKEYED_FRAGMENT)
        };

        renderer.render(Some(list(&["1", "2", "3"])), root).unwrap();
        renderer.host().clear_ops();
        renderer.render(Some(list(&["3", "2"])), root).unwrap();

        assert_eq!(renderer.host().serialize(root), "<i>3</i><i>2</i>");
        assert_eq!(renderer.host().removals().len(), 1);
        assert!(renderer.host().moves().is_empty());
    }

    #[test]
    fn text_and_list_children_swap() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();

        renderer
            .render(Some(VNode::element("p").text_content("plain")), root)
            .unwrap();
        renderer
            .render(Some(VNode::element("p").child(VNode::text("node"))), root)
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<p>node</p>");

        renderer
            .render(Some(VNode::element("p").text_content("plain")), root)
            .unwrap();
        assert_eq!(renderer.host().serialize(root), "<p>plain</p>");

        renderer.render(Some(VNode::element("p")), root).unwrap();
        assert_eq!(renderer.host().serialize(root), "<p></p>");
    }

    #[test]
    fn unkeyed_scan_matches_compatible_nodes() {
        let rt = Runtime::new();
        let renderer = Renderer::new(&rt, MemoryHost::new());
        let root = renderer.host().create_root();
        let tree = |nodes: Vec<VNode>| VNode::element("div").children(nodes);

        renderer
            .render(
                Some(tree(vec![
                    VNode::element("a").key("k"),
                    VNode::element("b"),
                    VNode::element("c"),
                ])),
                root,
            )
            .unwrap();
        renderer.host().clear_ops();
        renderer
            .render(
                Some(tree(vec![VNode::element("c"), VNode::element("b")])),
                root,
            )
            .unwrap();

        assert_eq!(renderer.host().serialize(root), "<div><c></c><b></b></div>");
        assert_eq!(renderer.host().removals().len(), 1);
        assert!(!renderer.host().ops().iter().any(|op| op.is_create()));
    }
}
