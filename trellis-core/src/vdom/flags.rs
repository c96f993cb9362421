//! Node Flags
//!
//! [`ShapeFlags`] summarize what a node is and what kind of children it
//! holds, so the reconciler can branch without matching on payloads.
//! [`PatchFlags`] are optional hints from whoever built the tree, naming
//! the only parts of a node that can differ between renders.

use bitflags::bitflags;

bitflags! {
    /// Structural summary of a node, derived when the node is built.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShapeFlags: u16 {
        const ELEMENT = 1 << 0;
        const COMPONENT = 1 << 2;
        const TEXT_CHILDREN = 1 << 3;
        const ARRAY_CHILDREN = 1 << 4;
        const EXTENSION = 1 << 6;
        /// Unmounting hands the node to its retain hook instead of
        /// destroying it.
        const RETAINED = 1 << 8;
    }
}

bitflags! {
    /// Update hints. An empty set means "diff everything".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatchFlags: u32 {
        /// Only the text children can change.
        const TEXT = 1 << 0;
        /// Only the `class` prop can change.
        const CLASS = 1 << 1;
        /// Only the `style` prop can change.
        const STYLE = 1 << 2;
        /// Only the props listed in `dynamic_props` can change.
        const PROPS = 1 << 3;
        /// Prop keys themselves can change; diff all props.
        const FULL_PROPS = 1 << 4;
        /// Children of a fragment are keyed.
        const KEYED_FRAGMENT = 1 << 7;
        /// Children of a fragment are unkeyed.
        const UNKEYED_FRAGMENT = 1 << 8;
        /// Nothing but non-prop state (refs) can change.
        const NEED_PATCH = 1 << 9;
        /// Ignore every other hint and run the full diff.
        const BAIL = 1 << 31;
    }
}

impl PatchFlags {
    /// Hints that restrict how an element's own props and text are diffed.
    pub const ELEMENT_HINTS: PatchFlags = PatchFlags::TEXT
        .union(PatchFlags::CLASS)
        .union(PatchFlags::STYLE)
        .union(PatchFlags::PROPS)
        .union(PatchFlags::FULL_PROPS)
        .union(PatchFlags::NEED_PATCH);

    /// Whether any element hint applies.
    pub fn is_hinted(self) -> bool {
        !self.contains(PatchFlags::BAIL) && self.intersects(PatchFlags::ELEMENT_HINTS)
    }

    /// Whether fragment child hints may be trusted.
    pub fn is_optimized(self) -> bool {
        !self.contains(PatchFlags::BAIL)
    }
}
