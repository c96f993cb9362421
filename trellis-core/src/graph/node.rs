//! Graph Keys
//!
//! This module defines the identifiers that address entries in the
//! dependency graph: which observed object ([`TargetId`]), what shape it has
//! ([`TargetShape`]) and which property of it was read ([`DepKey`]).

use std::fmt;
use std::rc::Rc;

/// Identifier of an observed object registered with a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// The shape of an observed object.
///
/// The shape decides how structural changes fan out: adding a key to an
/// object invalidates iteration, while writing past the end of a list
/// invalidates its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    /// A single value behind a `Value` key (signals, computed values).
    Cell,

    /// A keyed record whose key set can grow and shrink.
    Object,

    /// An indexed sequence with a synthetic `Length` key.
    List,
}

/// A property key of an observed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// The single value of a cell-shaped target.
    Value,

    /// A named property of an object.
    Field(Rc<str>),

    /// A numeric index of a list.
    Index(usize),

    /// The length of a list.
    Length,

    /// Structural iteration: the set of keys of an object.
    Iterate,
}

impl DepKey {
    /// Create a field key.
    pub fn field(name: &str) -> Self {
        DepKey::Field(Rc::from(name))
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Value => f.write_str("value"),
            DepKey::Field(name) => f.write_str(name),
            DepKey::Index(i) => write!(f, "{i}"),
            DepKey::Length => f.write_str("length"),
            DepKey::Iterate => f.write_str("<iterate>"),
        }
    }
}

/// How a property was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// How an observed object changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key was overwritten with a different value.
    Set,

    /// A key that did not exist before was added.
    Add,

    /// A key was removed.
    Delete,

    /// Every key was removed at once.
    Clear,
}
