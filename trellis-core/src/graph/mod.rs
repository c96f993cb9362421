//! Dependency Graph
//!
//! This module implements the side table that records which effects read
//! which properties of which observed objects.
//!
//! # Overview
//!
//! The graph maps `(target, key)` pairs to sets of subscribers:
//!
//! - A target is any observed object (a signal, a computed value, a map or a
//!   list), identified by a [`TargetId`] handed out by the runtime
//! - A key is one property of that target, or one of the synthetic keys
//!   ([`DepKey::Iterate`], [`DepKey::Length`]) that stand for its structure
//!
//! # Design Decisions
//!
//! 1. The graph never owns observed data. Wrappers forget their target when
//!    dropped, so the table cannot keep an object alive.
//!
//! 2. Subscribers are stored as weak references keyed by effect id, so the
//!    graph cannot keep an effect alive either.
//!
//! 3. Entries are created lazily on first read. An empty set is inert and is
//!    left in place.

mod deps;
mod node;

pub use deps::{Dep, DepGraph};
pub use node::{DepKey, TargetId, TargetShape, TrackOp, TriggerOp};
