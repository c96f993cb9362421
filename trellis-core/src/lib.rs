//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Fine-grained dependency tracking between observed data and effects
//! - Effects, lazily cached computed values and observed containers
//! - A batched job scheduler with pre- and post-flush queues
//! - A tree reconciler with keyed child diffing over a pluggable host
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: The `(target, key) -> subscribers` side table
//! - `reactive`: The runtime handle, effects and observed values
//! - `scheduler`: Jobs and the flush loop
//! - `vdom`: Render trees, components, refs and extension points
//! - `render`: The reconciler and the host operations it drives
//! - `config` / `error`: Runtime tunables and the error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{Runtime, Signal};
//! use trellis_core::render::{MemoryHost, Renderer};
//! use trellis_core::vdom::VNode;
//!
//! let rt = Runtime::new();
//! let renderer = Renderer::new(&rt, MemoryHost::new());
//! let root = renderer.host().create_root();
//!
//! let count = Signal::new(&rt, 0);
//! let c = count.clone();
//! renderer.mount(root, move || VNode::element("p").text_content(c.get().to_string()))?;
//!
//! count.set(5);
//! rt.tick()?;
//! assert_eq!(renderer.host().serialize(root), "<p>5</p>");
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;
pub mod scheduler;
pub mod vdom;

pub use config::RuntimeConfig;
pub use error::{ErrorPhase, HostError, Result, RuntimeError};
pub use reactive::{
    Computed, Effect, EffectOptions, ReactiveMap, ReactiveVec, ReadonlyMap, ReadonlySignal, Runtime,
    Signal,
};
pub use render::{HostHandle, HostOps, MemoryHost, Renderer};
pub use scheduler::Job;
pub use vdom::{Component, Key, NodeRef, PatchFlags, PropValue, VNode};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
