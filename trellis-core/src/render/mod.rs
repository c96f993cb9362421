//! Reconciler
//!
//! Patches render trees into a host through [`HostOps`].
//!
//! # Module Structure
//!
//! - `host`: The host operations trait and handle type
//! - `renderer`: [`Renderer`], patch dispatch, mounting, moving, unmounting
//! - `children`: Keyed and unkeyed child list diff
//! - `component`: Render effects and update jobs of components
//! - `sequence`: Longest increasing subsequence used by the keyed diff
//! - `memory_host`: An in-memory host for tests and benchmarks

mod children;
mod component;
mod host;
mod memory_host;
mod renderer;
mod sequence;

pub use host::{HostHandle, HostOps, HostResult};
pub use memory_host::{HostOp, MemoryHost};
pub use renderer::Renderer;
pub use sequence::longest_increasing_subsequence;

pub use crate::error::HostError;
