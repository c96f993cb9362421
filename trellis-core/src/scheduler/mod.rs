//! Batched Scheduling
//!
//! Effects that re-render do not run the moment their dependencies change.
//! Their schedulers push a [`Job`] into the runtime's [`Scheduler`], and the
//! whole batch runs on the next microtask checkpoint ([`Runtime::tick`]).
//!
//! Two satellite queues surround the main queue: pre-flush callbacks run
//! before any main job of the same flush, post-flush callbacks after all of
//! them, including jobs queued transitively.
//!
//! [`Runtime::tick`]: crate::reactive::Runtime::tick

mod job;
mod queue;

pub use job::{Job, JobBuilder};
pub use queue::Scheduler;
