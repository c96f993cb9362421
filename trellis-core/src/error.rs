//! Error Types
//!
//! Every failure the runtime can report is a [`RuntimeError`]. Errors raised
//! inside effects, scheduler jobs and flush callbacks are routed through the
//! runtime's error handler together with the [`ErrorPhase`] they occurred in.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Where a routed error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// A component render function or the patch it drives.
    Render,
    /// A job executed from the main scheduler queue.
    SchedulerJob,
    /// A callback drained from the pre-flush queue.
    PreFlushCallback,
    /// A callback drained from the post-flush queue.
    PostFlushCallback,
    /// A plain reactive effect body.
    Effect,
    /// Setting or clearing a node ref binding.
    RefBinding,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorPhase::Render => "render",
            ErrorPhase::SchedulerJob => "scheduler job",
            ErrorPhase::PreFlushCallback => "pre-flush callback",
            ErrorPhase::PostFlushCallback => "post-flush callback",
            ErrorPhase::Effect => "effect",
            ErrorPhase::RefBinding => "ref binding",
        };
        f.write_str(name)
    }
}

/// A failure reported by a host operations implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host operation `{op}` failed: {message}")]
pub struct HostError {
    /// Name of the host operation, e.g. `insert`.
    pub op: &'static str,
    /// Description supplied by the host.
    pub message: String,
}

impl HostError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Errors produced by the reactive runtime and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A job or callback re-entered the queue more often than the limit
    /// within a single flush.
    #[error(
        "maximum recursive updates exceeded for `{job}` (limit {limit}); a reactive \
         effect is mutating its own dependencies and recursively triggering itself"
    )]
    RecursiveUpdateExceeded { job: String, limit: usize },

    /// Two nodes were diffed in place although they are not diff-compatible.
    #[error("cannot patch a {found} node in place as a {expected} node")]
    InvalidReconciliationTarget {
        expected: &'static str,
        found: &'static str,
    },

    /// A node was used as a previous tree although it holds no host handle.
    #[error("{kind} node is not mounted")]
    NotMounted { kind: &'static str },

    /// Two siblings share the same key.
    #[error("duplicate key `{key}` found during update; make sure keys are unique")]
    DuplicateSiblingKey { key: String },

    /// A host operation failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A user callback reported a failure.
    #[error("{phase} failed: {message}")]
    Handler { phase: ErrorPhase, message: String },

    /// A write was attempted on a read-only computed value.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A write went through a read-only view of an observed value.
    #[error("{op} operation{} failed: target is readonly", on_key(.key))]
    ReadonlyWrite {
        op: &'static str,
        key: Option<String>,
    },

    /// Configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

fn on_key(key: &Option<String>) -> String {
    key.as_ref()
        .map(|key| format!(" on key `{key}`"))
        .unwrap_or_default()
}

impl RuntimeError {
    /// Convenience constructor for errors raised by user callbacks.
    pub fn handler(phase: ErrorPhase, message: impl Into<String>) -> Self {
        RuntimeError::Handler {
            phase,
            message: message.into(),
        }
    }

    /// Whether the error must abort the flush regardless of the handler.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::RecursiveUpdateExceeded { .. })
    }
}
