//! Runtime Configuration

use serde::Deserialize;

use crate::error::{Result, RuntimeError};

/// Occurrences of one job allowed within a single flush.
pub const RECURSION_LIMIT: usize = 100;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json(r#"{ "warn_duplicate_keys": false }"#)?;
/// assert_eq!(config.recursion_limit, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Per-flush occurrence threshold before `RecursiveUpdateExceeded`.
    pub recursion_limit: usize,

    /// Report duplicate sibling keys to the warning sink.
    pub warn_duplicate_keys: bool,

    /// Fire `on_track` / `on_trigger` effect hooks.
    pub debug_hooks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: RECURSION_LIMIT,
            warn_duplicate_keys: true,
            debug_hooks: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| RuntimeError::InvalidConfig(e.to_string()))
    }
}
