//! Engine Configuration
//!
//! Tunables for the request pipeline, write coordinator and watch rewrite.
//! Loaded from JSON; every field has a default so partial files are valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::HorizonResult;
use crate::permissions::PermissionRule;

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Limit added to ordered, unlimited watch requests (default: 100000).
    /// `None` disables the rewrite.
    #[serde(default = "default_implicit_watch_limit")]
    pub implicit_watch_limit: Option<usize>,

    /// Write retry deadline when the request has no `timeout` option
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Create unknown collections on first use
    #[serde(default)]
    pub auto_create_collection: bool,

    /// Rows per `fetch` patch batch
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    /// Concurrent in-flight requests per session
    #[serde(default = "default_max_requests_per_session")]
    pub max_requests_per_session: usize,

    /// Permission rules
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

fn default_implicit_watch_limit() -> Option<usize> {
    Some(100_000)
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_fetch_batch_size() -> usize {
    100
}

fn default_max_requests_per_session() -> usize {
    128
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            implicit_watch_limit: default_implicit_watch_limit(),
            write_timeout_ms: default_write_timeout_ms(),
            auto_create_collection: false,
            fetch_batch_size: default_fetch_batch_size(),
            max_requests_per_session: default_max_requests_per_session(),
            permissions: PermissionsConfig::default(),
        }
    }
}

impl HorizonConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> HorizonResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> HorizonResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Config with permission checks turned off (every row allowed)
    pub fn permissive() -> Self {
        Self {
            permissions: PermissionsConfig {
                enabled: false,
                rules: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// The default write deadline as a `Duration`
    pub fn write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_timeout_ms)
    }
}

/// Permission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// When false every row is allowed
    #[serde(default = "default_permissions_enabled")]
    pub enabled: bool,

    /// Rules, matched by collection name
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
}

fn default_permissions_enabled() -> bool {
    true
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_permissions_enabled(),
            rules: Vec::new(),
        }
    }
}
