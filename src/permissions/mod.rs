//! # Permissions Module
//!
//! Per-request permission validators. A validator is bound to one client
//! context by the `hz_permissions` prereq and consulted once per document
//! before a read exposes it or a write commits it.

mod rules;

pub use rules::{PermissionRule, RulePolicy, RulesValidator, ANY_COLLECTION};

use std::sync::Arc;

use serde_json::Value;

use crate::config::PermissionsConfig;
use crate::protocol::ClientContext;

/// Name of the prereq producing the validator
pub const PERMISSIONS_METHOD: &str = "hz_permissions";

/// Decides whether a client may see or change a document
pub trait PermissionValidator: Send + Sync {
    /// Whether `doc` may be exposed to the client
    fn can_read(&self, collection: &str, doc: &Value) -> bool;

    /// Whether the client may replace `old` with `new` (`None`: absent)
    fn can_write(&self, collection: &str, new: Option<&Value>, old: Option<&Value>) -> bool;
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

impl PermissionValidator for Permissive {
    fn can_read(&self, _collection: &str, _doc: &Value) -> bool {
        true
    }

    fn can_write(&self, _collection: &str, _new: Option<&Value>, _old: Option<&Value>) -> bool {
        true
    }
}

/// Builds validators from configuration
#[derive(Debug, Clone)]
pub struct Permissions {
    enabled: bool,
    rules: Vec<PermissionRule>,
}

impl Permissions {
    pub fn from_config(config: &PermissionsConfig) -> Self {
        Self {
            enabled: config.enabled,
            rules: config.rules.clone(),
        }
    }

    /// Validator bound to `ctx`
    pub fn validator(&self, ctx: &ClientContext) -> Arc<dyn PermissionValidator> {
        if self.enabled {
            Arc::new(RulesValidator::new(ctx.clone(), self.rules.clone()))
        } else {
            Arc::new(Permissive)
        }
    }
}
