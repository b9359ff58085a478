//! # Permission Rules
//!
//! Per-collection policies evaluated against the client context.
//!
//! - The service role bypasses every rule
//! - A collection without a matching rule is denied
//! - Writes are checked against both the old and the new document

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PermissionValidator;
use crate::protocol::ClientContext;

/// Collection name matching every collection
pub const ANY_COLLECTION: &str = "*";

/// Policy applied by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RulePolicy {
    /// Allow every read and write
    #[serde(rename = "allow_all")]
    AllowAll,

    /// Deny every read and write
    #[serde(rename = "deny_all")]
    DenyAll,

    /// Any authenticated client may read and write
    #[serde(rename = "authenticated")]
    Authenticated,

    /// Only the owner may read or write
    #[serde(rename = "ownership")]
    Ownership {
        /// Field containing the owner's user id
        owner_field: String,
    },

    /// Anyone may read, only the owner may write
    #[serde(rename = "public_read")]
    PublicRead {
        /// Field containing the owner's user id
        owner_field: String,
    },
}

/// A policy bound to a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Collection name, or `*`
    pub collection: String,

    /// If non-empty, the client needs one of these roles
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(flatten)]
    pub policy: RulePolicy,
}

impl PermissionRule {
    pub fn new(collection: impl Into<String>, policy: RulePolicy) -> Self {
        Self {
            collection: collection.into(),
            roles: Vec::new(),
            policy,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    fn applies_to(&self, ctx: &ClientContext) -> bool {
        self.roles.is_empty() || self.roles.iter().any(|r| ctx.has_role(r))
    }
}

fn is_owner(ctx: &ClientContext, owner_field: &str, doc: &Value) -> bool {
    match (&ctx.user_id, doc.get(owner_field).and_then(Value::as_str)) {
        (Some(user), Some(owner)) => user == owner,
        _ => false,
    }
}

/// Rule-driven validator bound to one client
#[derive(Debug, Clone)]
pub struct RulesValidator {
    ctx: ClientContext,
    rules: Vec<PermissionRule>,
}

impl RulesValidator {
    pub fn new(ctx: ClientContext, rules: Vec<PermissionRule>) -> Self {
        Self { ctx, rules }
    }

    /// Rules for `collection`: exact matches first, then wildcard rules
    fn rules_for<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a PermissionRule> {
        let exact = self.rules.iter().filter(move |r| r.collection == collection);
        let wildcard = self.rules.iter().filter(|r| r.collection == ANY_COLLECTION);
        exact
            .chain(wildcard)
            .filter(move |r| r.applies_to(&self.ctx))
    }

    fn policy_allows_read(&self, policy: &RulePolicy, doc: &Value) -> bool {
        match policy {
            RulePolicy::AllowAll | RulePolicy::PublicRead { .. } => true,
            RulePolicy::DenyAll => false,
            RulePolicy::Authenticated => self.ctx.is_authenticated,
            RulePolicy::Ownership { owner_field } => is_owner(&self.ctx, owner_field, doc),
        }
    }

    fn policy_allows_write(
        &self,
        policy: &RulePolicy,
        new: Option<&Value>,
        old: Option<&Value>,
    ) -> bool {
        match policy {
            RulePolicy::AllowAll => true,
            RulePolicy::DenyAll => false,
            RulePolicy::Authenticated => self.ctx.is_authenticated,
            RulePolicy::Ownership { owner_field } | RulePolicy::PublicRead { owner_field } => {
                // Ownership must hold before and after the write
                new.map_or(true, |doc| is_owner(&self.ctx, owner_field, doc))
                    && old.map_or(true, |doc| is_owner(&self.ctx, owner_field, doc))
            }
        }
    }
}

impl PermissionValidator for RulesValidator {
    fn can_read(&self, collection: &str, doc: &Value) -> bool {
        if self.ctx.is_service_role {
            return true;
        }
        self.rules_for(collection)
            .any(|rule| self.policy_allows_read(&rule.policy, doc))
    }

    fn can_write(&self, collection: &str, new: Option<&Value>, old: Option<&Value>) -> bool {
        if self.ctx.is_service_role {
            return true;
        }
        self.rules_for(collection)
            .any(|rule| self.policy_allows_write(&rule.policy, new, old))
    }
}
