//! Client Context
//!
//! Identity of the client behind a request. Produced by the transport's
//! authentication layer; opaque to everything except permission checks.

use std::collections::HashMap;

use serde_json::Value;

/// Identity carried with each request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientContext {
    /// The authenticated user's ID (None if anonymous)
    pub user_id: Option<String>,

    /// Whether the client is authenticated
    pub is_authenticated: bool,

    /// Whether the client bypasses permission rules
    pub is_service_role: bool,

    /// Role names assigned to the user
    pub roles: Vec<String>,

    /// Custom claims from the auth provider
    pub claims: HashMap<String, Value>,
}

impl ClientContext {
    /// Create context for an authenticated user
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_authenticated: true,
            ..Default::default()
        }
    }

    /// Create context for anonymous access
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create context for the service role (bypasses permission rules)
    pub fn service_role() -> Self {
        Self {
            is_authenticated: true,
            is_service_role: true,
            ..Default::default()
        }
    }

    /// Add a role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Whether the user holds `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_context() {
        let ctx = ClientContext::authenticated("user-1").with_role("admin");
        assert!(ctx.is_authenticated);
        assert!(!ctx.is_service_role);
        assert_eq!(ctx.user_id.as_deref(), Some("user-1"));
        assert!(ctx.has_role("admin"));
        assert!(!ctx.has_role("default"));
    }

    #[test]
    fn test_service_role() {
        let ctx = ClientContext::service_role();
        assert!(ctx.is_service_role);
        assert!(ctx.user_id.is_none());
    }
}
