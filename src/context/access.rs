//! Access/identity descriptor carried across threads.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Who a piece of work is running on behalf of.
///
/// The request-handling layer sets this on the request thread; tasks
/// scheduled from that thread see the value that was current when they were
/// submitted.
///
/// # Example
///
/// ```rust
/// use scoped_async::context::AccessContext;
///
/// let access = AccessContext::new("user-42")
///     .with_role("admin")
///     .with_attribute("tenant", "acme");
///
/// assert!(access.has_role("admin"));
/// assert_eq!(access.attribute::<String>("tenant").as_deref(), Some("acme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessContext {
    /// Subject identifier.
    pub subject: String,

    /// Granted roles.
    pub roles: Vec<String>,

    /// Additional attributes (tenant, locale, request path...).
    pub attributes: HashMap<String, Value>,

    /// Whether this context represents an authenticated user.
    #[serde(default)]
    pub authenticated: bool,
}

impl AccessContext {
    /// Create an authenticated context.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            authenticated: true,
            ..Default::default()
        }
    }

    /// Create an anonymous (unauthenticated) context.
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            authenticated: false,
            ..Default::default()
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get the user ID (alias for subject).
    #[inline]
    pub fn user_id(&self) -> &str {
        &self.subject
    }

    /// Get a typed attribute value.
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Check for a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check for any of the given roles.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_is_authenticated() {
        let access = AccessContext::new("user-1");
        assert!(access.authenticated);
        assert_eq!(access.user_id(), "user-1");
    }

    #[test]
    fn anonymous_is_not_authenticated() {
        let access = AccessContext::anonymous();
        assert!(!access.authenticated);
        assert_eq!(access.subject, "anonymous");
    }

    #[test]
    fn roles_and_attributes() {
        let access = AccessContext::new("u")
            .with_role("reader")
            .with_attribute("quota", json!(10));
        assert!(access.has_any_role(&["writer", "reader"]));
        assert!(!access.has_role("writer"));
        assert_eq!(access.attribute::<i64>("quota"), Some(10));
        assert_eq!(access.attribute::<String>("quota"), None);
        assert_eq!(access.attribute::<i64>("missing"), None);
    }
}
