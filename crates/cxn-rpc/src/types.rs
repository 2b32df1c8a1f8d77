//! Connection records, app metadata, and permission grants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One API rule in a permission grant. `"*"` matches any entity or action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRule {
    pub entity: String,
    pub action: String,
}

impl ApiRule {
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
        }
    }

    fn matches(&self, entity: &str, action: &str) -> bool {
        (self.entity == "*" || self.entity.eq_ignore_ascii_case(entity))
            && (self.action == "*" || self.action.eq_ignore_ascii_case(action))
    }
}

/// Permissions an app requests and a site grants for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perm {
    /// API calls the app may make against the site.
    #[serde(default)]
    pub api: Vec<ApiRule>,
    /// Named capabilities outside the API whitelist.
    #[serde(default)]
    pub grant: Vec<String>,
}

impl Perm {
    /// True when some rule admits `entity.action`.
    pub fn allows(&self, entity: &str, action: &str) -> bool {
        self.api.iter().any(|rule| rule.matches(entity, action))
    }
}

/// Durable trust record for one site/app relationship.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub cxn_id: String,
    /// Base64url-encoded 32-byte shared secret.
    pub secret: String,
    pub app_id: String,
    pub app_url: String,
    pub site_url: String,
    #[serde(default)]
    pub perm: Perm,
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("cxn_id", &self.cxn_id)
            .field("secret", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("app_url", &self.app_url)
            .field("site_url", &self.site_url)
            .field("perm", &self.perm)
            .finish()
    }
}

/// Untrusted description of a remote application offering to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMeta {
    pub app_id: String,
    /// PEM-encoded X.509 certificate.
    pub app_cert: String,
    pub app_url: String,
    #[serde(default)]
    pub perm: Perm,
}

/// Result of a register/unregister round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub cxn_id: String,
    /// The peer answered HTTP 200 with `is_error == 0`.
    pub success: bool,
}
