//! Site and app configuration.

use std::fmt;

use cxn_crypto::SecretKey;
use cxn_trust::CaPolicy;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::validate::{is_valid_app_id, is_valid_url};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: expected object")]
    NotAnObject,

    #[error("Invalid configuration: missing {field}")]
    MissingField { field: &'static str },

    #[error("Invalid configuration: {field} {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Invalid configuration: set either ca_cert or insecure, not both")]
    AmbiguousCa,

    #[error("Invalid configuration: no CA policy (set ca_cert, or insecure: true to skip validation)")]
    MissingCaPolicy,

    #[error("Invalid private key: {0}")]
    PrivateKey(#[from] cxn_crypto::CryptoError),
}

/// Configuration for the site side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// URL the app uses to reach this site's API endpoint.
    pub site_url: String,
    pub ca: CaPolicy,
}

impl SiteConfig {
    pub fn new(site_url: impl Into<String>, ca: CaPolicy) -> Result<Self, ConfigError> {
        let site_url = site_url.into();
        if !is_valid_url(&site_url) {
            return Err(ConfigError::InvalidField {
                field: "site_url",
                reason: "must be an http(s) URL",
            });
        }
        Ok(Self { site_url, ca })
    }

    /// Validate and parse a JSON value as site configuration.
    ///
    /// Accepts `{"site_url": .., "ca_cert": ".."}` or
    /// `{"site_url": .., "insecure": true}`.
    pub fn from_json(json: &Value) -> Result<Self, ConfigError> {
        let obj = json.as_object().ok_or(ConfigError::NotAnObject)?;
        let site_url = get_non_empty_string(obj, "site_url")?;

        let ca_cert = obj
            .get("ca_cert")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        let insecure = obj
            .get("insecure")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let ca = match (ca_cert, insecure) {
            (Some(_), true) => return Err(ConfigError::AmbiguousCa),
            (Some(pem), false) => CaPolicy::verify(pem),
            (None, true) => CaPolicy::Insecure,
            (None, false) => return Err(ConfigError::MissingCaPolicy),
        };

        Self::new(site_url, ca)
    }
}

/// Identity of the app side: who it is, where it listens, and the private
/// key matching its published certificate.
#[derive(Clone)]
pub struct AppIdentity {
    pub app_id: String,
    pub app_url: String,
    secret_key: SecretKey,
}

impl fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("app_url", &self.app_url)
            .finish_non_exhaustive()
    }
}

impl AppIdentity {
    pub fn new(
        app_id: impl Into<String>,
        app_url: impl Into<String>,
        secret_key: SecretKey,
    ) -> Result<Self, ConfigError> {
        let app_id = app_id.into();
        let app_url = app_url.into();
        if !is_valid_app_id(&app_id) {
            return Err(ConfigError::InvalidField {
                field: "app_id",
                reason: "must look like app:<name>",
            });
        }
        if !is_valid_url(&app_url) {
            return Err(ConfigError::InvalidField {
                field: "app_url",
                reason: "must be an http(s) URL",
            });
        }
        Ok(Self {
            app_id,
            app_url,
            secret_key,
        })
    }

    /// Build an identity from a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(
        app_id: impl Into<String>,
        app_url: impl Into<String>,
        key_pem: &str,
    ) -> Result<Self, ConfigError> {
        let secret_key = cxn_crypto::secret_key_from_pkcs8_pem(key_pem)?;
        Self::new(app_id, app_url, secret_key)
    }

    /// Parse `{"app_id": .., "app_url": .., "private_key_pem": ..}`.
    pub fn from_json(json: &Value) -> Result<Self, ConfigError> {
        let obj = json.as_object().ok_or(ConfigError::NotAnObject)?;
        let app_id = get_non_empty_string(obj, "app_id")?;
        let app_url = get_non_empty_string(obj, "app_url")?;
        let key_pem = get_non_empty_string(obj, "private_key_pem")?;
        Self::from_pkcs8_pem(app_id, app_url, &key_pem)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

fn get_non_empty_string(obj: &Map<String, Value>, field: &'static str) -> Result<String, ConfigError> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(ConfigError::MissingField { field })
}
