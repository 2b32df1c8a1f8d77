//! Structural validation of app metadata and connection records.
//!
//! Nothing here decides trust. These checks run before a certificate is
//! looked at, and before a record is persisted or sent anywhere.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CxnError, Result};
use crate::types::{ApiRule, AppMeta, ConnectionRecord, Perm};

static APP_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^app:[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static regex"));

static CXN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cxn:[A-Za-z0-9]+$").expect("static regex"));

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#]+(?:[/?#]\S*)?$").expect("static regex"));

const CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";

/// Fresh connection id: `cxn:` followed by 32 hex digits from a random UUID.
pub fn new_cxn_id() -> String {
    format!("cxn:{}", Uuid::new_v4().simple())
}

pub fn is_valid_app_id(app_id: &str) -> bool {
    APP_ID.is_match(app_id)
}

pub fn is_valid_cxn_id(cxn_id: &str) -> bool {
    CXN_ID.is_match(cxn_id)
}

pub fn is_valid_url(url: &str) -> bool {
    HTTP_URL.is_match(url)
}

fn invalid(msg: impl Into<String>) -> CxnError {
    CxnError::InvalidMetadata(msg.into())
}

fn validate_perm(perm: &Perm) -> Result<()> {
    for (i, rule) in perm.api.iter().enumerate() {
        if rule.entity.is_empty() || rule.action.is_empty() {
            return Err(invalid(format!(
                "perm.api[{i}] must name an entity and an action"
            )));
        }
    }
    if perm.grant.iter().any(|g| g.is_empty()) {
        return Err(invalid("perm.grant entries must be non-empty"));
    }
    Ok(())
}

/// Check the shape of untrusted app metadata.
pub fn validate_app_meta(meta: &AppMeta) -> Result<()> {
    if !is_valid_app_id(&meta.app_id) {
        return Err(invalid(format!("malformed appId {:?}", meta.app_id)));
    }
    if !meta.app_cert.contains(CERT_BEGIN) {
        return Err(invalid("appCert is not a PEM certificate"));
    }
    if !is_valid_url(&meta.app_url) {
        return Err(invalid(format!("malformed appUrl {:?}", meta.app_url)));
    }
    validate_perm(&meta.perm)
}

/// Check a connection record before it is persisted or transmitted.
pub fn validate_cxn(cxn: &ConnectionRecord) -> Result<()> {
    if !is_valid_cxn_id(&cxn.cxn_id) {
        return Err(invalid(format!("malformed cxnId {:?}", cxn.cxn_id)));
    }
    if cxn_crypto::decode_secret(&cxn.secret).is_err() {
        return Err(invalid(format!("malformed secret for {}", cxn.cxn_id)));
    }
    if !is_valid_app_id(&cxn.app_id) {
        return Err(invalid(format!("malformed appId {:?}", cxn.app_id)));
    }
    if !is_valid_url(&cxn.app_url) {
        return Err(invalid(format!("malformed appUrl {:?}", cxn.app_url)));
    }
    if !is_valid_url(&cxn.site_url) {
        return Err(invalid(format!("malformed siteUrl {:?}", cxn.site_url)));
    }
    validate_perm(&cxn.perm)
}

/// Parse and validate app metadata published as JSON (`appId`, `appCert`,
/// `appUrl`, optional `perm`).
pub fn parse_app_meta(json: &Value) -> Result<AppMeta> {
    let obj = json
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object"))?;

    let app_id = get_non_empty_string(obj, "appId")?;
    let app_cert = get_non_empty_string(obj, "appCert")?;
    let app_url = get_non_empty_string(obj, "appUrl")?;
    let perm = match obj.get("perm") {
        None | Some(Value::Null) => Perm::default(),
        Some(v) => parse_perm(v)?,
    };

    let meta = AppMeta {
        app_id,
        app_cert,
        app_url,
        perm,
    };
    validate_app_meta(&meta)?;
    Ok(meta)
}

fn parse_perm(value: &Value) -> Result<Perm> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("perm must be an object"))?;

    let mut api = Vec::new();
    if let Some(rules) = obj.get("api") {
        let rules = rules
            .as_array()
            .ok_or_else(|| invalid("perm.api must be an array"))?;
        for rule in rules {
            let rule = rule
                .as_object()
                .ok_or_else(|| invalid("perm.api entries must be objects"))?;
            api.push(ApiRule {
                entity: get_non_empty_string(rule, "entity")?,
                action: get_non_empty_string(rule, "action")?,
            });
        }
    }

    let grant = match obj.get("grant") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|g| {
                g.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("perm.grant entries must be strings"))
            })
            .collect::<Result<Vec<_>>>()?,
        // A single grant string is accepted for compatibility.
        Some(Value::String(s)) => vec![s.clone()],
        Some(_) => return Err(invalid("perm.grant must be an array")),
    };

    Ok(Perm { api, grant })
}

fn get_non_empty_string(obj: &Map<String, Value>, field: &str) -> Result<String> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(format!("missing {field}")))
}
