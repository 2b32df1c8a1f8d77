//! Site side of the connection handshake.
//!
//! `register` creates (or refreshes) the local connection record, persists it,
//! then sends it to the app in a registration envelope sealed to the app's
//! certificate key. `unregister` tells the app to forget the connection and
//! always drops the local record, even when that call fails.

use std::sync::Arc;

use cxn_trust::{CertificateTrust, X509Trust};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SiteConfig;
use crate::envelope::MessageKind;
use crate::error::{CxnError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::locks::KeyedLocks;
use crate::message::{decode, Message, RegistrationMessage, RegistrationPayload};
use crate::reply;
use crate::store::CxnStore;
use crate::types::{AppMeta, ConnectionRecord, Outcome};
use crate::validate::{new_cxn_id, validate_app_meta, validate_cxn};

pub const CXN_ENTITY: &str = "Cxn";
pub const ACTION_REGISTER: &str = "register";
pub const ACTION_UNREGISTER: &str = "unregister";

/// Registers this site with remote apps.
///
/// Calls for the same `appId` are serialized within one client, so two
/// concurrent registrations of one app converge on a single record.
pub struct RegistrationClient {
    config: SiteConfig,
    trust: Arc<dyn CertificateTrust>,
    store: Arc<dyn CxnStore>,
    http: Arc<dyn HttpTransport>,
    app_locks: KeyedLocks,
}

impl RegistrationClient {
    pub fn new(
        config: SiteConfig,
        store: Arc<dyn CxnStore>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        if config.ca.is_insecure() {
            warn!(
                site_url = %config.site_url,
                "registration client has no CA; app certificates will not be validated"
            );
        }
        Self {
            config,
            trust: Arc::new(X509Trust::new()),
            store,
            http,
            app_locks: KeyedLocks::default(),
        }
    }

    /// Replace the default X.509 certificate validation.
    pub fn with_trust(mut self, trust: Arc<dyn CertificateTrust>) -> Self {
        self.trust = trust;
        self
    }

    pub fn site_url(&self) -> &str {
        &self.config.site_url
    }

    /// Establish or refresh the connection with the app described by
    /// `app_meta`.
    ///
    /// The record is persisted before the app is contacted. A failed or
    /// rejected registration leaves it in place so a retry reuses the same
    /// `cxnId` and secret.
    pub fn register(&self, app_meta: &AppMeta) -> Result<Outcome> {
        validate_app_meta(app_meta)?;
        self.config.ca.check(self.trust.as_ref(), &app_meta.app_cert)?;

        self.app_locks
            .with_lock(&app_meta.app_id, || self.register_locked(app_meta))
    }

    fn register_locked(&self, app_meta: &AppMeta) -> Result<Outcome> {
        let cxn = match self.store.get_by_app_id(&app_meta.app_id)? {
            Some(mut cxn) => {
                cxn.app_url = app_meta.app_url.clone();
                cxn.site_url = self.config.site_url.clone();
                cxn.perm = app_meta.perm.clone();
                cxn
            }
            None => ConnectionRecord {
                cxn_id: new_cxn_id(),
                secret: cxn_crypto::generate_secret()?,
                app_id: app_meta.app_id.clone(),
                app_url: app_meta.app_url.clone(),
                site_url: self.config.site_url.clone(),
                perm: app_meta.perm.clone(),
            },
        };
        validate_cxn(&cxn)?;
        self.store.add(&cxn)?;

        let (status, data) = self.do_call(app_meta, ACTION_REGISTER, &cxn)?;
        let success = status == 200 && reply::is_ok(&data);
        if success {
            info!(app_id = %cxn.app_id, cxn_id = %cxn.cxn_id, "registered with app");
        } else {
            info!(
                app_id = %cxn.app_id,
                cxn_id = %cxn.cxn_id,
                status,
                error = reply::error_message(&data).unwrap_or(""),
                "app rejected registration"
            );
        }

        Ok(Outcome {
            cxn_id: cxn.cxn_id,
            success,
        })
    }

    /// Disconnect from the app described by `app_meta`.
    ///
    /// Returns `None` without contacting anyone when no connection exists.
    /// Otherwise the local record is removed whatever happens remotely; an
    /// error from the remote step is returned after that cleanup.
    pub fn unregister(&self, app_meta: &AppMeta) -> Result<Option<Outcome>> {
        self.app_locks
            .with_lock(&app_meta.app_id, || self.unregister_locked(app_meta))
    }

    fn unregister_locked(&self, app_meta: &AppMeta) -> Result<Option<Outcome>> {
        let Some(cxn) = self.store.get_by_app_id(&app_meta.app_id)? else {
            debug!(app_id = %app_meta.app_id, "no connection to unregister");
            return Ok(None);
        };
        info!(app_id = %cxn.app_id, cxn_id = %cxn.cxn_id, "unregistering from app");

        let result = (|| -> Result<(u16, Value)> {
            self.config.ca.check(self.trust.as_ref(), &app_meta.app_cert)?;
            self.do_call(app_meta, ACTION_UNREGISTER, &cxn)
        })();

        let removed = self.store.remove(&cxn.cxn_id);

        match (result, removed) {
            (Ok((status, data)), Ok(())) => Ok(Some(Outcome {
                cxn_id: cxn.cxn_id,
                success: status == 200 && reply::is_ok(&data),
            })),
            (Ok(_), Err(store_err)) => Err(store_err.into()),
            (Err(e), removed) => {
                if let Err(store_err) = removed {
                    warn!(cxn_id = %cxn.cxn_id, error = %store_err, "failed to remove local record");
                }
                warn!(app_id = %cxn.app_id, cxn_id = %cxn.cxn_id, error = %e, "remote unregister failed");
                Err(e)
            }
        }
    }

    /// One registration round trip. Returns the HTTP status and the
    /// decrypted response body.
    fn do_call(
        &self,
        app_meta: &AppMeta,
        action: &str,
        cxn: &ConnectionRecord,
    ) -> Result<(u16, Value)> {
        let app_key = self.trust.extract_public_key(&app_meta.app_cert)?;
        let request = RegistrationMessage::new(
            &app_meta.app_id,
            RegistrationPayload {
                cxn: cxn.clone(),
                entity: CXN_ENTITY.to_string(),
                action: action.to_string(),
                params: json!({}),
            },
        );
        let body = request.encode(&app_key)?;

        debug!(app_id = %app_meta.app_id, cxn_id = %cxn.cxn_id, action, "sending registration");
        let response = self
            .http
            .send(&HttpRequest::post_envelope(&cxn.app_url, body))?;

        let message = match decode(&[MessageKind::Std], &response.body, self.store.as_ref()) {
            Ok(message) => message,
            Err(e @ CxnError::Garbled(_)) => {
                warn!(cxn_id = %cxn.cxn_id, status = response.status, "garbled registration response");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        match message {
            Message::Std(answer) if answer.cxn_id == cxn.cxn_id => {
                Ok((response.status, answer.data))
            }
            Message::Std(answer) => {
                warn!(
                    expected = %cxn.cxn_id,
                    received = %answer.cxn_id,
                    "registration response from wrong connection"
                );
                Err(CxnError::WrongConnection {
                    expected: cxn.cxn_id.clone(),
                    received: answer.cxn_id,
                })
            }
            other => Err(CxnError::UnrecognizedMessage {
                expected: vec![MessageKind::Std],
                received: other.kind(),
            }),
        }
    }
}
