//! Receiving ends of both handshakes.
//!
//! [`RegistrationServer`] runs on the app and answers registration envelopes
//! from sites. [`ApiServer`] runs on the site and answers API calls from apps
//! it is connected to. Both take a request body and return an
//! [`HttpResponse`]; the HTTP listener itself belongs to the caller.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AppIdentity;
use crate::envelope::MessageKind;
use crate::error::{CxnError, ErrorKind, Result};
use crate::http::HttpResponse;
use crate::message::{decode, ApiCall, AppKeys, Message, StdMessage};
use crate::registration::{ACTION_REGISTER, ACTION_UNREGISTER, CXN_ENTITY};
use crate::reply;
use crate::store::CxnStore;
use crate::types::ConnectionRecord;
use crate::validate::validate_cxn;

/// Plain-text response for a request that cannot be answered in an envelope.
fn refuse(err: &CxnError) -> HttpResponse {
    match err.kind() {
        ErrorKind::GarbledMessage => HttpResponse::plain(400, "Garbled message"),
        ErrorKind::InvalidMessage | ErrorKind::InvalidMetadata => {
            HttpResponse::plain(400, "Invalid message")
        }
        _ => HttpResponse::plain(500, "Internal error"),
    }
}

/// App-side endpoint for `Cxn.register` and `Cxn.unregister`.
pub struct RegistrationServer {
    identity: AppIdentity,
    store: Arc<dyn CxnStore>,
}

impl RegistrationServer {
    pub fn new(identity: AppIdentity, store: Arc<dyn CxnStore>) -> Self {
        Self { identity, store }
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn handle(&self, body: &[u8]) -> HttpResponse {
        self.try_handle(body).unwrap_or_else(|e| {
            warn!(app_id = %self.identity.app_id, error = %e, "refused registration request");
            refuse(&e)
        })
    }

    fn try_handle(&self, body: &[u8]) -> Result<HttpResponse> {
        let keys = AppKeys {
            store: self.store.as_ref(),
            identity: &self.identity,
        };
        let payload = match decode(&[MessageKind::Registration], body, &keys)? {
            Message::Registration(message) => message.payload,
            other => {
                return Err(CxnError::UnrecognizedMessage {
                    expected: vec![MessageKind::Registration],
                    received: other.kind(),
                })
            }
        };
        let cxn = payload.cxn;
        validate_cxn(&cxn)?;

        let result = if cxn.app_id != self.identity.app_id {
            reply::error("Connection record names a different app")
        } else if payload.entity != CXN_ENTITY {
            reply::error(format!("Unsupported entity {}", payload.entity))
        } else if payload.action == ACTION_REGISTER {
            self.on_register(&cxn)?
        } else if payload.action == ACTION_UNREGISTER {
            self.on_unregister(&cxn)?
        } else {
            reply::error(format!("Unsupported action {}", payload.action))
        };

        let answer = StdMessage::new(&cxn.cxn_id, result).encode(&cxn.secret)?;
        Ok(HttpResponse::envelope(200, answer))
    }

    fn on_register(&self, cxn: &ConnectionRecord) -> Result<Value> {
        if let Some(stored) = self.store.get_by_cxn_id(&cxn.cxn_id)? {
            if stored.secret != cxn.secret {
                warn!(cxn_id = %cxn.cxn_id, "registration presented a different secret");
                return Ok(reply::error("Secret does not match previous registration"));
            }
        }
        self.store.add(cxn)?;
        info!(cxn_id = %cxn.cxn_id, site_url = %cxn.site_url, "site registered");
        Ok(reply::success(json!({ "cxn_id": cxn.cxn_id })))
    }

    fn on_unregister(&self, cxn: &ConnectionRecord) -> Result<Value> {
        match self.store.get_by_cxn_id(&cxn.cxn_id)? {
            None => {
                debug!(cxn_id = %cxn.cxn_id, "unregister for unknown connection");
            }
            Some(stored) if stored.secret != cxn.secret => {
                warn!(cxn_id = %cxn.cxn_id, "unregister presented a different secret");
                return Ok(reply::error("Secret does not match previous registration"));
            }
            Some(_) => {
                self.store.remove(&cxn.cxn_id)?;
                info!(cxn_id = %cxn.cxn_id, site_url = %cxn.site_url, "site unregistered");
            }
        }
        Ok(reply::success(json!({ "cxn_id": cxn.cxn_id })))
    }
}

/// Site-side implementation of the API an app may call.
pub trait ApiHandler: Send + Sync {
    /// Run an already-authorized call and return its result body.
    fn call(&self, cxn: &ConnectionRecord, call: &ApiCall) -> Value;
}

impl<F> ApiHandler for F
where
    F: Fn(&ConnectionRecord, &ApiCall) -> Value + Send + Sync,
{
    fn call(&self, cxn: &ConnectionRecord, call: &ApiCall) -> Value {
        self(cxn, call)
    }
}

/// Site-side endpoint for API calls over established connections.
///
/// Calls outside the connection's `perm.api` rules are answered with an
/// error result and never reach the handler.
pub struct ApiServer {
    store: Arc<dyn CxnStore>,
    handler: Arc<dyn ApiHandler>,
}

impl ApiServer {
    pub fn new(store: Arc<dyn CxnStore>, handler: Arc<dyn ApiHandler>) -> Self {
        Self { store, handler }
    }

    pub fn handle(&self, body: &[u8]) -> HttpResponse {
        self.try_handle(body).unwrap_or_else(|e| {
            warn!(error = %e, "refused API request");
            refuse(&e)
        })
    }

    fn try_handle(&self, body: &[u8]) -> Result<HttpResponse> {
        let request = match decode(&[MessageKind::Std], body, self.store.as_ref())? {
            Message::Std(message) => message,
            other => {
                return Err(CxnError::UnrecognizedMessage {
                    expected: vec![MessageKind::Std],
                    received: other.kind(),
                })
            }
        };
        let cxn = self
            .store
            .get_by_cxn_id(&request.cxn_id)?
            .ok_or_else(|| CxnError::MissingConnection(request.cxn_id.clone()))?;

        let result = match ApiCall::from_value(&request.data) {
            Err(e) => reply::error(e.to_string()),
            Ok(call) if !cxn.perm.allows(&call.entity, &call.action) => {
                warn!(
                    cxn_id = %cxn.cxn_id,
                    entity = %call.entity,
                    action = %call.action,
                    "API call not permitted"
                );
                reply::error(format!(
                    "Access denied: {}.{} is not permitted for this connection",
                    call.entity, call.action
                ))
            }
            Ok(call) => {
                debug!(cxn_id = %cxn.cxn_id, entity = %call.entity, action = %call.action, "API call");
                self.handler.call(&cxn, &call)
            }
        };

        let answer = StdMessage::new(&cxn.cxn_id, result).encode(&cxn.secret)?;
        Ok(HttpResponse::envelope(200, answer))
    }
}
