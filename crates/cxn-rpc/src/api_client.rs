//! App side of API calls over an established connection.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::MessageKind;
use crate::error::{CxnError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::message::{decode, ApiCall, Message, StdMessage};
use crate::store::CxnStore;

/// Makes API calls to a site over the connection `cxn_id`.
pub struct ApiClient {
    cxn_id: String,
    store: Arc<dyn CxnStore>,
    http: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(
        cxn_id: impl Into<String>,
        store: Arc<dyn CxnStore>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            cxn_id: cxn_id.into(),
            store,
            http,
        }
    }

    pub fn cxn_id(&self) -> &str {
        &self.cxn_id
    }

    /// Call `entity.action` on the site and return its result body.
    ///
    /// The response must come back sealed for this client's own connection;
    /// anything else is an error even if it decrypts.
    pub fn call(&self, entity: &str, action: &str, params: Value) -> Result<Value> {
        let cxn = self
            .store
            .get_by_cxn_id(&self.cxn_id)?
            .ok_or_else(|| CxnError::MissingConnection(self.cxn_id.clone()))?;

        let body = StdMessage::new(&cxn.cxn_id, ApiCall::new(entity, action, params).to_value())
            .encode(&cxn.secret)?;

        debug!(cxn_id = %cxn.cxn_id, entity, action, "calling site API");
        let response = self
            .http
            .send(&HttpRequest::post_envelope(&cxn.site_url, body))?;

        let expected = [MessageKind::Std, MessageKind::Garbled];
        match decode(&expected, &response.body, self.store.as_ref())? {
            Message::Std(answer) if answer.cxn_id == cxn.cxn_id => Ok(answer.data),
            Message::Std(answer) => {
                warn!(
                    expected = %cxn.cxn_id,
                    received = %answer.cxn_id,
                    "API response from wrong connection"
                );
                Err(CxnError::WrongConnection {
                    expected: cxn.cxn_id,
                    received: answer.cxn_id,
                })
            }
            Message::Garbled(garbled) => {
                warn!(
                    cxn_id = %cxn.cxn_id,
                    status = response.status,
                    reason = %garbled.reason(),
                    "garbled API response"
                );
                Err(CxnError::Garbled(garbled))
            }
            other => Err(CxnError::UnrecognizedMessage {
                expected: expected.to_vec(),
                received: other.kind(),
            }),
        }
    }
}
