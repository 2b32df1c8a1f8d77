//! Standard and registration messages, and the decoder that tells them apart.
//!
//! A standard message is sealed with AES-256-GCM under a key derived from the
//! connection secret. A registration message is sealed to the recipient
//! app's P-256 certificate key. In both cases the outer header is the
//! associated data, so the plaintext routing id cannot be swapped.

use cxn_crypto::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::config::AppIdentity;
use crate::envelope::{
    from_cbor, parse_frame, to_cbor, write_header, Frame, GarbledMessage, GarbledReason,
    MessageKind, WireKind,
};
use crate::error::{CxnError, Result};
use crate::store::CxnStore;
use crate::types::ConnectionRecord;

/// Message between two parties that already share a connection secret.
#[derive(Debug, Clone, PartialEq)]
pub struct StdMessage {
    pub cxn_id: String,
    pub data: Value,
}

impl StdMessage {
    pub fn new(cxn_id: impl Into<String>, data: Value) -> Self {
        Self {
            cxn_id: cxn_id.into(),
            data,
        }
    }

    /// Seal under `secret` (base64url, as stored in the connection record).
    pub fn encode(&self, secret: &str) -> Result<Vec<u8>> {
        let mut out = write_header(WireKind::Std, &self.cxn_id)?;
        let key = message_key(secret, &self.cxn_id)?;
        let payload = Zeroizing::new(to_cbor(&self.data)?);
        let sealed = cxn_crypto::seal(&key[..], &payload, &out)?;
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

/// Body of a registration message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub cxn: ConnectionRecord,
    pub entity: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// First-contact message from a site to an app, sealed to the app's key.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationMessage {
    /// Recipient app.
    pub app_id: String,
    pub payload: RegistrationPayload,
}

impl RegistrationMessage {
    pub fn new(app_id: impl Into<String>, payload: RegistrationPayload) -> Self {
        Self {
            app_id: app_id.into(),
            payload,
        }
    }

    pub fn encode(&self, recipient: &PublicKey) -> Result<Vec<u8>> {
        let mut out = write_header(WireKind::Registration, &self.app_id)?;
        let payload = Zeroizing::new(to_cbor(&self.payload)?);
        let sealed = cxn_crypto::seal_to(recipient, &payload, &out)?;
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

/// A decoded envelope.
#[derive(Debug, Clone)]
pub enum Message {
    Std(StdMessage),
    Registration(RegistrationMessage),
    Garbled(GarbledMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Std(_) => MessageKind::Std,
            Message::Registration(_) => MessageKind::Registration,
            Message::Garbled(_) => MessageKind::Garbled,
        }
    }
}

/// `[entity, action, params]`, the payload of a standard API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub entity: String,
    pub action: String,
    pub params: Value,
}

impl ApiCall {
    pub fn new(entity: impl Into<String>, action: impl Into<String>, params: Value) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
            params,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::String(self.entity.clone()),
            Value::String(self.action.clone()),
            self.params.clone(),
        ])
    }

    /// Parse `[entity, action, params]`. `params` may be omitted.
    pub fn from_value(value: &Value) -> Result<Self> {
        let parts = value
            .as_array()
            .filter(|a| (2..=3).contains(&a.len()))
            .ok_or_else(|| {
                CxnError::InvalidMessage("API call must be [entity, action, params]".into())
            })?;
        let entity = parts[0]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CxnError::InvalidMessage("API call entity must be a string".into()))?;
        let action = parts[1]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CxnError::InvalidMessage("API call action must be a string".into()))?;
        let params = parts.get(2).cloned().unwrap_or(Value::Null);
        Ok(Self::new(entity, action, params))
    }
}

/// Keys a decoder can use to authenticate incoming envelopes.
pub trait KeySource {
    /// Stored secret for `cxn_id`, if any.
    fn secret_for(&self, cxn_id: &str) -> Result<Option<String>>;

    /// Private key for registration envelopes addressed to `app_id`.
    fn private_key_for(&self, app_id: &str) -> Option<&SecretKey>;
}

impl<T: CxnStore + ?Sized> KeySource for T {
    fn secret_for(&self, cxn_id: &str) -> Result<Option<String>> {
        Ok(self.get_by_cxn_id(cxn_id)?.map(|cxn| cxn.secret))
    }

    fn private_key_for(&self, _app_id: &str) -> Option<&SecretKey> {
        None
    }
}

/// Key source for the app side: connection secrets from a store, plus the
/// app's own private key.
pub struct AppKeys<'a> {
    pub store: &'a dyn CxnStore,
    pub identity: &'a AppIdentity,
}

impl KeySource for AppKeys<'_> {
    fn secret_for(&self, cxn_id: &str) -> Result<Option<String>> {
        self.store.secret_for(cxn_id)
    }

    fn private_key_for(&self, app_id: &str) -> Option<&SecretKey> {
        (app_id == self.identity.app_id).then(|| self.identity.secret_key())
    }
}

/// Decode `data`, accepting only the kinds listed in `expected`.
///
/// Input that cannot be framed or authenticated is Garbled: returned as
/// [`Message::Garbled`] when `expected` lists [`MessageKind::Garbled`],
/// otherwise raised as [`CxnError::Garbled`]. Authenticated input of a kind
/// not in `expected` is [`CxnError::UnrecognizedMessage`].
pub fn decode<K: KeySource + ?Sized>(
    expected: &[MessageKind],
    data: &[u8],
    keys: &K,
) -> Result<Message> {
    let message = match parse_frame(data) {
        Err(garbled) => Message::Garbled(garbled),
        Ok(frame) => match frame.kind {
            WireKind::Std => decode_std(&frame, data, keys)?,
            WireKind::Registration => decode_registration(&frame, data, keys)?,
        },
    };

    if expected.contains(&message.kind()) {
        return Ok(message);
    }
    match message {
        Message::Garbled(garbled) => Err(CxnError::Garbled(garbled)),
        other => Err(CxnError::UnrecognizedMessage {
            expected: expected.to_vec(),
            received: other.kind(),
        }),
    }
}

fn garbled(frame: &Frame<'_>, data: &[u8], reason: GarbledReason) -> Message {
    Message::Garbled(GarbledMessage::new(
        data.to_vec(),
        Some(frame.routing_id.to_string()),
        reason,
    ))
}

fn message_key(secret: &str, cxn_id: &str) -> Result<Zeroizing<[u8; 32]>> {
    let secret = cxn_crypto::decode_secret(secret)?;
    Ok(Zeroizing::new(cxn_crypto::derive_message_key(&secret, cxn_id)?))
}

fn decode_std<K: KeySource + ?Sized>(frame: &Frame<'_>, data: &[u8], keys: &K) -> Result<Message> {
    let Some(secret) = keys.secret_for(frame.routing_id)? else {
        return Ok(garbled(frame, data, GarbledReason::UnknownConnection));
    };
    let key = message_key(&secret, frame.routing_id)?;
    let plaintext = match cxn_crypto::open(&key[..], frame.body, frame.header) {
        Ok(p) => Zeroizing::new(p),
        Err(e) if e.is_authentication_failure() => {
            return Ok(garbled(frame, data, GarbledReason::AuthenticationFailed));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Message::Std(StdMessage {
        cxn_id: frame.routing_id.to_string(),
        data: from_cbor(&plaintext)?,
    }))
}

fn decode_registration<K: KeySource + ?Sized>(
    frame: &Frame<'_>,
    data: &[u8],
    keys: &K,
) -> Result<Message> {
    let Some(secret_key) = keys.private_key_for(frame.routing_id) else {
        return Ok(garbled(frame, data, GarbledReason::UnknownRecipient));
    };
    let plaintext = match cxn_crypto::open_sealed(secret_key, frame.body, frame.header) {
        Ok(p) => Zeroizing::new(p),
        Err(e) if e.is_authentication_failure() => {
            return Ok(garbled(frame, data, GarbledReason::AuthenticationFailed));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Message::Registration(RegistrationMessage {
        app_id: frame.routing_id.to_string(),
        payload: from_cbor(&plaintext)?,
    }))
}
