//! Outer envelope framing and the Garbled classification.
//!
//! Every envelope starts with the same header:
//!
//! ```text
//! [magic "CXN"][version:1][kind:1][routing-len:u16 BE][routing id UTF-8]
//! ```
//!
//! The routing id is the `cxnId` (standard) or recipient `appId`
//! (registration). It travels in the clear so the receiver can pick a key,
//! and is authenticated as AEAD associated data along with the rest of the
//! header.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CxnError, Result};

pub const MAGIC: [u8; 3] = *b"CXN";
pub const WIRE_VERSION: u8 = 1;

const FIXED_HEADER_LEN: usize = MAGIC.len() + 1 + 1 + 2;

const TAG_STD: u8 = 0x01;
const TAG_REGISTRATION: u8 = 0x02;

/// Envelope types a decoder can be asked to accept.
///
/// `Garbled` never appears on the wire. Listing it as expected means the
/// caller wants unauthenticated input handed back as
/// [`Message::Garbled`](crate::message::Message::Garbled) instead of as an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Std,
    Registration,
    Garbled,
}

/// Envelope types that exist on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireKind {
    Std,
    Registration,
}

impl WireKind {
    fn tag(self) -> u8 {
        match self {
            WireKind::Std => TAG_STD,
            WireKind::Registration => TAG_REGISTRATION,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_STD => Some(WireKind::Std),
            TAG_REGISTRATION => Some(WireKind::Registration),
            _ => None,
        }
    }
}

impl From<WireKind> for MessageKind {
    fn from(kind: WireKind) -> Self {
        match kind {
            WireKind::Std => MessageKind::Std,
            WireKind::Registration => MessageKind::Registration,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Std => "std",
            MessageKind::Registration => "registration",
            MessageKind::Garbled => "garbled",
        })
    }
}

/// Why an envelope could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarbledReason {
    Truncated,
    BadMagic,
    UnsupportedVersion(u8),
    UnknownKind(u8),
    BadRoutingId,
    /// No secret is stored for the routing `cxnId`.
    UnknownConnection,
    /// Addressed to an app this process holds no key for.
    UnknownRecipient,
    AuthenticationFailed,
}

impl fmt::Display for GarbledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GarbledReason::Truncated => f.write_str("truncated envelope"),
            GarbledReason::BadMagic => f.write_str("not a cxn envelope"),
            GarbledReason::UnsupportedVersion(v) => write!(f, "unsupported envelope version {v}"),
            GarbledReason::UnknownKind(k) => write!(f, "unknown envelope kind 0x{k:02x}"),
            GarbledReason::BadRoutingId => f.write_str("routing id is not UTF-8"),
            GarbledReason::UnknownConnection => f.write_str("unknown connection"),
            GarbledReason::UnknownRecipient => f.write_str("unknown recipient"),
            GarbledReason::AuthenticationFailed => f.write_str("authentication failed"),
        }
    }
}

/// Bytes that failed framing or authentication.
///
/// Holds the raw input for diagnostics. Nothing inside it has been verified.
#[derive(Clone, PartialEq, Eq)]
pub struct GarbledMessage {
    data: Vec<u8>,
    routing_id: Option<String>,
    reason: GarbledReason,
}

impl GarbledMessage {
    pub fn new(data: Vec<u8>, routing_id: Option<String>, reason: GarbledReason) -> Self {
        Self {
            data,
            routing_id,
            reason,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Claimed routing id, if the frame got that far. Unauthenticated.
    pub fn routing_id(&self) -> Option<&str> {
        self.routing_id.as_deref()
    }

    pub fn reason(&self) -> GarbledReason {
        self.reason
    }
}

impl fmt::Debug for GarbledMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbledMessage")
            .field("len", &self.data.len())
            .field("routing_id", &self.routing_id)
            .field("reason", &self.reason)
            .finish()
    }
}

impl fmt::Display for GarbledMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.routing_id {
            Some(id) => write!(f, "{} ({} bytes, routed to {id})", self.reason, self.data.len()),
            None => write!(f, "{} ({} bytes)", self.reason, self.data.len()),
        }
    }
}

/// A parsed outer frame. Nothing in it is authenticated yet.
#[derive(Debug)]
pub(crate) struct Frame<'a> {
    pub kind: WireKind,
    pub routing_id: &'a str,
    /// Header bytes, used as associated data.
    pub header: &'a [u8],
    pub body: &'a [u8],
}

/// Build the header for an outgoing envelope.
pub(crate) fn write_header(kind: WireKind, routing_id: &str) -> Result<Vec<u8>> {
    let len = u16::try_from(routing_id.len())
        .map_err(|_| CxnError::InvalidMessage("routing id too long".into()))?;

    let mut header = Vec::with_capacity(FIXED_HEADER_LEN + routing_id.len());
    header.extend_from_slice(&MAGIC);
    header.push(WIRE_VERSION);
    header.push(kind.tag());
    header.extend_from_slice(&len.to_be_bytes());
    header.extend_from_slice(routing_id.as_bytes());
    Ok(header)
}

/// Split `data` into header and body.
pub(crate) fn parse_frame(data: &[u8]) -> std::result::Result<Frame<'_>, GarbledMessage> {
    let garbled = |reason| GarbledMessage::new(data.to_vec(), None, reason);

    if data.len() < FIXED_HEADER_LEN {
        return Err(garbled(GarbledReason::Truncated));
    }
    if data[..3] != MAGIC {
        return Err(garbled(GarbledReason::BadMagic));
    }
    if data[3] != WIRE_VERSION {
        return Err(garbled(GarbledReason::UnsupportedVersion(data[3])));
    }
    let kind = WireKind::from_tag(data[4])
        .ok_or_else(|| garbled(GarbledReason::UnknownKind(data[4])))?;

    let routing_len = u16::from_be_bytes([data[5], data[6]]) as usize;
    let header_len = FIXED_HEADER_LEN + routing_len;
    if data.len() < header_len {
        return Err(garbled(GarbledReason::Truncated));
    }
    let routing_id = std::str::from_utf8(&data[FIXED_HEADER_LEN..header_len])
        .map_err(|_| garbled(GarbledReason::BadRoutingId))?;

    Ok(Frame {
        kind,
        routing_id,
        header: &data[..header_len],
        body: &data[header_len..],
    })
}

pub(crate) fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| CxnError::InvalidMessage(format!("CBOR encode: {e}")))?;
    Ok(buf)
}

pub(crate) fn from_cbor<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| CxnError::InvalidMessage(format!("CBOR decode: {e}")))
}
