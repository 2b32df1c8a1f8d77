use cxn_crypto::CryptoError;
use cxn_trust::TrustError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::envelope::{GarbledMessage, MessageKind};
use crate::http::TransportError;
use crate::store::StoreError;

/// Caller-facing error for every cxn-rpc operation.
#[derive(Debug, Error)]
pub enum CxnError {
    #[error("Invalid app metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(#[from] TrustError),

    #[error("Garbled message: {0}")]
    Garbled(GarbledMessage),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Received response from incorrect connection (expected {expected}, got {received})")]
    WrongConnection { expected: String, received: String },

    #[error("Unrecognized message type {received} (expected {})", kinds_to_string(.expected))]
    UnrecognizedMessage {
        expected: Vec<MessageKind>,
        received: MessageKind,
    },

    #[error("Unknown connection: {0}")]
    MissingConnection(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of [`CxnError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidMetadata,
    InvalidCertificate,
    GarbledMessage,
    InvalidMessage,
    TransportFailure,
    /// Local store, key material, or configuration fault.
    Internal,
}

impl CxnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CxnError::InvalidMetadata(_) => ErrorKind::InvalidMetadata,
            CxnError::InvalidCertificate(_) => ErrorKind::InvalidCertificate,
            CxnError::Garbled(_) => ErrorKind::GarbledMessage,
            CxnError::InvalidMessage(_)
            | CxnError::WrongConnection { .. }
            | CxnError::UnrecognizedMessage { .. } => ErrorKind::InvalidMessage,
            CxnError::Transport(_) => ErrorKind::TransportFailure,
            CxnError::MissingConnection(_)
            | CxnError::Store(_)
            | CxnError::Crypto(_)
            | CxnError::Config(_) => ErrorKind::Internal,
        }
    }
}

fn kinds_to_string(kinds: &[MessageKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Result type alias using [`CxnError`].
pub type Result<T> = std::result::Result<T, CxnError>;
