use thiserror::Error;

/// Reasons a certificate is not trusted. Every variant is an
/// "invalid certificate" condition from the caller's point of view.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("certificate is not yet valid")]
    NotYetValid,

    #[error("certificate has expired")]
    Expired,

    #[error("CA certificate is not within its validity period")]
    CaOutOfValidity,

    #[error("configured CA certificate is not a certificate authority")]
    NotACertificateAuthority,

    #[error("certificate was not issued by the configured CA")]
    UntrustedIssuer,

    #[error("certificate signature does not verify against the CA key: {0}")]
    BadSignature(String),

    #[error("unsupported public key: {0}")]
    UnsupportedKey(String),
}

/// Result type alias using [`TrustError`].
pub type Result<T> = std::result::Result<T, TrustError>;
