//! Certificate trust for cxn-rpc peers.
//!
//! [`CertificateTrust`] is the capability the handshake consumes: validate a
//! peer certificate against a CA, and pull the P-256 public key a
//! registration envelope is encrypted to. [`X509Trust`] is the stock
//! implementation.
//!
//! [`CaPolicy`] records whether validation happens at all. Skipping it is an
//! explicit choice (`CaPolicy::Insecure`); there is no default.

mod error;
mod x509;

pub use cxn_crypto::PublicKey;
pub use error::{Result, TrustError};
pub use x509::X509Trust;

/// Validates certificates and extracts their public keys.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by clients serving concurrent requests.
pub trait CertificateTrust: Send + Sync {
    /// Succeeds only if `cert_pem` is currently valid against `ca_cert_pem`.
    fn validate_cert(&self, cert_pem: &str, ca_cert_pem: &str) -> Result<()>;

    /// Extract the public key from `cert_pem`.
    fn extract_public_key(&self, cert_pem: &str) -> Result<PublicKey>;
}

/// Whether peer certificates are checked against a CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaPolicy {
    /// Validate every peer certificate against this PEM-encoded CA.
    Verify { ca_cert_pem: String },
    /// Accept peer certificates without validation.
    Insecure,
}

impl CaPolicy {
    pub fn verify(ca_cert_pem: impl Into<String>) -> Self {
        CaPolicy::Verify {
            ca_cert_pem: ca_cert_pem.into(),
        }
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, CaPolicy::Insecure)
    }

    /// Apply the policy to `cert_pem`. Always succeeds in insecure mode.
    pub fn check(&self, trust: &dyn CertificateTrust, cert_pem: &str) -> Result<()> {
        match self {
            CaPolicy::Verify { ca_cert_pem } => trust.validate_cert(cert_pem, ca_cert_pem),
            CaPolicy::Insecure => {
                tracing::trace!("certificate validation skipped (insecure mode)");
                Ok(())
            }
        }
    }
}
