//! X.509 certificate trust backed by `x509-parser`.
//!
//! A peer certificate is trusted when:
//! - it and the CA certificate both parse from PEM
//! - the CA certificate carries the CA basic constraint and is currently valid
//! - the peer's issuer name matches the CA's subject name
//! - the peer's signature verifies under the CA's public key
//! - the current time falls inside the peer's validity window
//!
//! Revocation lists are not consulted; a deployment that needs CRL or OCSP
//! checks provides its own [`CertificateTrust`] implementation.

use cxn_crypto::{public_key_from_sec1, PublicKey};
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;
use x509_parser::time::ASN1Time;

use crate::error::{Result, TrustError};
use crate::CertificateTrust;

const PEM_LABEL: &str = "CERTIFICATE";

/// Decode a single PEM certificate block to DER.
fn pem_to_der(pem: &str, what: &'static str) -> Result<Vec<u8>> {
    let (_, block) = parse_x509_pem(pem.as_bytes()).map_err(|e| TrustError::Malformed {
        what,
        reason: format!("PEM: {e}"),
    })?;
    if block.label != PEM_LABEL {
        return Err(TrustError::Malformed {
            what,
            reason: format!("expected PEM label {PEM_LABEL}, got {}", block.label),
        });
    }
    Ok(block.contents)
}

fn parse_der<'a>(der: &'a [u8], what: &'static str) -> Result<X509Certificate<'a>> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| TrustError::Malformed {
        what,
        reason: format!("X.509 parse error: {e}"),
    })?;
    Ok(cert)
}

/// Default [`CertificateTrust`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Trust {
    /// Fixed evaluation time in seconds since the Unix epoch; `None` = now.
    at_unix_time: Option<i64>,
}

impl X509Trust {
    /// Validate against the system clock.
    pub fn new() -> Self {
        Self { at_unix_time: None }
    }

    /// Validate as if the current time were `unix_time`.
    pub fn at_unix_time(unix_time: i64) -> Self {
        Self {
            at_unix_time: Some(unix_time),
        }
    }

    fn now(&self) -> Result<ASN1Time> {
        match self.at_unix_time {
            None => Ok(ASN1Time::now()),
            Some(ts) => ASN1Time::from_timestamp(ts).map_err(|e| TrustError::Malformed {
                what: "evaluation time",
                reason: e.to_string(),
            }),
        }
    }
}

impl CertificateTrust for X509Trust {
    fn validate_cert(&self, cert_pem: &str, ca_cert_pem: &str) -> Result<()> {
        let ca_der = pem_to_der(ca_cert_pem, "CA certificate")?;
        let ca = parse_der(&ca_der, "CA certificate")?;
        let cert_der = pem_to_der(cert_pem, "certificate")?;
        let cert = parse_der(&cert_der, "certificate")?;
        let now = self.now()?;

        if !ca.is_ca() {
            return Err(TrustError::NotACertificateAuthority);
        }
        if !ca.validity().is_valid_at(now) {
            return Err(TrustError::CaOutOfValidity);
        }
        if cert.issuer().as_raw() != ca.subject().as_raw() {
            return Err(TrustError::UntrustedIssuer);
        }
        cert.verify_signature(Some(ca.public_key()))
            .map_err(|e| TrustError::BadSignature(e.to_string()))?;

        let validity = cert.validity();
        if now < validity.not_before {
            return Err(TrustError::NotYetValid);
        }
        if now > validity.not_after {
            return Err(TrustError::Expired);
        }
        Ok(())
    }

    fn extract_public_key(&self, cert_pem: &str) -> Result<PublicKey> {
        let der = pem_to_der(cert_pem, "certificate")?;
        let cert = parse_der(&der, "certificate")?;
        let spki = cert.public_key();

        if spki.algorithm.algorithm != OID_KEY_TYPE_EC_PUBLIC_KEY {
            return Err(TrustError::UnsupportedKey(format!(
                "expected EC public key (1.2.840.10045.2.1), got {}",
                spki.algorithm.algorithm
            )));
        }

        public_key_from_sec1(spki.subject_public_key.as_ref())
            .map_err(|e| TrustError::UnsupportedKey(e.to_string()))
    }
}
