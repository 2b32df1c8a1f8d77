//! Key derivation.
//!
//! messageKey = HKDF-SHA256(secret, salt="cxn:std-salt:v1", info="cxn:std:v1\0{cxnId}")
//!
//! Sealed boxes use the single-pass Concat KDF from NIST SP 800-56A over the
//! ECDH shared secret.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::types::{AES_KEY_LENGTH, SECRET_LENGTH};

const STD_SALT: &[u8] = b"cxn:std-salt:v1";
const STD_INFO_PREFIX: &str = "cxn:std:v1\0";

/// Derive a 256-bit key using HKDF-SHA256.
pub fn hkdf_derive(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<[u8; AES_KEY_LENGTH], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; AES_KEY_LENGTH];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::EncryptionFailed(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

/// Derive the AES key for standard envelopes on one connection.
///
/// Binding the connection id into `info` means a secret accidentally shared by
/// two records still yields distinct message keys.
pub fn derive_message_key(
    secret: &[u8],
    cxn_id: &str,
) -> Result<[u8; AES_KEY_LENGTH], CryptoError> {
    if secret.len() != SECRET_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: SECRET_LENGTH,
            got: secret.len(),
        });
    }
    let info = format!("{}{}", STD_INFO_PREFIX, cxn_id);
    hkdf_derive(secret, STD_SALT, info.as_bytes())
}

/// Concat KDF (single pass, output <= 256 bits).
///
///   SHA-256(00000001 || Z || algID || partyUInfo || partyVInfo || suppPubInfo)
///
/// algID is length-prefixed; both party infos are empty; suppPubInfo carries
/// the output length in bits.
pub fn concat_kdf(z: &[u8], alg: &str, key_data_len_bits: u32) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    hasher.update((alg.len() as u32).to_be_bytes());
    hasher.update(alg.as_bytes());
    hasher.update(0u32.to_be_bytes());
    hasher.update(0u32.to_be_bytes());
    hasher.update(key_data_len_bits.to_be_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_is_deterministic() {
        let ikm = [0x42u8; 32];
        let a = hkdf_derive(&ikm, b"salt", b"info").unwrap();
        let b = hkdf_derive(&ikm, b"salt", b"info").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hkdf_rfc5869_case_1_prefix() {
        // RFC 5869 A.1, first 32 bytes of OKM.
        let ikm = [0x0bu8; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
        let okm = hkdf_derive(&ikm, &salt, &info).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf"
        );
    }

    #[test]
    fn message_keys_differ_per_connection() {
        let secret = [7u8; 32];
        let a = derive_message_key(&secret, "cxn:one").unwrap();
        let b = derive_message_key(&secret, "cxn:two").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, secret);
    }

    #[test]
    fn message_key_rejects_short_secret() {
        assert!(derive_message_key(&[0u8; 16], "cxn:one").is_err());
    }

    #[test]
    fn concat_kdf_is_deterministic() {
        let z = [42u8; 32];
        assert_eq!(concat_kdf(&z, "A256KW", 256), concat_kdf(&z, "A256KW", 256));
    }

    #[test]
    fn concat_kdf_separates_algorithms() {
        let z = [42u8; 32];
        assert_ne!(concat_kdf(&z, "A256KW", 256), concat_kdf(&z, "other", 256));
    }
}
