//! Cryptographic primitives for cxn-rpc envelopes.
//!
//! - AES-256-GCM sealing with caller-supplied AAD (standard envelopes)
//! - HKDF-SHA256 message-key derivation and Concat KDF
//! - P-256 ECDH-ES+A256KW sealed boxes (registration envelopes)
//! - Connection secret generation and key import

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod sealed;
pub mod types;

pub use aead::{open, seal};
pub use error::CryptoError;
pub use kdf::{concat_kdf, derive_message_key, hkdf_derive};
pub use keys::{
    base64url_decode, base64url_encode, decode_secret, generate_secret, generate_secret_key,
    public_key_from_sec1, secret_key_from_pkcs8_pem,
};
pub use p256::{PublicKey, SecretKey};
pub use sealed::{open_sealed, seal_to};
pub use types::{SECRET_LENGTH, SEALED_BOX_OVERHEAD};
