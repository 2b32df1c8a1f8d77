//! Sealed boxes: ECDH-ES+A256KW key agreement with A256GCM content encryption,
//! addressed to a P-256 public key taken from the recipient's certificate.
//!
//! Wire format:
//! [epk:65 SEC1 uncompressed][AES-KW(KEK, CEK):40][IV:12][ciphertext + tag:16]
//!
//! KEK = ConcatKDF(ECDH(ephemeral, recipient), "cxn:reg:v1", 256)
//! AAD = caller AAD || epk

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use aes_kw::KekAes256;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use zeroize::Zeroize;

use crate::aead::generate_iv;
use crate::error::CryptoError;
use crate::kdf::concat_kdf;
use crate::types::{
    AES_GCM_IV_LENGTH, AES_KEY_LENGTH, EPHEMERAL_KEY_LENGTH, SEALED_BOX_OVERHEAD,
    WRAPPED_KEY_LENGTH,
};

/// Algorithm identifier fed to the Concat KDF.
const ALG_ID: &str = "cxn:reg:v1";

fn gcm_aad(aad: &[u8], epk: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(aad.len() + epk.len());
    full.extend_from_slice(aad);
    full.extend_from_slice(epk);
    full
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key
/// can read it.
pub fn seal_to(recipient: &PublicKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_secret = EphemeralSecret::random(&mut p256::elliptic_curve::rand_core::OsRng);
    let ephemeral_point = PublicKey::from(&ephemeral_secret).to_encoded_point(false);
    let epk = ephemeral_point.as_bytes();

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    let mut kek_bytes = concat_kdf(
        shared_secret.raw_secret_bytes().as_slice(),
        ALG_ID,
        (AES_KEY_LENGTH * 8) as u32,
    );
    let kek = KekAes256::from(kek_bytes);
    kek_bytes.zeroize();

    let mut cek = [0u8; AES_KEY_LENGTH];
    getrandom::getrandom(&mut cek).map_err(|e| CryptoError::RngFailed(e.to_string()))?;

    let mut wrapped_cek = [0u8; WRAPPED_KEY_LENGTH];
    kek.wrap(&cek, &mut wrapped_cek)
        .map_err(|e| CryptoError::WrapFailed(format!("{:?}", e)))?;

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM init: {:?}", e)))?;
    cek.zeroize();

    let iv = generate_iv()?;
    let full_aad = gcm_aad(aad, epk);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: &full_aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(SEALED_BOX_OVERHEAD + plaintext.len());
    out.extend_from_slice(epk);
    out.extend_from_slice(&wrapped_cek);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a sealed box with the recipient's private key.
pub fn open_sealed(recipient: &SecretKey, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEALED_BOX_OVERHEAD {
        return Err(CryptoError::DataTooShort {
            min: SEALED_BOX_OVERHEAD,
            got: sealed.len(),
        });
    }

    let (epk, rest) = sealed.split_at(EPHEMERAL_KEY_LENGTH);
    let (wrapped_cek, rest) = rest.split_at(WRAPPED_KEY_LENGTH);
    let (iv, ciphertext) = rest.split_at(AES_GCM_IV_LENGTH);

    let sender_public = PublicKey::from_sec1_bytes(epk)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("ephemeral key: {}", e)))?;

    let shared_secret =
        p256::ecdh::diffie_hellman(recipient.to_nonzero_scalar(), sender_public.as_affine());
    let mut kek_bytes = concat_kdf(
        shared_secret.raw_secret_bytes().as_slice(),
        ALG_ID,
        (AES_KEY_LENGTH * 8) as u32,
    );
    let kek = KekAes256::from(kek_bytes);
    kek_bytes.zeroize();

    let mut cek = [0u8; AES_KEY_LENGTH];
    kek.unwrap(wrapped_cek, &mut cek)
        .map_err(|e| CryptoError::UnwrapFailed(format!("{:?}", e)))?;

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| CryptoError::DecryptionFailed(format!("AES-GCM init: {:?}", e)))?;
    cek.zeroize();

    let full_aad = gcm_aad(aad, epk);
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad: &full_aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
