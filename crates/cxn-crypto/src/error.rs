use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encrypted data too short: need at least {min} bytes, got {got}")]
    DataTooShort { min: usize, got: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("AES-KW wrap failed: {0}")]
    WrapFailed(String),

    #[error("AES-KW unwrap failed: {0}")]
    UnwrapFailed(String),

    #[error("Invalid P-256 public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid P-256 private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid secret encoding: {0}")]
    InvalidSecret(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

impl CryptoError {
    /// True when the failure means "this ciphertext does not verify under
    /// this key", as opposed to a caller or environment fault.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::DataTooShort { .. }
                | CryptoError::DecryptionFailed(_)
                | CryptoError::UnwrapFailed(_)
                | CryptoError::InvalidPublicKey(_)
        )
    }
}
