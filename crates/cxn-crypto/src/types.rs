/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Length of a connection secret in raw bytes.
pub const SECRET_LENGTH: usize = 32;

/// SEC1 uncompressed P-256 point: 0x04 || x(32) || y(32).
pub const EPHEMERAL_KEY_LENGTH: usize = 65;

/// AES-KW output for a 32-byte content key: 32 + 8 = 40 bytes.
pub const WRAPPED_KEY_LENGTH: usize = 40;

/// Fixed overhead of a sealed box on top of the plaintext length.
///
/// Layout: [epk:65][AES-KW(KEK, CEK):40][IV:12][ciphertext][tag:16]
pub const SEALED_BOX_OVERHEAD: usize =
    EPHEMERAL_KEY_LENGTH + WRAPPED_KEY_LENGTH + AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH;
