use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch or wrong key)")]
    AeadDecrypt,

    #[error("Ciphertext truncated: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Envelope signature mismatch")]
    SignatureMismatch,

    #[error("Plaintext is not valid UTF-8")]
    InvalidUtf8,

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
