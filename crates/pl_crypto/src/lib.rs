//! pl_crypto: cryptographic session layer for pairlink
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The raw session key is never used directly as a cipher key; only keys
//!   derived from it through HKDF touch the wire.
//!
//! # Module layout
//! - `keys`: session id / session key generation and encoding
//! - `kdf`: HKDF-SHA256 derivation of the channel key bundle
//! - `aead`: XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `hash`: SHA-256, HMAC-SHA256, constant-time comparison
//! - `error`: unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt_message, encrypt_message};
pub use error::CryptoError;
pub use hash::{hmac_sign, hmac_verify, random_hex, secure_compare, sha256, sha256_hex};
pub use kdf::{derive_encryption_key, derive_mac_key, EncryptionKey, MacKey, SessionKeys};
pub use keys::{
    decode_session_key, encode_session_key, generate_session_id, generate_session_key,
    is_valid_session_id, SessionKey, SESSION_ID_LEN, SESSION_KEY_LEN,
};
