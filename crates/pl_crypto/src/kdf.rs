//! Key derivation functions
//!
//! `hkdf_expand`: HKDF-SHA256, the single primitive used here.
//!
//! The session key from the pairing code is input keying material only. The
//! relay channel uses two derived keys:
//! - encryption key (XChaCha20-Poly1305)
//! - MAC key (HMAC-SHA256 envelope signatures)
//!
//! Derivation is deterministic, so both peers holding the same session key
//! arrive at interchangeable keys.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::{error::CryptoError, keys::SessionKey};

const CHANNEL_SALT: &[u8] = b"pairlink-relay-v1";
const ENCRYPTION_INFO: &[u8] = b"pairlink-encryption-key";
const MAC_INFO: &[u8] = b"pairlink-envelope-mac";

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Symmetric key handle for the relay cipher. Only usable through `aead`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey(pub(crate) [u8; 32]);

/// Key for envelope HMAC signatures.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MacKey(pub(crate) [u8; 32]);

impl MacKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacKey(<redacted>)")
    }
}

pub fn derive_encryption_key(session_key: &SessionKey) -> Result<EncryptionKey, CryptoError> {
    let mut key = [0u8; 32];
    hkdf_expand(
        session_key.as_bytes(),
        Some(CHANNEL_SALT),
        ENCRYPTION_INFO,
        &mut key,
    )?;
    Ok(EncryptionKey(key))
}

pub fn derive_mac_key(session_key: &SessionKey) -> Result<MacKey, CryptoError> {
    let mut key = [0u8; 32];
    hkdf_expand(session_key.as_bytes(), Some(CHANNEL_SALT), MAC_INFO, &mut key)?;
    Ok(MacKey(key))
}

/// Both channel keys, derived together whenever a session is established.
#[derive(Clone, Debug)]
pub struct SessionKeys {
    pub encryption: EncryptionKey,
    pub mac: MacKey,
}

impl SessionKeys {
    pub fn derive(session_key: &SessionKey) -> Result<Self, CryptoError> {
        Ok(Self {
            encryption: derive_encryption_key(session_key)?,
            mac: derive_mac_key(session_key)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = SessionKey::from_bytes([9u8; 32]);
        let a = derive_encryption_key(&key).unwrap();
        let b = derive_encryption_key(&key).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn derived_keys_are_domain_separated() {
        let key = SessionKey::from_bytes([9u8; 32]);
        let keys = SessionKeys::derive(&key).unwrap();
        assert_ne!(keys.encryption.0, keys.mac.0);
        assert_ne!(&keys.encryption.0, key.as_bytes());
    }
}
