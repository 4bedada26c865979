//! Session identifiers and session keys.
//!
//! A session is scoped by a 16-byte random id (rendered as 32 lowercase hex
//! chars) and a 32-byte random secret shared out-of-band via the pairing code.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const SESSION_ID_LEN: usize = 16;
pub const SESSION_KEY_LEN: usize = 32;

/// 32-byte shared session secret. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    /// Standard base64, the form embedded in pairing codes and storage.
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let mut raw = general_purpose::STANDARD.decode(encoded.trim())?;
        if raw.len() != SESSION_KEY_LEN {
            let len = raw.len();
            raw.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "session key must be {SESSION_KEY_LEN} bytes, got {len}"
            )));
        }
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self(key))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

pub fn generate_session_id() -> String {
    let mut id = [0u8; SESSION_ID_LEN];
    OsRng.fill_bytes(&mut id);
    hex::encode(id)
}

pub fn generate_session_key() -> SessionKey {
    SessionKey::generate()
}

pub fn encode_session_key(key: &SessionKey) -> String {
    key.encode()
}

pub fn decode_session_key(encoded: &str) -> Result<SessionKey, CryptoError> {
    SessionKey::decode(encoded)
}

/// True for a 32-char lowercase hex string, the only accepted session id form.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN * 2
        && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn session_id_is_fixed_length_lowercase_hex() {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        assert!(is_valid_session_id(&id));
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn session_keys_are_32_bytes_and_distinct() {
        let keys: HashSet<[u8; 32]> = (0..100)
            .map(|_| *generate_session_key().as_bytes())
            .collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn key_encoding_is_reversible() {
        let key = generate_session_key();
        let decoded = decode_session_key(&encode_session_key(&key)).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn short_key_is_rejected() {
        let encoded = general_purpose::STANDARD.encode([7u8; 16]);
        assert!(matches!(
            decode_session_key(&encoded),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = SessionKey::from_bytes([0xab; 32]);
        assert!(!format!("{key:?}").contains("ab"));
    }
}
