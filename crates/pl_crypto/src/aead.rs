//! Authenticated Encryption with Associated Data
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce).
//! Key size: 32 bytes.  Nonce: 24 bytes (random).  Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   base64( nonce (24 bytes) | ciphertext + tag )

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::{error::CryptoError, kdf::EncryptionKey};

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

/// Bound into every relay ciphertext as associated data.
const RELAY_AAD: &[u8] = b"pairlink-relay-v1";

/// Encrypt `plaintext` with a 32-byte key, prepending a random 24-byte nonce.
/// `aad`: additional associated data (authenticated but not encrypted).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;

    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::Truncated {
            len: data.len(),
            min: MIN_CIPHERTEXT_LEN,
        });
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a text message for the relay. Every call draws a fresh nonce, so
/// identical plaintexts never produce identical outputs.
pub fn encrypt_message(plaintext: &str, key: &EncryptionKey) -> Result<String, CryptoError> {
    let sealed = encrypt(&key.0, plaintext.as_bytes(), RELAY_AAD)?;
    Ok(general_purpose::STANDARD.encode(sealed))
}

/// Reverse of [`encrypt_message`]. Fails on wrong key, any altered byte, or
/// input shorter than nonce + tag.
pub fn decrypt_message(ciphertext: &str, key: &EncryptionKey) -> Result<String, CryptoError> {
    let sealed = general_purpose::STANDARD.decode(ciphertext.trim())?;
    let plaintext = decrypt(&key.0, &sealed, RELAY_AAD)?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_encryption_key;
    use crate::keys::generate_session_key;

    fn key() -> EncryptionKey {
        derive_encryption_key(&generate_session_key()).unwrap()
    }

    #[test]
    fn hello_roundtrip() {
        let k = key();
        let ct = encrypt_message("hello", &k).unwrap();
        assert_eq!(decrypt_message(&ct, &k).unwrap(), "hello");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let k = key();
        let a = encrypt_message("same", &k).unwrap();
        let b = encrypt_message("same", &k).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let ct = encrypt_message("secret", &key()).unwrap();
        assert!(matches!(
            decrypt_message(&ct, &key()),
            Err(CryptoError::AeadDecrypt)
        ));
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let k = key();
        let sealed = encrypt(&k.0, b"tamper me", RELAY_AAD).unwrap();
        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut corrupted = sealed.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    decrypt(&k.0, &corrupted, RELAY_AAD).is_err(),
                    "flip at byte {byte} bit {bit} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn truncated_input_is_an_error_not_a_panic() {
        let k = key();
        let sealed = encrypt(&k.0, b"hello", RELAY_AAD).unwrap();
        let truncated = general_purpose::STANDARD.encode(&sealed[..10]);
        assert!(matches!(
            decrypt_message(&truncated, &k),
            Err(CryptoError::Truncated { len: 10, .. })
        ));
    }

    #[test]
    fn garbage_text_is_rejected() {
        assert!(decrypt_message("not base64 at all!", &key()).is_err());
    }
}
