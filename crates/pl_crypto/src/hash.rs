//! Hashing, keyed hashing and comparison helpers. All pure functions.

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Constant-time equality. Length mismatch returns false.
pub fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// HMAC-SHA256 over `data`, hex encoded.
pub fn hmac_sign(key: &[u8], data: &[u8]) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(format!("hmac key: {e}")))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC produced by [`hmac_sign`]. Malformed hex is a mismatch.
pub fn hmac_verify(key: &[u8], data: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// `len` random bytes rendered as lowercase hex (`2 * len` chars).
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_sign_verify() {
        let sig = hmac_sign(b"k", b"payload").unwrap();
        assert!(hmac_verify(b"k", b"payload", &sig));
        assert!(!hmac_verify(b"k", b"payload!", &sig));
        assert!(!hmac_verify(b"other", b"payload", &sig));
        assert!(!hmac_verify(b"k", b"payload", "zz"));
    }

    #[test]
    fn compare() {
        assert!(secure_compare(b"abc", b"abc"));
        assert!(!secure_compare(b"abc", b"abd"));
        assert!(!secure_compare(b"abc", b"abcd"));
    }

    #[test]
    fn random_hex_length() {
        let h = random_hex(8);
        assert_eq!(h.len(), 16);
        assert_ne!(h, random_hex(8));
    }
}
