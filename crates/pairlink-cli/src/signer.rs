//! Throwaway Ed25519 signer so the wallet side can answer requests.
//! The seed sits unencrypted in the data directory; not for real funds.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::Value;
use zeroize::Zeroizing;

use pl_crypto::sha256_hex;
use pl_session::{SignerError, WalletSigner};

pub struct DemoSigner {
    key: SigningKey,
}

impl DemoSigner {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Read the hex seed at `path`, creating one on first use.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = Zeroizing::new(fs::read_to_string(path)?);
            let seed = Zeroizing::new(hex::decode(text.trim()).context("corrupt signer seed")?);
            let seed: [u8; 32] = seed
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("signer seed must be 32 bytes"))?;
            return Ok(Self {
                key: SigningKey::from_bytes(&seed),
            });
        }
        let signer = Self::generate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let seed = Zeroizing::new(hex::encode(signer.key.to_bytes()));
        fs::write(path, seed.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(signer)
    }
}

impl WalletSigner for DemoSigner {
    fn sign_message(&self, message: &[u8]) -> Result<String, SignerError> {
        Ok(hex::encode(self.key.sign(message).to_bytes()))
    }

    fn sign_transaction(&self, transaction: &Value) -> Result<String, SignerError> {
        let bytes = serde_json::to_vec(transaction).map_err(|e| SignerError(e.to_string()))?;
        Ok(hex::encode(self.key.sign(&bytes).to_bytes()))
    }

    fn address(&self) -> String {
        let digest = sha256_hex(self.key.verifying_key().as_bytes());
        format!("pl1{}", &digest[..40])
    }

    fn public_key(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    #[test]
    fn seed_is_reused_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo-signer.key");
        let first = DemoSigner::load_or_create(&path).unwrap();
        let second = DemoSigner::load_or_create(&path).unwrap();
        assert_eq!(first.address(), second.address());
        assert!(first.address().starts_with("pl1"));
        assert_eq!(first.address().len(), 43);
    }

    #[test]
    fn message_signature_verifies() {
        let signer = DemoSigner::generate();
        let sig_hex = signer.sign_message(b"hello").unwrap();
        let sig_bytes: [u8; 64] = hex::decode(sig_hex).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&sig_bytes);
        assert!(signer
            .key
            .verifying_key()
            .verify(b"hello", &signature)
            .is_ok());
    }
}
