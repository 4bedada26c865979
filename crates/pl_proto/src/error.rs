use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] pl_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Unexpected payload for {message_type}: {reason}")]
    Payload { message_type: String, reason: String },
}
