use serde::Serialize;
use thiserror::Error;

use pl_crypto::CryptoError;
use pl_proto::ProtoError;
use pl_store::StoreError;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid pairing code")]
    Parse,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No pending request with id {0}")]
    NotFound(String),

    #[error("Session is not active")]
    NotActive,

    #[error("Session closed")]
    Closed,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Signer error: {0}")]
    Signer(#[from] crate::signer::SignerError),
}

impl From<ProtoError> for SessionError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Crypto(e) => Self::Crypto(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Coarse classification carried on error events.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Crypto,
    Transport,
    Protocol,
    Timeout,
    NotFound,
    NotActive,
    Closed,
    Store,
    Signer,
    /// An ERROR message sent by the peer.
    Remote,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse => ErrorKind::Parse,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotActive => ErrorKind::NotActive,
            Self::Closed => ErrorKind::Closed,
            Self::Store(_) => ErrorKind::Store,
            Self::Signer(_) => ErrorKind::Signer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_crypto_errors_stay_crypto() {
        let err: SessionError = ProtoError::Crypto(CryptoError::SignatureMismatch).into();
        assert_eq!(err.kind(), ErrorKind::Crypto);

        let err: SessionError = ProtoError::Payload {
            message_type: "ACK".into(),
            reason: "bad".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
