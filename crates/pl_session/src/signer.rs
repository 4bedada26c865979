//! Seam to the key-holding signer. Key management lives outside this crate.

use serde_json::{json, Value};
use thiserror::Error;

use pl_proto::RequestKind;

use crate::error::SessionError;
use crate::requests::SignRequest;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SignerError(pub String);

pub trait WalletSigner: Send + Sync {
    fn sign_message(&self, message: &[u8]) -> Result<String, SignerError>;
    fn sign_transaction(&self, transaction: &Value) -> Result<String, SignerError>;
    fn address(&self) -> String;
    fn public_key(&self) -> String;
}

/// Approval result for `request`, produced by `signer`.
///
/// - connect: `{address, publicKey}`
/// - message: `{signature, address}`; the text is read from `data.message`
/// - transaction: `{signature, address}` over the `data` value
pub fn build_approval(
    request: &SignRequest,
    signer: &dyn WalletSigner,
) -> Result<Value, SessionError> {
    match request.kind {
        RequestKind::Connect => Ok(json!({
            "address": signer.address(),
            "publicKey": signer.public_key(),
        })),
        RequestKind::Message => {
            let text = request
                .data
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SessionError::Protocol(format!("request {} has no message text", request.id))
                })?;
            let signature = signer.sign_message(text.as_bytes())?;
            Ok(json!({ "signature": signature, "address": signer.address() }))
        }
        RequestKind::Transaction => {
            let signature = signer.sign_transaction(&request.data)?;
            Ok(json!({ "signature": signature, "address": signer.address() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FixedSigner;

    impl WalletSigner for FixedSigner {
        fn sign_message(&self, message: &[u8]) -> Result<String, SignerError> {
            Ok(format!("msg:{}", message.len()))
        }
        fn sign_transaction(&self, _transaction: &Value) -> Result<String, SignerError> {
            Err(SignerError("locked".into()))
        }
        fn address(&self) -> String {
            "addr1".into()
        }
        fn public_key(&self) -> String {
            "pk1".into()
        }
    }

    fn request(kind: RequestKind, data: Value) -> SignRequest {
        SignRequest {
            id: "r".into(),
            kind,
            data,
            origin: "o".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn approvals_by_kind() {
        let connect = build_approval(&request(RequestKind::Connect, Value::Null), &FixedSigner).unwrap();
        assert_eq!(connect["address"], "addr1");
        assert_eq!(connect["publicKey"], "pk1");

        let message = build_approval(
            &request(RequestKind::Message, json!({"message": "hello"})),
            &FixedSigner,
        )
        .unwrap();
        assert_eq!(message["signature"], "msg:5");

        assert!(matches!(
            build_approval(&request(RequestKind::Message, json!({})), &FixedSigner),
            Err(SessionError::Protocol(_))
        ));
        assert!(matches!(
            build_approval(&request(RequestKind::Transaction, json!({})), &FixedSigner),
            Err(SessionError::Signer(_))
        ));
    }
}
