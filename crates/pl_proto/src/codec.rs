//! Wire codec: what actually crosses the relay.
//!
//! seal:  sign (HMAC over canonical fields) -> JSON -> XChaCha20-Poly1305 -> base64
//! open:  base64 -> decrypt -> JSON -> verify signature over the received payload text
//!
//! The signature covers the payload text exactly as the sender serialised it.
//! Anything that fails to open is discarded by the caller before dispatch.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use pl_crypto::{decrypt_message, encrypt_message, hmac_sign, hmac_verify, CryptoError, SessionKeys};

use crate::{
    error::ProtoError,
    message::{MessageType, RelayMessage},
};

/// Inbound envelope with the payload left as raw JSON text.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedEnvelope {
    #[serde(rename = "type")]
    message_type: MessageType,
    session_id: String,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    signature: Option<String>,
}

pub fn seal(message: &RelayMessage, keys: &SessionKeys) -> Result<String, ProtoError> {
    let payload_json = serde_json::to_string(&message.payload)?;
    let mut signed = message.clone();
    signed.signature = Some(hmac_sign(
        keys.mac.as_bytes(),
        &message.signing_bytes_with(&payload_json),
    )?);
    let json = serde_json::to_string(&signed)?;
    Ok(encrypt_message(&json, &keys.encryption)?)
}

pub fn open(ciphertext: &str, keys: &SessionKeys) -> Result<RelayMessage, ProtoError> {
    let json = decrypt_message(ciphertext, &keys.encryption)?;
    let received: ReceivedEnvelope = serde_json::from_str(&json)?;
    let payload_json = received.payload.as_deref().map_or("null", RawValue::get);

    let mut message = RelayMessage::new(received.message_type, received.session_id, Value::Null);
    message.timestamp = received.timestamp;
    if let Some(signature) = &received.signature {
        if !hmac_verify(
            keys.mac.as_bytes(),
            &message.signing_bytes_with(payload_json),
            signature,
        ) {
            return Err(CryptoError::SignatureMismatch.into());
        }
    }
    message.payload = serde_json::from_str(payload_json)?;
    message.signature = received.signature;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use pl_crypto::{encrypt_message, generate_session_key};
    use serde_json::json;

    fn keys() -> SessionKeys {
        SessionKeys::derive(&generate_session_key()).unwrap()
    }

    #[test]
    fn sealed_message_opens_with_same_keys() {
        let keys = keys();
        let msg = RelayMessage::new(MessageType::Heartbeat, "ab", json!({"n": 1}));
        let opened = open(&seal(&msg, &keys).unwrap(), &keys).unwrap();
        assert_eq!(opened.message_type, MessageType::Heartbeat);
        assert_eq!(opened.payload, json!({"n": 1}));
        assert!(opened.signature.is_some());
    }

    #[test]
    fn foreign_keys_cannot_open() {
        let msg = RelayMessage::new(MessageType::Heartbeat, "ab", json!(null));
        let sealed = seal(&msg, &keys()).unwrap();
        assert!(matches!(
            open(&sealed, &keys()),
            Err(ProtoError::Crypto(CryptoError::AeadDecrypt))
        ));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let keys = keys();
        let mut msg = RelayMessage::new(MessageType::SessionAck, "ab", json!({}));
        msg.signature = Some("00".repeat(32));
        let json = serde_json::to_string(&msg).unwrap();
        let ciphertext = encrypt_message(&json, &keys.encryption).unwrap();
        assert!(matches!(
            open(&ciphertext, &keys),
            Err(ProtoError::Crypto(CryptoError::SignatureMismatch))
        ));
    }

    #[test]
    fn float_payloads_verify_and_arrive_unchanged() {
        let keys = keys();
        let mut amounts = vec![0.015000999999999999, 0.1, 1e-7, 123456.789, f64::MAX, -2.5e-300];
        amounts.extend((0..2_000).map(|n| f64::from(n) / 1000.0 + 1e-6 * f64::from(n % 7)));
        for amount in amounts {
            let payload = json!({"to": "addr", "amount": amount, "fees": [amount / 3.0]});
            let msg = RelayMessage::new(MessageType::SignTxRequest, "ab", payload.clone());
            let opened = open(&seal(&msg, &keys).unwrap(), &keys)
                .unwrap_or_else(|e| panic!("amount {amount:?} failed: {e}"));
            assert_eq!(opened.payload, payload, "amount {amount:?} changed in transit");
        }
    }

    #[test]
    fn altered_payload_text_breaks_signature() {
        let keys = keys();
        let msg = RelayMessage::new(MessageType::SignTxRequest, "ab", json!({"amount": 1.5}));
        let plaintext = pl_crypto::decrypt_message(&seal(&msg, &keys).unwrap(), &keys.encryption).unwrap();
        let altered = plaintext.replace("1.5", "1.50");
        let ciphertext = encrypt_message(&altered, &keys.encryption).unwrap();
        assert!(matches!(
            open(&ciphertext, &keys),
            Err(ProtoError::Crypto(CryptoError::SignatureMismatch))
        ));
    }

    #[test]
    fn non_envelope_plaintext_is_rejected() {
        let keys = keys();
        let ciphertext = encrypt_message("{\"hello\":true}", &keys.encryption).unwrap();
        assert!(matches!(
            open(&ciphertext, &keys),
            Err(ProtoError::Serialisation(_))
        ));
    }
}
