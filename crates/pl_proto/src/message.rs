//! Plaintext message types (inside the encrypted envelope).

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Lifecycle
    SessionInit,
    SessionJoin,
    SessionAck,
    SessionEnd,
    Heartbeat,
    // Requests (initiator -> client)
    ConnectRequest,
    SignMessageRequest,
    SignTxRequest,
    // Responses (client -> initiator)
    ConnectResponse,
    SignMessageResponse,
    SignTxResponse,
    Error,
}

impl MessageType {
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::SessionInit
                | Self::SessionJoin
                | Self::SessionAck
                | Self::SessionEnd
                | Self::Heartbeat
        )
    }

    /// The request kind carried by a request message, if this is one.
    pub fn request_kind(self) -> Option<RequestKind> {
        match self {
            Self::ConnectRequest => Some(RequestKind::Connect),
            Self::SignMessageRequest => Some(RequestKind::Message),
            Self::SignTxRequest => Some(RequestKind::Transaction),
            _ => None,
        }
    }

    /// The request kind answered by a response message, if this is one.
    pub fn response_kind(self) -> Option<RequestKind> {
        match self {
            Self::ConnectResponse => Some(RequestKind::Connect),
            Self::SignMessageResponse => Some(RequestKind::Message),
            Self::SignTxResponse => Some(RequestKind::Transaction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionInit => "SESSION_INIT",
            Self::SessionJoin => "SESSION_JOIN",
            Self::SessionAck => "SESSION_ACK",
            Self::SessionEnd => "SESSION_END",
            Self::Heartbeat => "HEARTBEAT",
            Self::ConnectRequest => "CONNECT_REQUEST",
            Self::SignMessageRequest => "SIGN_MESSAGE_REQUEST",
            Self::SignTxRequest => "SIGN_TX_REQUEST",
            Self::ConnectResponse => "CONNECT_RESPONSE",
            Self::SignMessageResponse => "SIGN_MESSAGE_RESPONSE",
            Self::SignTxResponse => "SIGN_TX_RESPONSE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a pending request asks the wallet to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Connect,
    Message,
    Transaction,
}

impl RequestKind {
    pub fn request_type(self) -> MessageType {
        match self {
            Self::Connect => MessageType::ConnectRequest,
            Self::Message => MessageType::SignMessageRequest,
            Self::Transaction => MessageType::SignTxRequest,
        }
    }

    pub fn response_type(self) -> MessageType {
        match self {
            Self::Connect => MessageType::ConnectResponse,
            Self::Message => MessageType::SignMessageResponse,
            Self::Transaction => MessageType::SignTxResponse,
        }
    }
}

/// Wire envelope. Serialised to JSON, then sealed by `codec::seal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub session_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// HMAC-SHA256 (hex) over `signing_bytes`, set by `codec::seal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl RelayMessage {
    pub fn new(message_type: MessageType, session_id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type,
            session_id: session_id.into(),
            payload,
            timestamp: Utc::now(),
            signature: None,
        }
    }

    pub fn with_payload<T: Serialize>(
        message_type: MessageType,
        session_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ProtoError> {
        Ok(Self::new(
            message_type,
            session_id,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ProtoError::Payload {
            message_type: self.message_type.to_string(),
            reason: e.to_string(),
        })
    }

    /// Canonical bytes covered by the envelope signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        self.signing_bytes_with(&self.payload.to_string())
    }

    /// Like `signing_bytes`, with the payload given as the exact JSON text
    /// that was put on the wire.
    pub fn signing_bytes_with(&self, payload_json: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.message_type.as_str().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(self.session_id.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(self.timestamp.timestamp_millis().to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(payload_json.as_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Dapp,
    Wallet,
}

impl PeerRole {
    /// The lifecycle message a role opens every connection with.
    pub fn hello_type(self) -> MessageType {
        match self {
            Self::Dapp => MessageType::SessionInit,
            Self::Wallet => MessageType::SessionJoin,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dapp => "dapp",
            Self::Wallet => "wallet",
        }
    }
}

/// Payload of SESSION_INIT / SESSION_JOIN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub role: PeerRole,
}

/// Describes the requesting application in a CONNECT_REQUEST.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payload of every *_REQUEST message. `data` is opaque to the protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub id: String,
    pub origin: String,
    #[serde(default)]
    pub data: Value,
}

impl RequestPayload {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin: origin.into(),
            data,
        }
    }
}

/// Payload of every *_RESPONSE message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ResponsePayload {
    pub fn approved(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            approved: true,
            result: Some(result),
            reason: None,
        }
    }

    pub fn rejected(id: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            id: id.into(),
            approved: false,
            result: None,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_match_protocol() {
        let msg = RelayMessage::new(MessageType::SignTxRequest, "ab", json!({}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "SIGN_TX_REQUEST");
        assert_eq!(value["sessionId"], "ab");
        assert!(value["timestamp"].is_i64());
        assert!(value.get("signature").is_none());
    }

    #[test]
    fn request_and_response_kinds_pair_up() {
        for kind in [
            RequestKind::Connect,
            RequestKind::Message,
            RequestKind::Transaction,
        ] {
            assert_eq!(kind.request_type().request_kind(), Some(kind));
            assert_eq!(kind.response_type().response_kind(), Some(kind));
        }
        assert!(MessageType::Heartbeat.is_lifecycle());
        assert_eq!(MessageType::Error.request_kind(), None);
    }

    #[test]
    fn payload_mismatch_is_reported() {
        let msg = RelayMessage::new(MessageType::ConnectRequest, "ab", json!({"nope": 1}));
        let err = msg.payload_as::<RequestPayload>().unwrap_err();
        assert!(matches!(err, ProtoError::Payload { .. }));
    }
}
