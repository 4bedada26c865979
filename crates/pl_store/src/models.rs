//! Persisted record models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use pl_crypto::SessionKey;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// Base64 session key, same encoding as the pairing code.
    pub session_key: String,
    pub relay_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Request ids already answered on this session, so a replayed request
    /// frame is refused after a restore too.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_requests: Vec<String>,
}

impl SessionRecord {
    pub fn new(session_id: &str, session_key: &SessionKey, relay_address: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            session_key: session_key.encode(),
            relay_address: relay_address.to_string(),
            peer_address: None,
            created_at: now,
            last_activity: now,
            resolved_requests: Vec::new(),
        }
    }

    pub fn decode_key(&self) -> Result<SessionKey, StoreError> {
        Ok(SessionKey::decode(&self.session_key)?)
    }

    /// True once `now - last_activity` exceeds `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.last_activity > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_crypto::generate_session_key;

    #[test]
    fn staleness_window() {
        let mut record = SessionRecord::new(&"a".repeat(32), &generate_session_key(), "wss://r");
        let now = Utc::now();
        record.last_activity = now - Duration::minutes(9);
        assert!(!record.is_stale(now, Duration::minutes(10)));
        record.last_activity = now - Duration::minutes(11);
        assert!(record.is_stale(now, Duration::minutes(10)));
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let record = SessionRecord::new(&"a".repeat(32), &generate_session_key(), "wss://r");
        let value = serde_json::to_value(&record).unwrap();
        for field in ["sessionId", "sessionKey", "relayAddress", "createdAt", "lastActivity"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert!(value.get("peerAddress").is_none());
        assert!(value.get("resolvedRequests").is_none());
    }

    #[test]
    fn records_without_resolved_ids_still_load() {
        let record = SessionRecord::new(&"a".repeat(32), &generate_session_key(), "wss://r");
        let mut value = serde_json::to_value(&record).unwrap();
        value.as_object_mut().unwrap().remove("resolvedRequests");
        let loaded: SessionRecord = serde_json::from_value(value).unwrap();
        assert!(loaded.resolved_requests.is_empty());

        let mut answered = record.clone();
        answered.resolved_requests = vec!["r1".into()];
        let text = serde_json::to_string(&answered).unwrap();
        assert!(text.contains("\"resolvedRequests\":[\"r1\"]"));
    }
}
