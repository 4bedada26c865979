use chrono::{DateTime, Utc};

use pl_crypto::SessionKey;
use pl_store::{SessionRecord, StoreError};

/// The live pairing context shared by both ends.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub session_key: SessionKey,
    pub relay_address: String,
    pub is_connected: bool,
    pub peer_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: String, session_key: SessionKey, relay_address: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            session_key,
            relay_address,
            is_connected: false,
            peer_address: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn from_record(record: &SessionRecord) -> Result<Self, StoreError> {
        Ok(Self {
            session_id: record.session_id.clone(),
            session_key: record.decode_key()?,
            relay_address: record.relay_address.clone(),
            is_connected: false,
            peer_address: record.peer_address.clone(),
            created_at: record.created_at,
            last_activity: record.last_activity,
        })
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            session_key: self.session_key.encode(),
            relay_address: self.relay_address.clone(),
            peer_address: self.peer_address.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            resolved_requests: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_crypto::{generate_session_id, generate_session_key};

    #[test]
    fn record_conversion_keeps_identity() {
        let mut session = Session::new(
            generate_session_id(),
            generate_session_key(),
            "wss://relay.example".into(),
        );
        session.peer_address = Some("addr".into());
        let restored = Session::from_record(&session.to_record()).unwrap();
        assert_eq!(restored.session_id, session.session_id);
        assert_eq!(restored.session_key, session.session_key);
        assert_eq!(restored.peer_address.as_deref(), Some("addr"));
        assert!(!restored.is_connected);
    }
}
