use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::SessionRecord;
use crate::store::KeyValueStore;

pub const SESSION_STORAGE_KEY: &str = "pairlink.session";

pub fn load_session(store: &dyn KeyValueStore) -> Result<Option<SessionRecord>, StoreError> {
    match store.get(SESSION_STORAGE_KEY)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn save_session(store: &dyn KeyValueStore, record: &SessionRecord) -> Result<(), StoreError> {
    let data = serde_json::to_vec(record)?;
    store.set(SESSION_STORAGE_KEY, &data)?;
    debug!(session_id = %record.session_id, "session record saved");
    Ok(())
}

pub fn clear_session(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.remove(SESSION_STORAGE_KEY)
}

/// Load the stored record only if it is within `max_age` of its last
/// activity. A stale or unreadable record is deleted.
pub fn load_fresh_session(
    store: &dyn KeyValueStore,
    max_age: Duration,
) -> Result<Option<SessionRecord>, StoreError> {
    let record = match load_session(store) {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(None),
        Err(StoreError::Serialisation(e)) => {
            info!(error = %e, "discarding unreadable session record");
            clear_session(store)?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if record.is_stale(Utc::now(), max_age) {
        info!(session_id = %record.session_id, "discarding stale session record");
        clear_session(store)?;
        return Ok(None);
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pl_crypto::generate_session_key;

    fn record() -> SessionRecord {
        SessionRecord::new(&"d".repeat(32), &generate_session_key(), "wss://relay.example")
    }

    #[test]
    fn save_load_clear() {
        let store = MemoryStore::new();
        let rec = record();
        save_session(&store, &rec).unwrap();
        assert_eq!(load_session(&store).unwrap(), Some(rec));
        clear_session(&store).unwrap();
        assert_eq!(load_session(&store).unwrap(), None);
    }

    #[test]
    fn stale_record_is_deleted() {
        let store = MemoryStore::new();
        let mut rec = record();
        rec.last_activity = Utc::now() - Duration::minutes(11);
        save_session(&store, &rec).unwrap();

        assert_eq!(load_fresh_session(&store, Duration::minutes(10)).unwrap(), None);
        assert!(!store.contains(SESSION_STORAGE_KEY));
    }

    #[test]
    fn fresh_record_is_kept() {
        let store = MemoryStore::new();
        let rec = record();
        save_session(&store, &rec).unwrap();
        assert_eq!(
            load_fresh_session(&store, Duration::minutes(10)).unwrap(),
            Some(rec)
        );
    }

    #[test]
    fn corrupt_record_is_deleted() {
        let store = MemoryStore::new();
        store.set(SESSION_STORAGE_KEY, b"{not json").unwrap();
        assert_eq!(load_fresh_session(&store, Duration::minutes(10)).unwrap(), None);
        assert!(!store.contains(SESSION_STORAGE_KEY));
    }
}
