//! Request bookkeeping for both roles.
//!
//! The wallet keeps a `PendingRequests` book: inserted by the driver task
//! when a request arrives, removed by the host through approve/reject. Every
//! id moves pending -> resolved at most once. The dApp keeps an
//! `OutstandingRequests` book so each response is matched to exactly one
//! request of the same kind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use pl_proto::RequestKind;

use crate::error::SessionError;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub id: String,
    pub kind: RequestKind,
    pub data: Value,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub id: String,
    pub kind: RequestKind,
    pub approved: bool,
    pub result: Option<Value>,
    pub reason: Option<String>,
}

#[derive(Default)]
struct PendingBook {
    pending: HashMap<String, SignRequest>,
    resolved: HashSet<String>,
}

#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    inner: Arc<Mutex<PendingBook>>,
}

impl PendingRequests {
    pub fn insert(&self, request: SignRequest) -> Result<(), SessionError> {
        let mut book = self.inner.lock();
        if book.resolved.contains(&request.id) || book.pending.contains_key(&request.id) {
            return Err(SessionError::Protocol(format!(
                "duplicate request id {}",
                request.id
            )));
        }
        book.pending.insert(request.id.clone(), request);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<SignRequest> {
        self.inner.lock().pending.get(id).cloned()
    }

    /// Remove and mark resolved. Lookup and removal happen under one lock.
    pub fn take(&self, id: &str) -> Option<SignRequest> {
        let mut book = self.inner.lock();
        let request = book.pending.remove(id)?;
        book.resolved.insert(request.id.clone());
        Some(request)
    }

    /// Undo a `take` whose response never left.
    pub fn restore(&self, request: SignRequest) {
        let mut book = self.inner.lock();
        book.resolved.remove(&request.id);
        book.pending.insert(request.id.clone(), request);
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<SignRequest> {
        let mut requests: Vec<_> = self.inner.lock().pending.values().cloned().collect();
        requests.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        requests
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Ids that were approved or rejected, sorted.
    pub fn resolved_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.lock().resolved.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Seed the replay guard, e.g. from a restored record.
    pub fn remember_resolved(&self, ids: impl IntoIterator<Item = String>) {
        self.inner.lock().resolved.extend(ids);
    }

    pub fn clear(&self) {
        let mut book = self.inner.lock();
        book.pending.clear();
        book.resolved.clear();
    }
}

#[derive(Default)]
struct OutstandingBook {
    waiting: HashMap<String, RequestKind>,
}

#[derive(Clone, Default)]
pub(crate) struct OutstandingRequests {
    inner: Arc<Mutex<OutstandingBook>>,
}

impl OutstandingRequests {
    pub fn register(&self, id: &str, kind: RequestKind) {
        self.inner.lock().waiting.insert(id.to_string(), kind);
    }

    pub fn forget(&self, id: &str) {
        self.inner.lock().waiting.remove(id);
    }

    /// Match a response to its request. Unknown, answered, or mismatched ids
    /// are protocol errors and leave the book untouched.
    pub fn resolve(&self, id: &str, kind: RequestKind) -> Result<(), SessionError> {
        let mut book = self.inner.lock();
        match book.waiting.get(id) {
            Some(expected) if *expected == kind => {
                book.waiting.remove(id);
                Ok(())
            }
            Some(expected) => Err(SessionError::Protocol(format!(
                "response kind {kind:?} does not match request {id} ({expected:?})"
            ))),
            None => Err(SessionError::Protocol(format!(
                "response for unknown request {id}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    pub fn clear(&self) {
        self.inner.lock().waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: &str) -> SignRequest {
        SignRequest {
            id: id.into(),
            kind: RequestKind::Transaction,
            data: json!({"to": "x"}),
            origin: "test".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn take_is_at_most_once() {
        let book = PendingRequests::default();
        book.insert(request("a")).unwrap();
        assert!(book.take("a").is_some());
        assert!(book.take("a").is_none());
        assert_eq!(book.len(), 0);
    }

    #[test]
    fn replayed_ids_are_refused() {
        let book = PendingRequests::default();
        book.insert(request("a")).unwrap();
        assert!(matches!(book.insert(request("a")), Err(SessionError::Protocol(_))));
        book.take("a");
        assert!(matches!(book.insert(request("a")), Err(SessionError::Protocol(_))));
    }

    #[test]
    fn remembered_ids_are_refused() {
        let book = PendingRequests::default();
        book.insert(request("a")).unwrap();
        book.take("a");
        let answered = book.resolved_ids();
        assert_eq!(answered, vec!["a".to_string()]);

        let restored = PendingRequests::default();
        restored.remember_resolved(answered);
        assert!(matches!(restored.insert(request("a")), Err(SessionError::Protocol(_))));
        restored.insert(request("b")).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn restore_puts_request_back() {
        let book = PendingRequests::default();
        book.insert(request("a")).unwrap();
        let taken = book.take("a").unwrap();
        book.restore(taken);
        assert_eq!(book.list().len(), 1);
        assert!(book.take("a").is_some());
    }

    #[test]
    fn outstanding_matches_kind_once() {
        let book = OutstandingRequests::default();
        book.register("r1", RequestKind::Message);
        assert!(book.resolve("r1", RequestKind::Transaction).is_err());
        assert_eq!(book.len(), 1);
        book.resolve("r1", RequestKind::Message).unwrap();
        assert!(book.resolve("r1", RequestKind::Message).is_err());
        assert_eq!(book.len(), 0);
    }
}
