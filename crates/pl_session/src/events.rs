//! Event delivery to the hosting application.
//!
//! Each role adapter owns one `EventBus`. `subscribe` hands out a
//! `Subscription` that receives every event emitted after it was created and
//! unregisters itself when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ErrorKind, SessionError};
use crate::requests::{SignRequest, SignResponse};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// `disconnect()` was called locally.
    Local,
    /// The peer sent SESSION_END.
    PeerEnded,
    /// The relay could not be reached within the reconnect budget.
    ReconnectExhausted,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for ErrorEvent {
    fn from(err: &SessionError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected { session_id: String },
    /// `session_id` is empty when `disconnect()` ran with no session at all.
    Disconnected { session_id: String, reason: DisconnectReason },
    /// Wallet side: a request from the dApp awaiting approve/reject.
    Request(SignRequest),
    /// dApp side: the wallet's answer to one of our requests.
    Response(SignResponse),
    Error(ErrorEvent),
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.senders.insert(id, tx);
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        let mut inner = self.inner.lock();
        inner
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn emit_error(&self, err: &SessionError) {
        self.emit(SessionEvent::Error(ErrorEvent::from(err)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().senders.len()
    }
}

/// Disposer handle: dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    bus: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    /// Next event, or `None` once the owning role has been dropped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().senders.remove(&self.id);
        }
    }
}
