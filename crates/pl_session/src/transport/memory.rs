//! In-process relay for tests and local demos.
//!
//! Behaves like the real relay (frames fan out to every other peer on the
//! same session id) and adds knobs to simulate failure: refuse new
//! connections, drop every link of a session, inject raw frames.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Connector, RelayConnection, TransportError, TransportEvent};

struct Peer {
    id: u64,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

struct RelayState {
    accepting: bool,
    next_peer: u64,
    connect_attempts: usize,
    sessions: HashMap<String, Vec<Peer>>,
}

#[derive(Clone)]
pub struct MemoryRelay {
    state: Arc<Mutex<RelayState>>,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                accepting: true,
                next_peer: 0,
                connect_attempts: 0,
                sessions: HashMap::new(),
            })),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// While false every connect attempt fails (and is still counted).
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn peer_count(&self, session_id: &str) -> usize {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map_or(0, Vec::len)
    }

    /// Close every link on `session_id`, as if the relay restarted.
    pub fn drop_session(&self, session_id: &str) {
        let peers = self.state.lock().sessions.remove(session_id);
        for peer in peers.into_iter().flatten() {
            let _ = peer.inbound.send(TransportEvent::Closed);
        }
        debug!(session_id, "memory relay dropped session");
    }

    /// Deliver a raw frame to every peer on `session_id`. Returns how many
    /// peers received it.
    pub fn inject(&self, session_id: &str, frame: &str) -> usize {
        let state = self.state.lock();
        state.sessions.get(session_id).map_or(0, |peers| {
            peers
                .iter()
                .filter(|p| p.inbound.send(TransportEvent::Message(frame.to_string())).is_ok())
                .count()
        })
    }
}

#[async_trait]
impl Connector for MemoryRelay {
    async fn connect(
        &self,
        relay_address: &str,
        session_id: &str,
    ) -> Result<RelayConnection, TransportError> {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let peer_id = {
            let mut state = self.state.lock();
            state.connect_attempts += 1;
            if !state.accepting {
                return Err(TransportError::Refused(relay_address.to_string()));
            }
            let id = state.next_peer;
            state.next_peer += 1;
            state
                .sessions
                .entry(session_id.to_string())
                .or_default()
                .push(Peer { id, inbound: in_tx });
            id
        };

        let state = Arc::clone(&self.state);
        let session = session_id.to_string();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let guard = state.lock();
                let Some(peers) = guard.sessions.get(&session) else {
                    break;
                };
                if !peers.iter().any(|p| p.id == peer_id) {
                    break;
                }
                for peer in peers.iter().filter(|p| p.id != peer_id) {
                    let _ = peer.inbound.send(TransportEvent::Message(frame.clone()));
                }
                trace!(session_id = %session, peer_id, "frame relayed");
            }

            let mut guard = state.lock();
            if let Some(peers) = guard.sessions.get_mut(&session) {
                peers.retain(|p| p.id != peer_id);
                if peers.is_empty() {
                    guard.sessions.remove(&session);
                }
            }
        });

        Ok(RelayConnection::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_the_other_peer_only() {
        let relay = MemoryRelay::new();
        let mut a = relay.connect("mem://", "s1").await.unwrap();
        let mut b = relay.connect("mem://", "s1").await.unwrap();
        let _other = relay.connect("mem://", "s2").await.unwrap();

        a.send("hi".into()).unwrap();
        assert_eq!(b.recv().await, Some(TransportEvent::Message("hi".into())));
        b.send("yo".into()).unwrap();
        assert_eq!(a.recv().await, Some(TransportEvent::Message("yo".into())));
        assert_eq!(relay.peer_count("s1"), 2);
    }

    #[tokio::test]
    async fn refused_connects_are_counted() {
        let relay = MemoryRelay::new();
        relay.set_accepting(false);
        assert!(matches!(
            relay.connect("mem://", "s").await,
            Err(TransportError::Refused(_))
        ));
        assert_eq!(relay.connect_attempts(), 1);
        assert_eq!(relay.peer_count("s"), 0);
    }

    #[tokio::test]
    async fn drop_session_closes_links() {
        let relay = MemoryRelay::new();
        let mut a = relay.connect("mem://", "s").await.unwrap();
        relay.drop_session("s");
        assert_eq!(a.recv().await, Some(TransportEvent::Closed));
        assert_eq!(relay.peer_count("s"), 0);
    }
}
