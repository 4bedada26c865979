//! Relay transport.
//!
//! A relay forwards opaque text frames between the peers that joined the same
//! session id. It never sees plaintext. A `Connector` opens one duplex
//! `RelayConnection`; the session driver owns it and reconnects through the
//! same connector when it drops.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;
pub mod websocket;

pub use memory::MemoryRelay;
pub use websocket::WebSocketConnector;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid relay address {0}")]
    InvalidAddress(String),

    #[error("relay refused connection: {0}")]
    Refused(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    /// Non-fatal; a `Closed` follows if the link is gone.
    Error(String),
    Closed,
}

/// One open link to the relay. Dropping it closes the link once queued
/// frames have been flushed.
pub struct RelayConnection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl RelayConnection {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    /// `None` means the link's background tasks are gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        relay_address: &str,
        session_id: &str,
    ) -> Result<RelayConnection, TransportError>;
}
