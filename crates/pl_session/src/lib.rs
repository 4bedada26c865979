//! pl_session: relay sessions between a dApp and a wallet
//!
//! Both roles share one driver: a tokio task per session (`driver`) that owns
//! the relay link, runs the lifecycle state machine, sends heartbeats while
//! Active and reconnects with exponential backoff when the link drops.
//! `WalletClient` and `DappInitiator` are thin adapters over it.
//!
//! # Modules
//! - `transport`: `Connector` seam, WebSocket and in-memory relays
//! - `lifecycle`: session states, reconnect policy, backoff
//! - `driver`: the per-session driver task
//! - `client`: wallet role
//! - `initiator`: dApp role
//! - `events`: subscription handles for the host application
//! - `signer`: seam to the key-holding signer

mod driver;

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod initiator;
pub mod lifecycle;
pub mod requests;
pub mod session;
pub mod signer;
pub mod transport;

pub use client::WalletClient;
pub use config::SessionConfig;
pub use error::{ErrorKind, SessionError};
pub use events::{DisconnectReason, ErrorEvent, EventBus, SessionEvent, Subscription};
pub use initiator::{CreatedSession, DappInitiator};
pub use lifecycle::{backoff_delay, Lifecycle, NextStep, ReconnectPolicy, SessionState};
pub use requests::{SignRequest, SignResponse};
pub use session::Session;
pub use signer::{build_approval, SignerError, WalletSigner};
pub use transport::{
    Connector, MemoryRelay, RelayConnection, TransportError, TransportEvent, WebSocketConnector,
};
