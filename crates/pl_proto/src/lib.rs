//! pl_proto: wire types and serialisation for pairlink
//!
//! Everything the relay carries is a `RelayMessage` serialised to JSON and
//! sealed with the channel keys; the relay only ever sees the ciphertext.
//!
//! # Modules
//! - `message`: `MessageType`, `RelayMessage`, typed payloads
//! - `codec`: seal / open: sign, serialise, encrypt (and back)
//! - `pairing`: the pairing code exchanged by scanning or link
//! - `error`: protocol error type

pub mod codec;
pub mod error;
pub mod message;
pub mod pairing;

pub use error::ProtoError;
pub use message::{
    AppInfo, EndPayload, ErrorPayload, HelloPayload, MessageType, PeerRole, RelayMessage,
    RequestKind, RequestPayload, ResponsePayload,
};
pub use pairing::{build_pairing_code, parse_pairing_code, PairingCode};
