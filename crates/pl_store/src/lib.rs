//! pl_store: local persistence for the live pairing
//!
//! One `SessionRecord` is kept per device under a fixed key so a wallet can
//! resume its pairing after a restart. The record is cleared on disconnect,
//! on terminal reconnection failure, and when it is older than the max-age
//! window.
//!
//! Backends implement `KeyValueStore`:
//! - `FileStore`: one JSON file per key in a data directory
//! - `MemoryStore`: in-process map, for tests and ephemeral hosts

pub mod error;
pub mod models;
pub mod persist;
pub mod store;

pub use error::StoreError;
pub use models::SessionRecord;
pub use persist::{
    clear_session, load_fresh_session, load_session, save_session, SESSION_STORAGE_KEY,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
