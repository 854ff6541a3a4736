//! Storage module
//!
//! Typed access to the persisted snapshot parts and the item autosave task.

pub mod snapshot_store;

pub use snapshot_store::{fingerprint, SnapshotStore};
