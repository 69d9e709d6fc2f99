//! The key-value revision store the adapter runs on.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The connection dropped; the request may or may not have landed.
    #[error("store disconnected")]
    Disconnected,
    #[error("store failure: {0}")]
    Backend(String),
}

/// Change notifications pushed by the store, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The connection (re)opened.
    Connected,
    RevisionAdded { id: String, value: Value },
    PresenceChanged { user_id: String, value: Value },
    PresenceRemoved { user_id: String },
}

/// An ordered key-value store with per-key create-if-absent writes and
/// change subscriptions.
///
/// Revisions live under sortable ids (see [`crate::revision_id`]). Presence
/// records belong to the session that wrote them and disappear when it
/// disconnects.
pub trait RevisionStore {
    fn load_checkpoint(&mut self) -> Result<Option<Value>, StoreError>;

    /// Revisions with id `>= from_id`, in id order.
    fn load_history(&mut self, from_id: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Writes `value` at `id` unless a revision is already there. Returns
    /// whether this call wrote it.
    fn create_revision_if_absent(&mut self, id: &str, value: Value) -> Result<bool, StoreError>;

    fn put_checkpoint(&mut self, value: Value) -> Result<(), StoreError>;

    /// Presence records currently published, by user id.
    fn load_presence(&mut self) -> Result<Vec<(String, Value)>, StoreError>;

    fn put_presence(&mut self, user_id: &str, value: Value) -> Result<(), StoreError>;

    fn remove_presence(&mut self, user_id: &str) -> Result<(), StoreError>;

    /// Events delivered since the last call.
    fn take_events(&mut self) -> Vec<StoreEvent>;
}
