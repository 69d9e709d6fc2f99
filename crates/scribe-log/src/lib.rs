//! Revision log for scribe documents.
//!
//! Operations are persisted in a key-value store under sortable revision ids
//! ([`revision_id`]). The [`RevisionLogAdapter`] folds them back into an
//! ordered stream for the editor client, writes periodic checkpoints, and
//! relays cursor presence. [`MemoryHub`] is an in-process store used by the
//! replay tool and the tests.

pub mod adapter;
pub mod memory;
pub mod presence;
pub mod records;
pub mod revision_id;
pub mod store;

pub use adapter::{sync, AdapterConfig, AdapterEvent, LogError, RevisionLogAdapter, DEFAULT_CHECKPOINT_FREQUENCY};
pub use memory::{MemoryHub, MemoryStore};
pub use presence::{color_for_user, generate_user_id};
pub use records::{Checkpoint, InvalidRevision, PresenceRecord, Revision};
pub use revision_id::{revision_from_id, revision_to_id, RevisionIdError};
pub use store::{RevisionStore, StoreError, StoreEvent};
