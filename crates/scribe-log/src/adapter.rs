//! Turns an unordered revision store into an ordered operation stream.
//!
//! Every revision is stored under [`revision_to_id`] of its number. Revisions
//! may be delivered in any order; they are buffered until the next expected
//! id arrives and then folded into the composed document one by one. A local
//! operation is written with create-if-absent at the next id: if it lands
//! there the adapter reports [`AdapterEvent::Ack`], if somebody else got
//! there first it reports [`AdapterEvent::Retry`] once it has caught up.

use std::collections::{BTreeMap, VecDeque};

use scribe_ot::{Cursor, EditorAdapter, EditorClient, EditorClientError, OperationError, ServerAdapter, TextOperation};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::presence::{color_for_user, generate_user_id};
use crate::records::{Checkpoint, InvalidRevision, PresenceRecord, Revision};
use crate::revision_id::{revision_from_id, revision_to_id, RevisionIdError};
use crate::store::{RevisionStore, StoreError, StoreEvent};

pub const DEFAULT_CHECKPOINT_FREQUENCY: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterConfig {
    /// Write a checkpoint every this many revisions. `0` disables checkpoints.
    pub checkpoint_frequency: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            checkpoint_frequency: DEFAULT_CHECKPOINT_FREQUENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// Initial history is loaded and local operations may be sent.
    Ready,
    /// A peer's operation, in log order.
    Operation(TextOperation),
    /// Our in-flight operation was committed.
    Ack,
    /// Our in-flight operation lost its slot; send the outstanding one again.
    Retry,
    /// A peer's cursor moved or went away.
    Cursor {
        user_id: String,
        cursor: Option<Cursor>,
        color: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("operation applies to {actual} characters, document has {expected}")]
    BaseLengthMismatch { expected: usize, actual: usize },
    #[error("adapter has been disposed")]
    Disposed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    RevisionId(#[from] RevisionIdError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct InFlight {
    id: String,
    operation: TextOperation,
}

pub struct RevisionLogAdapter<S: RevisionStore> {
    store: S,
    config: AdapterConfig,
    presence: PresenceRecord,
    /// Composition of every folded revision.
    document: TextOperation,
    /// Number of the next revision to fold.
    revision: u64,
    pending: BTreeMap<String, Value>,
    sent: Option<InFlight>,
    /// Revision write that hit a disconnect, resent on the next `Connected`.
    unsent_write: Option<(String, Value)>,
    ready: bool,
    retry_on_ready: bool,
    disposed: bool,
    events: VecDeque<AdapterEvent>,
}

impl<S: RevisionStore> RevisionLogAdapter<S> {
    /// An adapter with a freshly generated user id.
    pub fn new(store: S, config: AdapterConfig) -> Self {
        Self::with_user_id(store, &generate_user_id(), config)
    }

    pub fn with_user_id(store: S, user_id: &str, config: AdapterConfig) -> Self {
        Self {
            store,
            config,
            presence: PresenceRecord {
                id: user_id.to_owned(),
                color: Some(color_for_user(user_id)),
                ..PresenceRecord::default()
            },
            document: TextOperation::new(),
            revision: 0,
            pending: BTreeMap::new(),
            sent: None,
            unsent_write: None,
            ready: false,
            retry_on_ready: false,
            disposed: false,
            events: VecDeque::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn user_id(&self) -> &str {
        &self.presence.id
    }

    pub fn color(&self) -> Option<&str> {
        self.presence.color.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of the next revision to be folded.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_history_empty(&self) -> bool {
        self.revision == 0
    }

    /// The whole document as one insert-only operation.
    pub fn document(&self) -> &TextOperation {
        &self.document
    }

    pub fn document_text(&self) -> Result<String, OperationError> {
        self.document.apply("")
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<AdapterEvent> {
        self.events.drain(..).collect()
    }

    /// Loads the checkpoint and the history after it, then publishes our
    /// presence. Emits the loaded document as one `Operation`, then `Ready`.
    pub fn start(&mut self) -> Result<(), LogError> {
        if self.disposed {
            return Err(LogError::Disposed);
        }
        if self.ready {
            return Ok(());
        }
        if let Some(value) = self.store.load_checkpoint()? {
            match parse_checkpoint(value) {
                Ok((revision, checkpoint)) => {
                    debug!(id = %checkpoint.id, "loaded checkpoint");
                    self.document = checkpoint.operation;
                    self.revision = revision + 1;
                }
                Err(reason) => warn!(%reason, "ignoring unusable checkpoint"),
            }
        }
        for (id, value) in self.store.load_history(&revision_to_id(self.revision))? {
            self.queue_revision(id, value);
        }
        self.fold_pending()?;

        self.ready = true;
        self.events.push_back(AdapterEvent::Operation(self.document.clone()));
        self.events.push_back(AdapterEvent::Ready);
        if self.retry_on_ready {
            self.retry_on_ready = false;
            self.events.push_back(AdapterEvent::Retry);
        }

        self.publish_presence()?;
        for (user_id, value) in self.store.load_presence()? {
            self.remote_presence(user_id, &value);
        }
        Ok(())
    }

    /// Handles everything the store delivered since the last call.
    pub fn poll(&mut self) -> Result<(), LogError> {
        if !self.ready || self.disposed {
            return Ok(());
        }
        for event in self.store.take_events() {
            self.handle_store_event(event)?;
        }
        Ok(())
    }

    pub fn handle_store_event(&mut self, event: StoreEvent) -> Result<(), LogError> {
        match event {
            StoreEvent::Connected => {
                debug!("store reconnected");
                self.publish_presence()?;
                if let Some((id, value)) = self.unsent_write.take() {
                    if self.sent.as_ref().is_some_and(|sent| sent.id == id) {
                        self.transmit(id, value)?;
                    }
                }
                Ok(())
            }
            StoreEvent::RevisionAdded { id, value } => {
                self.queue_revision(id, value);
                self.fold_pending()
            }
            StoreEvent::PresenceChanged { user_id, value } => {
                self.remote_presence(user_id, &value);
                Ok(())
            }
            StoreEvent::PresenceRemoved { user_id } => {
                if user_id != self.presence.id {
                    self.events.push_back(AdapterEvent::Cursor {
                        user_id,
                        cursor: None,
                        color: None,
                    });
                }
                Ok(())
            }
        }
    }

    /// Writes `operation` at the next revision id.
    ///
    /// Before the adapter is ready the send is dropped and a `Retry` follows
    /// `Ready`.
    pub fn send_operation(&mut self, operation: &TextOperation) -> Result<(), LogError> {
        if self.disposed {
            return Err(LogError::Disposed);
        }
        if !self.ready {
            debug!("not ready, deferring send");
            self.retry_on_ready = true;
            return Ok(());
        }
        if operation.base_length() != self.document.target_length() {
            return Err(LogError::BaseLengthMismatch {
                expected: self.document.target_length(),
                actual: operation.base_length(),
            });
        }
        let id = revision_to_id(self.revision);
        self.sent = Some(InFlight {
            id: id.clone(),
            operation: operation.clone(),
        });
        let value = Revision::new_value(&self.presence.id, operation);
        self.transmit(id, value)
    }

    pub fn send_cursor(&mut self, cursor: Option<Cursor>) -> Result<(), LogError> {
        self.presence.cursor = cursor;
        self.publish_presence()
    }

    pub fn set_color(&mut self, color: &str) -> Result<(), LogError> {
        self.presence.color = Some(color.to_owned());
        self.publish_presence()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), LogError> {
        self.presence.name = Some(name.to_owned());
        self.publish_presence()
    }

    /// Moves our presence record to a new user id.
    pub fn set_user_id(&mut self, user_id: &str) -> Result<(), LogError> {
        if self.ready && !self.disposed {
            ignore_disconnect(self.store.remove_presence(&self.presence.id))?;
        }
        self.presence.id = user_id.to_owned();
        self.publish_presence()
    }

    /// Withdraws our presence. The adapter sends nothing afterwards.
    pub fn dispose(&mut self) -> Result<(), LogError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        if self.ready {
            ignore_disconnect(self.store.remove_presence(&self.presence.id))?;
        }
        Ok(())
    }

    fn queue_revision(&mut self, id: String, value: Value) {
        match revision_from_id(&id) {
            Ok(n) if n < self.revision => {}
            Ok(_) => {
                self.pending.insert(id, value);
            }
            Err(err) => warn!(%id, error = %err, "ignoring revision with a malformed id"),
        }
    }

    fn fold_pending(&mut self) -> Result<(), LogError> {
        let mut retry = false;
        loop {
            let id = revision_to_id(self.revision);
            let Some(value) = self.pending.remove(&id) else {
                break;
            };
            self.revision += 1;
            let in_flight = self.sent.as_ref().filter(|sent| sent.id == id);

            let revision = match self.parse_revision(&id, &value) {
                Ok(revision) => revision,
                Err(reason) => {
                    warn!(%id, %reason, "skipping invalid revision");
                    retry |= in_flight.is_some();
                    continue;
                }
            };
            match self.document.compose(&revision.operation) {
                Ok(document) => self.document = document,
                Err(err) => {
                    warn!(%id, error = %err, "skipping revision that does not compose");
                    retry |= in_flight.is_some();
                    continue;
                }
            }

            let acked = in_flight.is_some_and(|sent| {
                revision.author == self.presence.id && sent.operation == revision.operation
            });
            if acked {
                debug!(%id, "revision acknowledged");
                self.sent = None;
                self.unsent_write = None;
                self.events.push_back(AdapterEvent::Ack);
                self.maybe_checkpoint(&id)?;
            } else {
                retry |= in_flight.is_some();
                if self.ready {
                    self.events.push_back(AdapterEvent::Operation(revision.operation));
                }
            }
        }
        if retry {
            debug!("in-flight revision lost its slot");
            self.sent = None;
            self.unsent_write = None;
            self.events.push_back(AdapterEvent::Retry);
        }
        Ok(())
    }

    fn parse_revision(&self, id: &str, value: &Value) -> Result<Revision, InvalidRevision> {
        let revision = Revision::parse(id, value)?;
        if revision.operation.base_length() != self.document.target_length() {
            return Err(InvalidRevision::BaseLength {
                expected: self.document.target_length(),
                actual: revision.operation.base_length(),
            });
        }
        Ok(revision)
    }

    fn transmit(&mut self, id: String, value: Value) -> Result<(), LogError> {
        match self.store.create_revision_if_absent(&id, value.clone()) {
            Ok(written) => {
                debug!(%id, written, "revision transmitted");
                Ok(())
            }
            Err(StoreError::Disconnected) => {
                debug!(%id, "disconnected while writing, will resend");
                self.unsent_write = Some((id, value));
                Ok(())
            }
            Err(err) => {
                error!(%id, error = %err, "revision write failed");
                Err(err.into())
            }
        }
    }

    /// `id` is the revision just acknowledged; `self.revision` already
    /// counts it.
    fn maybe_checkpoint(&mut self, id: &str) -> Result<(), LogError> {
        let frequency = self.config.checkpoint_frequency;
        if frequency == 0 || self.revision % frequency != 0 {
            return Ok(());
        }
        let checkpoint = Checkpoint {
            id: id.to_owned(),
            author: self.presence.id.clone(),
            operation: self.document.clone(),
        };
        let value = serde_json::to_value(&checkpoint)?;
        match self.store.put_checkpoint(value) {
            Ok(()) => {
                debug!(%id, "checkpoint written");
                Ok(())
            }
            Err(StoreError::Disconnected) => {
                debug!(%id, "disconnected, checkpoint skipped");
                Ok(())
            }
            Err(err) => {
                error!(%id, error = %err, "checkpoint write failed");
                Err(err.into())
            }
        }
    }

    fn publish_presence(&mut self) -> Result<(), LogError> {
        if !self.ready || self.disposed {
            return Ok(());
        }
        let value = self.presence.to_value();
        ignore_disconnect(self.store.put_presence(&self.presence.id, value))
    }

    fn remote_presence(&mut self, user_id: String, value: &Value) {
        if user_id == self.presence.id {
            return;
        }
        let record = PresenceRecord::parse_lenient(&user_id, value);
        self.events.push_back(AdapterEvent::Cursor {
            user_id,
            cursor: record.cursor,
            color: record.color,
        });
    }
}

fn parse_checkpoint(value: Value) -> Result<(u64, Checkpoint), String> {
    let checkpoint: Checkpoint = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let revision = revision_from_id(&checkpoint.id).map_err(|e| e.to_string())?;
    if checkpoint.operation.base_length() != 0 {
        return Err(format!(
            "checkpoint operation expects a {}-character document",
            checkpoint.operation.base_length()
        ));
    }
    Ok((revision, checkpoint))
}

/// Presence writes are re-published on reconnect, so a disconnect is not
/// an error for them.
fn ignore_disconnect(result: Result<(), StoreError>) -> Result<(), LogError> {
    match result {
        Ok(()) | Err(StoreError::Disconnected) => Ok(()),
        Err(err) => {
            error!(error = %err, "presence write failed");
            Err(err.into())
        }
    }
}

impl<S: RevisionStore> ServerAdapter for RevisionLogAdapter<S> {
    type Error = LogError;

    fn user_id(&self) -> &str {
        &self.presence.id
    }

    fn send_operation(&mut self, op: &TextOperation) -> Result<(), LogError> {
        RevisionLogAdapter::send_operation(self, op)
    }

    fn send_cursor(&mut self, cursor: Option<Cursor>) -> Result<(), LogError> {
        RevisionLogAdapter::send_cursor(self, cursor)
    }
}

/// Feeds adapter events into an editor client until the store goes quiet.
pub fn sync<E, S>(client: &mut EditorClient<E, RevisionLogAdapter<S>>) -> Result<(), EditorClientError<E::Error, LogError>>
where
    E: EditorAdapter,
    S: RevisionStore,
{
    loop {
        client.server_mut().poll().map_err(EditorClientError::Server)?;
        let events = client.server_mut().drain_events();
        if events.is_empty() {
            return Ok(());
        }
        for event in events {
            match event {
                AdapterEvent::Ready => {}
                AdapterEvent::Operation(op) => client.apply_server(op)?,
                AdapterEvent::Ack => client.server_ack()?,
                AdapterEvent::Retry => client.server_retry()?,
                AdapterEvent::Cursor { user_id, cursor, color } => {
                    client.on_remote_cursor(&user_id, cursor, color.as_deref())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use serde_json::json;

    fn started(hub: &MemoryHub, user_id: &str) -> RevisionLogAdapter<crate::memory::MemoryStore> {
        let mut adapter = RevisionLogAdapter::with_user_id(hub.connect(), user_id, AdapterConfig::default());
        adapter.start().unwrap();
        adapter
    }

    #[test]
    fn config_defaults() {
        let config: AdapterConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.checkpoint_frequency, DEFAULT_CHECKPOINT_FREQUENCY);
        let config: AdapterConfig = serde_json::from_value(json!({"checkpointFrequency": 5})).unwrap();
        assert_eq!(config.checkpoint_frequency, 5);
    }

    #[test]
    fn empty_log_starts_empty() {
        let hub = MemoryHub::new();
        let mut adapter = started(&hub, "alice");
        assert_eq!(
            adapter.drain_events(),
            vec![AdapterEvent::Operation(TextOperation::new()), AdapterEvent::Ready]
        );
        assert!(adapter.is_history_empty());
        assert_eq!(hub.presence("alice").unwrap()["color"], json!(color_for_user("alice")));
    }

    #[test]
    fn own_write_is_acknowledged() {
        let hub = MemoryHub::new();
        let mut adapter = started(&hub, "alice");
        adapter.drain_events();

        let op = TextOperation::new().insert("hi");
        adapter.send_operation(&op).unwrap();
        adapter.poll().unwrap();
        assert_eq!(adapter.drain_events(), vec![AdapterEvent::Ack]);
        assert_eq!(adapter.revision(), 1);
        assert_eq!(adapter.document_text().unwrap(), "hi");
    }

    #[test]
    fn stale_base_is_rejected() {
        let hub = MemoryHub::new();
        let mut adapter = started(&hub, "alice");
        let err = adapter.send_operation(&TextOperation::new().retain(3)).unwrap_err();
        assert!(matches!(err, LogError::BaseLengthMismatch { expected: 0, actual: 3 }));
    }

    #[test]
    fn send_before_ready_retries_after_ready() {
        let hub = MemoryHub::new();
        let mut adapter = RevisionLogAdapter::with_user_id(hub.connect(), "alice", AdapterConfig::default());
        adapter.send_operation(&TextOperation::new().insert("x")).unwrap();
        assert_eq!(hub.history_len(), 0);
        adapter.start().unwrap();
        assert_eq!(adapter.drain_events().last(), Some(&AdapterEvent::Retry));
    }

    #[test]
    fn disposed_adapter_refuses_to_send() {
        let hub = MemoryHub::new();
        let mut adapter = started(&hub, "alice");
        adapter.dispose().unwrap();
        assert_eq!(hub.presence("alice"), None);
        assert!(matches!(
            adapter.send_operation(&TextOperation::new().insert("x")),
            Err(LogError::Disposed)
        ));
    }

    #[test]
    fn renaming_moves_presence() {
        let hub = MemoryHub::new();
        let mut adapter = started(&hub, "alice");
        adapter.set_user_id("carol").unwrap();
        assert_eq!(hub.presence("alice"), None);
        assert_eq!(hub.presence("carol").unwrap()["id"], json!("carol"));
    }

    #[test]
    fn unusable_checkpoint_is_ignored() {
        let hub = MemoryHub::from_export(&json!({
            "checkpoint": {"id": "nope", "a": "x", "o": ["zzz"]},
            "history": {"A0": {"a": "x", "o": ["ok"]}}
        }))
        .unwrap();
        let adapter = started(&hub, "alice");
        assert_eq!(adapter.document_text().unwrap(), "ok");
    }
}
