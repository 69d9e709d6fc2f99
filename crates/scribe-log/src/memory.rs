//! In-process revision store.
//!
//! A [`MemoryHub`] is the shared backend; every [`MemoryStore`] obtained from
//! [`MemoryHub::connect`] is one client session with its own event inbox.
//! Sessions can be disconnected and reconnected, and their inbox reordered,
//! to exercise the adapter's recovery paths.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use crate::records::is_server_timestamp;
use crate::store::{RevisionStore, StoreError, StoreEvent};

#[derive(Debug, Default)]
struct Session {
    connected: bool,
    inbox: Vec<StoreEvent>,
    fail_after_commit: usize,
}

#[derive(Debug, Default)]
struct Shared {
    checkpoint: Option<Value>,
    history: BTreeMap<String, Value>,
    /// user id -> (owning session, record)
    presence: BTreeMap<String, (u64, Value)>,
    sessions: BTreeMap<u64, Session>,
    next_session: u64,
    clock: i64,
}

impl Shared {
    fn broadcast(&mut self, event: StoreEvent) {
        for session in self.sessions.values_mut() {
            session.inbox.push(event.clone());
        }
    }

    fn resolve_timestamp(&mut self, mut value: Value) -> Value {
        if let Some(t) = value.get_mut("t") {
            if is_server_timestamp(t) {
                self.clock += 1;
                *t = Value::from(self.clock);
            }
        }
        value
    }

    fn drop_presence_of(&mut self, session: u64) {
        let owned: Vec<String> = self
            .presence
            .iter()
            .filter(|(_, (owner, _))| *owner == session)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in owned {
            self.presence.remove(&user_id);
            self.broadcast(StoreEvent::PresenceRemoved { user_id });
        }
    }

    fn session(&mut self, id: u64) -> Result<&mut Session, StoreError> {
        match self.sessions.get_mut(&id) {
            Some(session) if session.connected => Ok(session),
            Some(_) => Err(StoreError::Disconnected),
            None => Err(StoreError::Backend(format!("unknown session {id}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a hub from `{"checkpoint": {...} | null, "history": {"<id>": {...}}}`.
    pub fn from_export(value: &Value) -> Result<MemoryHub, StoreError> {
        let hub = MemoryHub::new();
        {
            let mut shared = hub.shared.borrow_mut();
            shared.checkpoint = value.get("checkpoint").filter(|c| !c.is_null()).cloned();
            match value.get("history") {
                None | Some(Value::Null) => {}
                Some(Value::Object(history)) => {
                    for (id, revision) in history {
                        shared.history.insert(id.clone(), revision.clone());
                    }
                }
                Some(_) => return Err(StoreError::Backend("history must be an object".into())),
            }
        }
        Ok(hub)
    }

    pub fn export(&self) -> Value {
        let shared = self.shared.borrow();
        let history: Map<String, Value> = shared.history.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        json!({ "checkpoint": shared.checkpoint, "history": history })
    }

    /// Opens a new connected session.
    pub fn connect(&self) -> MemoryStore {
        let mut shared = self.shared.borrow_mut();
        let session = shared.next_session;
        shared.next_session += 1;
        shared.sessions.insert(
            session,
            Session {
                connected: true,
                ..Session::default()
            },
        );
        MemoryStore {
            shared: Rc::clone(&self.shared),
            session,
        }
    }

    /// Writes a revision without any checks, overwriting what is there.
    pub fn insert_raw_revision(&self, id: &str, value: Value) {
        let mut shared = self.shared.borrow_mut();
        shared.history.insert(id.to_owned(), value.clone());
        shared.broadcast(StoreEvent::RevisionAdded { id: id.to_owned(), value });
    }

    pub fn history_len(&self) -> usize {
        self.shared.borrow().history.len()
    }

    pub fn revision(&self, id: &str) -> Option<Value> {
        self.shared.borrow().history.get(id).cloned()
    }

    pub fn checkpoint(&self) -> Option<Value> {
        self.shared.borrow().checkpoint.clone()
    }

    pub fn presence(&self, user_id: &str) -> Option<Value> {
        self.shared.borrow().presence.get(user_id).map(|(_, v)| v.clone())
    }
}

/// One client session on a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryStore {
    shared: Rc<RefCell<Shared>>,
    session: u64,
}

impl MemoryStore {
    pub fn hub(&self) -> MemoryHub {
        MemoryHub {
            shared: Rc::clone(&self.shared),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .borrow()
            .sessions
            .get(&self.session)
            .is_some_and(|s| s.connected)
    }

    /// Drops the connection. Presence records written by this session are
    /// removed; events keep queueing and are delivered after reconnecting.
    pub fn disconnect(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if let Some(session) = shared.sessions.get_mut(&self.session) {
            session.connected = false;
        }
        shared.drop_presence_of(self.session);
    }

    pub fn reconnect(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if let Some(session) = shared.sessions.get_mut(&self.session) {
            session.connected = true;
            session.inbox.push(StoreEvent::Connected);
        }
    }

    /// The next `n` successful revision writes commit, then lose the
    /// connection before the caller hears about it.
    pub fn fail_after_commit(&mut self, n: usize) {
        if let Some(session) = self.shared.borrow_mut().sessions.get_mut(&self.session) {
            session.fail_after_commit = n;
        }
    }

    /// Reverses the queued, undelivered events.
    pub fn reverse_pending_events(&mut self) {
        if let Some(session) = self.shared.borrow_mut().sessions.get_mut(&self.session) {
            session.inbox.reverse();
        }
    }
}

impl RevisionStore for MemoryStore {
    fn load_checkpoint(&mut self) -> Result<Option<Value>, StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        Ok(shared.checkpoint.clone())
    }

    fn load_history(&mut self, from_id: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        Ok(shared
            .history
            .range(from_id.to_owned()..)
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect())
    }

    fn create_revision_if_absent(&mut self, id: &str, value: Value) -> Result<bool, StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        if shared.history.contains_key(id) {
            return Ok(false);
        }
        let value = shared.resolve_timestamp(value);
        shared.history.insert(id.to_owned(), value.clone());
        shared.broadcast(StoreEvent::RevisionAdded { id: id.to_owned(), value });

        let session = shared.session(self.session)?;
        if session.fail_after_commit > 0 {
            session.fail_after_commit -= 1;
            session.connected = false;
            shared.drop_presence_of(self.session);
            return Err(StoreError::Disconnected);
        }
        Ok(true)
    }

    fn put_checkpoint(&mut self, value: Value) -> Result<(), StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        shared.checkpoint = Some(value);
        Ok(())
    }

    fn load_presence(&mut self) -> Result<Vec<(String, Value)>, StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        Ok(shared
            .presence
            .iter()
            .map(|(user_id, (_, value))| (user_id.clone(), value.clone()))
            .collect())
    }

    fn put_presence(&mut self, user_id: &str, value: Value) -> Result<(), StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        shared.presence.insert(user_id.to_owned(), (self.session, value.clone()));
        shared.broadcast(StoreEvent::PresenceChanged {
            user_id: user_id.to_owned(),
            value,
        });
        Ok(())
    }

    fn remove_presence(&mut self, user_id: &str) -> Result<(), StoreError> {
        let mut shared = self.shared.borrow_mut();
        shared.session(self.session)?;
        if shared.presence.remove(user_id).is_some() {
            shared.broadcast(StoreEvent::PresenceRemoved {
                user_id: user_id.to_owned(),
            });
        }
        Ok(())
    }

    fn take_events(&mut self) -> Vec<StoreEvent> {
        let mut shared = self.shared.borrow_mut();
        match shared.session(self.session) {
            Ok(session) => std::mem::take(&mut session.inbox),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let mut shared = self.shared.borrow_mut();
        shared.sessions.remove(&self.session);
        shared.drop_presence_of(self.session);
    }
}
