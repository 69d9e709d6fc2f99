use std::convert::Infallible;

use scribe_ot::{
    Attributes, Client, ClientError, ClientHooks, Cursor, EditorAdapter, EditorClient, SelfMeta, ServerAdapter,
    SyncState, TextEditor, TextOperation, Transformable, UndoError, UndoManager, WrappedOperation,
};

// ── Helpers ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingServer {
    sent: Vec<TextOperation>,
    cursors: Vec<Option<Cursor>>,
}

impl ServerAdapter for RecordingServer {
    type Error = Infallible;

    fn user_id(&self) -> &str {
        "me"
    }

    fn send_operation(&mut self, op: &TextOperation) -> Result<(), Infallible> {
        self.sent.push(op.clone());
        Ok(())
    }

    fn send_cursor(&mut self, cursor: Option<Cursor>) -> Result<(), Infallible> {
        self.cursors.push(cursor);
        Ok(())
    }
}

type Session = EditorClient<TextEditor, RecordingServer>;

fn session() -> Session {
    EditorClient::new(TextEditor::new(), RecordingServer::default())
}

fn type_text(session: &mut Session, pos: usize, text: &str) {
    let (op, inverse) = session.editor_mut().insert_text(pos, text, Attributes::new()).unwrap();
    session.on_change(op, inverse).unwrap();
}

/// A document replica driven directly through the client state machine.
#[derive(Default)]
struct Replica {
    doc: String,
    sent: Vec<TextOperation>,
}

impl ClientHooks<TextOperation> for Replica {
    type Error = ClientError;

    fn send_operation(&mut self, op: &TextOperation) -> Result<(), ClientError> {
        self.sent.push(op.clone());
        Ok(())
    }

    fn apply_operation(&mut self, op: &TextOperation) -> Result<(), ClientError> {
        self.doc = op.apply(&self.doc)?;
        Ok(())
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[test]
fn typing_then_undoing_twice_restores_empty_document() {
    let mut doc = String::new();
    let mut undo: UndoManager<TextOperation> = UndoManager::new();
    for op in [TextOperation::new().insert("hello"), TextOperation::new().retain(5).insert(" world")] {
        undo.add(op.invert(&doc).unwrap(), false).unwrap();
        doc = op.apply(&doc).unwrap();
    }
    assert_eq!(doc, "hello world");

    for _ in 0..2 {
        undo.perform_undo(|manager, op| -> Result<(), UndoError> {
            manager.add(op.invert(&doc)?, false)?;
            doc = op.apply(&doc)?;
            Ok(())
        })
        .unwrap();
    }
    assert_eq!(doc, "");
    assert!(!undo.can_undo());
    assert_eq!(undo.redo_len(), 2);
}

#[test]
fn typing_then_undoing_through_the_editor_client() {
    let mut session = session();
    type_text(&mut session, 0, "hello");
    type_text(&mut session, 5, " world");
    assert_eq!(session.editor().text(), "hello world");
    session.undo().unwrap();
    session.undo().unwrap();
    assert_eq!(session.editor().text(), "");
    assert!(!session.can_undo());
}

#[test]
fn concurrent_inserts_converge() {
    let mut c1 = Client::new();
    let mut c2 = Client::new();
    let mut r1 = Replica {
        doc: "ab".into(),
        ..Replica::default()
    };
    let mut r2 = Replica {
        doc: "ab".into(),
        ..Replica::default()
    };

    let op1 = TextOperation::new().retain(1).insert("X").retain(1);
    r1.doc = op1.apply(&r1.doc).unwrap();
    c1.apply_client(op1.clone(), &mut r1).unwrap();
    let op2 = TextOperation::new().retain(2).insert("Y");
    r2.doc = op2.apply(&r2.doc).unwrap();
    c2.apply_client(op2.clone(), &mut r2).unwrap();
    assert_eq!(r1.doc, "aXb");
    assert_eq!(r2.doc, "abY");

    // The server orders op1 first and rebases op2 onto it.
    let (_, op2_rebased) = op1.transform(&op2).unwrap();
    c1.server_ack(&mut r1).unwrap();
    c2.apply_server(op1, &mut r2).unwrap();
    c1.apply_server(op2_rebased, &mut r1).unwrap();
    c2.server_ack(&mut r2).unwrap();

    assert_eq!(r1.doc, "aXbY");
    assert_eq!(r2.doc, "aXbY");
    assert!(c1.is_synchronized());
    assert!(c2.is_synchronized());
}

#[test]
fn awaiting_client_applies_transformed_remote_operation() {
    let mut client = Client::new();
    let mut replica = Replica {
        doc: "abc".into(),
        ..Replica::default()
    };
    let local = TextOperation::new().insert(">").retain(3);
    replica.doc = local.apply(&replica.doc).unwrap();
    client.apply_client(local.clone(), &mut replica).unwrap();

    let remote = TextOperation::new().retain(3).insert("!");
    client.apply_server(remote.clone(), &mut replica).unwrap();

    let (outstanding, remote_prime) = local.transform(&remote).unwrap();
    assert_ne!(remote_prime, remote);
    assert_eq!(client.state(), &SyncState::AwaitingConfirm(outstanding));
    assert_eq!(replica.doc, ">abc!");
    assert_eq!(replica.sent, vec![local]);
}

#[test]
fn adjacent_typing_collapses_into_one_undo_entry() {
    let mut session = session();
    type_text(&mut session, 0, "a");
    type_text(&mut session, 1, "b");
    type_text(&mut session, 2, "c");
    assert_eq!(session.undo_manager().undo_len(), 1);

    session.undo().unwrap();
    assert_eq!(session.editor().text(), "");
    assert!(!session.can_undo());
    session.redo().unwrap();
    assert_eq!(session.editor().text(), "abc");
}

// ── Editor client ─────────────────────────────────────────────────────────

#[test]
fn local_edits_are_buffered_until_ack() {
    let mut session = session();
    type_text(&mut session, 0, "a");
    type_text(&mut session, 1, "b");
    type_text(&mut session, 2, "c");
    assert_eq!(session.server().sent.len(), 1);

    session.server_ack().unwrap();
    assert_eq!(session.server().sent[1], TextOperation::new().retain(1).insert("bc"));
    session.server_ack().unwrap();
    assert!(session.is_synchronized());
}

#[test]
fn undo_after_remote_edit_targets_moved_text() {
    let mut session = session();
    type_text(&mut session, 0, "abc");
    session.server_ack().unwrap();

    session.apply_server(TextOperation::new().insert("xyz ").retain(3)).unwrap();
    assert_eq!(session.editor().text(), "xyz abc");
    assert_eq!(session.editor().get_cursor(), Some(Cursor::caret(7)));

    session.undo().unwrap();
    assert_eq!(session.editor().text(), "xyz ");
    assert_eq!(session.server().sent.last(), Some(&TextOperation::new().retain(4).delete(3)));
}

#[test]
fn redo_is_dropped_by_new_edits() {
    let mut session = session();
    type_text(&mut session, 0, "ab");
    session.undo().unwrap();
    assert!(session.can_redo());
    type_text(&mut session, 0, "z");
    assert!(!session.can_redo());
}

#[test]
fn cursor_is_withheld_while_buffering() {
    let mut session = session();
    session.on_focus().unwrap();
    let before = session.server().cursors.len();

    type_text(&mut session, 0, "a");
    type_text(&mut session, 1, "b");
    session.editor_mut().set_cursor(Cursor::caret(0));
    session.on_cursor_activity().unwrap();
    assert_eq!(session.server().cursors.len(), before);

    session.server_ack().unwrap();
    session.on_blur().unwrap();
    assert_eq!(session.server().cursors.last(), Some(&None));
}

#[test]
fn remote_cursors_are_validated() {
    let mut session = session();
    type_text(&mut session, 0, "hello");
    session.server_ack().unwrap();

    session.on_remote_cursor("peer", Some(Cursor::new(1, 3)), Some("#00ff00"));
    let drawn = session.editor().other_cursor("peer").cloned().unwrap();
    assert_eq!(drawn.cursor, Cursor::new(1, 3));
    assert_eq!(drawn.color, "#00ff00");

    session.on_remote_cursor("peer", Some(Cursor::caret(99)), None);
    assert!(session.editor().other_cursor("peer").is_none());

    session.on_remote_cursor("stranger", Some(Cursor::caret(1)), Some("blue"));
    assert!(session.editor().other_cursor("stranger").is_none());

    session.on_remote_cursor("me", Some(Cursor::caret(1)), Some("#fff"));
    assert!(session.editor().other_cursor("me").is_none());

    session.on_remote_cursor("peer", Some(Cursor::caret(2)), None);
    assert_eq!(session.editor().other_cursor("peer").map(|o| o.cursor), Some(Cursor::caret(2)));
    session.on_remote_cursor("peer", None, None);
    assert!(session.editor().other_cursor("peer").is_none());
}

#[test]
fn remote_cursors_are_ignored_with_pending_edits() {
    let mut session = session();
    type_text(&mut session, 0, "hello");
    session.on_remote_cursor("peer", Some(Cursor::caret(1)), Some("#123456"));
    assert!(session.editor().other_cursor("peer").is_none());
}

#[test]
fn wrapped_undo_entries_carry_cursors() {
    let mut session = session();
    session.editor_mut().set_cursor(Cursor::caret(0));
    session.on_focus().unwrap();
    type_text(&mut session, 0, "hi");
    let last: &WrappedOperation<SelfMeta> = session.undo_manager().last_undo().unwrap();
    assert_eq!(last.meta, SelfMeta::new(Some(Cursor::caret(2)), Some(Cursor::caret(0))));
    assert!(!last.is_noop());

    session.undo().unwrap();
    assert_eq!(session.editor().get_cursor(), Some(Cursor::caret(0)));
}
