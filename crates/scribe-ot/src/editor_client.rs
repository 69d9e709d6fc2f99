//! Glue between an editor binding, the sync client, the undo manager and a
//! server connection.

use std::collections::HashMap;
use std::error::Error as StdError;

use thiserror::Error;
use tracing::debug;

use crate::client::{Client, ClientError, ClientHooks, SyncState};
use crate::cursor::Cursor;
use crate::operation::TextOperation;
use crate::undo_manager::{UndoError, UndoManager};
use crate::wrapped_operation::{SelfMeta, WrappedOperation};

/// What the core needs from an editing widget.
pub trait EditorAdapter {
    type Error: StdError + 'static;

    /// Applies a remote or undo operation to the visible document.
    fn apply_operation(&mut self, op: &TextOperation) -> Result<(), Self::Error>;

    fn get_cursor(&self) -> Option<Cursor>;

    fn set_cursor(&mut self, cursor: Cursor);

    /// Inverse of `op` against the current document, attributes included.
    fn invert_operation(
        &self,
        op: &WrappedOperation<SelfMeta>,
    ) -> Result<WrappedOperation<SelfMeta>, Self::Error>;

    fn set_other_cursor(&mut self, user_id: &str, cursor: Cursor, color: &str);

    fn remove_other_cursor(&mut self, user_id: &str);

    /// Length of the document in characters.
    fn document_len(&self) -> usize;
}

/// What the core needs from the server connection.
pub trait ServerAdapter {
    type Error: StdError + 'static;

    fn user_id(&self) -> &str;

    fn send_operation(&mut self, op: &TextOperation) -> Result<(), Self::Error>;

    fn send_cursor(&mut self, cursor: Option<Cursor>) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum EditorClientError<E: StdError + 'static, S: StdError + 'static> {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Undo(#[from] UndoError),
    #[error("editor: {0}")]
    Editor(#[source] E),
    #[error("server: {0}")]
    Server(#[source] S),
}

/// `#rgb` or `#rrggbb`.
pub fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

type ClientResult<T, E, S> =
    Result<T, EditorClientError<<E as EditorAdapter>::Error, <S as ServerAdapter>::Error>>;

pub struct EditorClient<E: EditorAdapter, S: ServerAdapter> {
    client: Client<TextOperation>,
    undo_manager: UndoManager,
    editor: E,
    server: S,
    cursor: Option<Cursor>,
    focused: bool,
    colors: HashMap<String, String>,
}

impl<E: EditorAdapter, S: ServerAdapter> EditorClient<E, S> {
    pub fn new(editor: E, server: S) -> Self {
        Self::with_undo_manager(editor, server, UndoManager::new())
    }

    pub fn with_undo_manager(editor: E, server: S, undo_manager: UndoManager) -> Self {
        let cursor = editor.get_cursor();
        Self {
            client: Client::new(),
            undo_manager,
            editor,
            server,
            cursor,
            focused: false,
            colors: HashMap::new(),
        }
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut S {
        &mut self.server
    }

    pub fn state(&self) -> &SyncState<TextOperation> {
        self.client.state()
    }

    pub fn is_synchronized(&self) -> bool {
        self.client.is_synchronized()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo_manager
    }

    /// The user changed the document; `op` is already applied to the editor
    /// and `inverse` undoes it.
    pub fn on_change(&mut self, op: TextOperation, inverse: TextOperation) -> ClientResult<(), E, S> {
        let cursor_before = self.cursor;
        self.cursor = self.editor.get_cursor();
        let compose = self
            .undo_manager
            .last_undo()
            .is_some_and(|last| inverse.should_be_composed_with_inverted(&last.wrapped));
        let meta = SelfMeta::new(self.cursor, cursor_before);
        self.undo_manager.add(WrappedOperation::new(inverse, meta), compose)?;
        let mut hooks = Hooks {
            editor: &mut self.editor,
            server: &mut self.server,
            undo_manager: &mut self.undo_manager,
            cursor: &mut self.cursor,
        };
        self.client.apply_client(op, &mut hooks)
    }

    pub fn on_cursor_activity(&mut self) -> ClientResult<(), E, S> {
        let old = self.cursor;
        self.cursor = self.editor.get_cursor();
        if !self.focused || (old.is_some() && old == self.cursor) {
            return Ok(());
        }
        self.send_cursor(self.cursor)
    }

    pub fn on_blur(&mut self) -> ClientResult<(), E, S> {
        self.cursor = None;
        self.focused = false;
        self.send_cursor(None)
    }

    pub fn on_focus(&mut self) -> ClientResult<(), E, S> {
        self.focused = true;
        self.on_cursor_activity()
    }

    /// Undoes the last local edit, if any.
    pub fn undo(&mut self) -> ClientResult<(), E, S> {
        if !self.undo_manager.can_undo() {
            return Ok(());
        }
        let Self {
            client,
            undo_manager,
            editor,
            server,
            cursor,
            ..
        } = self;
        undo_manager.perform_undo(|undo_manager, op| apply_unredo(client, undo_manager, editor, server, cursor, op))
    }

    pub fn redo(&mut self) -> ClientResult<(), E, S> {
        if !self.undo_manager.can_redo() {
            return Ok(());
        }
        let Self {
            client,
            undo_manager,
            editor,
            server,
            cursor,
            ..
        } = self;
        undo_manager.perform_redo(|undo_manager, op| apply_unredo(client, undo_manager, editor, server, cursor, op))
    }

    pub fn server_ack(&mut self) -> ClientResult<(), E, S> {
        let mut hooks = Hooks {
            editor: &mut self.editor,
            server: &mut self.server,
            undo_manager: &mut self.undo_manager,
            cursor: &mut self.cursor,
        };
        self.client.server_ack(&mut hooks)?;
        self.cursor = self.editor.get_cursor();
        self.send_cursor(self.cursor)
    }

    pub fn server_retry(&mut self) -> ClientResult<(), E, S> {
        let mut hooks = Hooks {
            editor: &mut self.editor,
            server: &mut self.server,
            undo_manager: &mut self.undo_manager,
            cursor: &mut self.cursor,
        };
        self.client.server_retry(&mut hooks)
    }

    /// A remote operation arrived.
    pub fn apply_server(&mut self, op: TextOperation) -> ClientResult<(), E, S> {
        let mut hooks = Hooks {
            editor: &mut self.editor,
            server: &mut self.server,
            undo_manager: &mut self.undo_manager,
            cursor: &mut self.cursor,
        };
        self.client.apply_server(op, &mut hooks)
    }

    /// A peer moved its cursor (`None` when it left or blurred).
    ///
    /// Ignored for our own id and while local edits are pending. Cursors
    /// outside the document or without a usable color are not drawn.
    pub fn on_remote_cursor(&mut self, user_id: &str, cursor: Option<Cursor>, color: Option<&str>) {
        if user_id == self.server.user_id() || !self.client.is_synchronized() {
            return;
        }
        if let Some(color) = color.filter(|c| is_valid_color(c)) {
            self.colors.insert(user_id.to_owned(), color.to_owned());
        }
        let Some(cursor) = cursor else {
            self.editor.remove_other_cursor(user_id);
            return;
        };
        let color = self.colors.get(user_id);
        match color {
            Some(color) if cursor.is_within(self.editor.document_len()) => {
                self.editor.set_other_cursor(user_id, cursor, color);
            }
            _ => {
                debug!(user_id, "not drawing remote cursor");
                self.editor.remove_other_cursor(user_id);
            }
        }
    }

    fn send_cursor(&mut self, cursor: Option<Cursor>) -> ClientResult<(), E, S> {
        if matches!(self.client.state(), SyncState::AwaitingWithBuffer { .. }) {
            return Ok(());
        }
        self.server.send_cursor(cursor).map_err(EditorClientError::Server)
    }
}

fn apply_unredo<E: EditorAdapter, S: ServerAdapter>(
    client: &mut Client<TextOperation>,
    undo_manager: &mut UndoManager,
    editor: &mut E,
    server: &mut S,
    cursor: &mut Option<Cursor>,
    op: WrappedOperation<SelfMeta>,
) -> ClientResult<(), E, S> {
    let inverse = editor.invert_operation(&op).map_err(EditorClientError::Editor)?;
    undo_manager.add(inverse, false)?;
    editor.apply_operation(&op.wrapped).map_err(EditorClientError::Editor)?;
    *cursor = op.meta.cursor_after;
    if let Some(c) = *cursor {
        editor.set_cursor(c);
    }
    let mut hooks = Hooks {
        editor,
        server,
        undo_manager,
        cursor,
    };
    client.apply_client(op.wrapped, &mut hooks)
}

struct Hooks<'a, E, S> {
    editor: &'a mut E,
    server: &'a mut S,
    undo_manager: &'a mut UndoManager,
    cursor: &'a mut Option<Cursor>,
}

impl<E: EditorAdapter, S: ServerAdapter> ClientHooks<TextOperation> for Hooks<'_, E, S> {
    type Error = EditorClientError<E::Error, S::Error>;

    fn send_operation(&mut self, op: &TextOperation) -> Result<(), Self::Error> {
        self.server.send_operation(op).map_err(EditorClientError::Server)
    }

    fn apply_operation(&mut self, op: &TextOperation) -> Result<(), Self::Error> {
        self.editor.apply_operation(op).map_err(EditorClientError::Editor)?;
        *self.cursor = self.editor.get_cursor();
        self.undo_manager
            .transform(&WrappedOperation::new(op.clone(), SelfMeta::default()))
            .map_err(UndoError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_validation() {
        assert!(is_valid_color("#fff"));
        assert!(is_valid_color("#a1B2c3"));
        assert!(!is_valid_color("fff"));
        assert!(!is_valid_color("#ffff"));
        assert!(!is_valid_color("#ggg"));
        assert!(!is_valid_color("red"));
    }
}
