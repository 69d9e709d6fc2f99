//! scribe-ot: operational transformation for collaborative rich text.
//!
//! The crate is layered leaves-first:
//!
//! - [`operation`]: [`TextOperation`] (retain / insert / delete steps with
//!   formatting attributes) and its algebra: `apply`, `invert`, `compose`,
//!   `transform`, plus the flat JSON wire form.
//! - [`cursor`]: selections that move through operations.
//! - [`wrapped_operation`]: operations paired with metadata that follows
//!   them through the algebra (cursor positions for undo).
//! - [`client`]: the synchronized / awaiting-confirm / awaiting-with-buffer
//!   state machine that keeps at most one operation in flight.
//! - [`undo_manager`]: undo / redo stacks that stay valid under remote edits.
//! - [`editor_client`]: glue between an editor binding, a server adapter, the
//!   client state machine and the undo manager.
//! - [`text_editor`]: a headless rich-text editor binding that keeps
//!   per-character attributes in a [`scribe_spans::SpanList`].

pub mod client;
pub mod cursor;
pub mod editor_client;
pub mod operation;
pub mod text_editor;
pub mod undo_manager;
pub mod wrapped_operation;

pub use client::{Client, ClientError, ClientHooks, SyncState};
pub use cursor::Cursor;
pub use editor_client::{EditorAdapter, EditorClient, EditorClientError, ServerAdapter};
pub use operation::{Attributes, OperationError, Step, TextOperation, Transformable};
pub use text_editor::{TextEditor, TextEditorError};
pub use undo_manager::{UndoError, UndoManager};
pub use wrapped_operation::{Meta, SelfMeta, WrappedOperation};
