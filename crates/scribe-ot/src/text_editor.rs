//! Headless rich-text editor binding.
//!
//! [`TextEditor`] owns the text, the local cursor, the cursors of other users
//! and the per-character formatting, kept as maximal runs in a
//! [`SpanList`]. Local edits go through [`insert_text`](TextEditor::insert_text),
//! [`delete_text`](TextEditor::delete_text) and
//! [`format_text`](TextEditor::format_text), which return the operation and
//! its exact inverse, ready for [`EditorClient::on_change`].
//!
//! [`EditorClient::on_change`]: crate::editor_client::EditorClient::on_change

use std::collections::BTreeMap;

use scribe_spans::{Span, SpanError, SpanList};
use serde_json::Value;
use thiserror::Error;

use crate::cursor::Cursor;
use crate::editor_client::EditorAdapter;
use crate::operation::attributes::{apply_overrides, without_clears};
use crate::operation::{Attributes, OperationError, Step, TextOperation};
use crate::wrapped_operation::{Meta, SelfMeta, WrappedOperation};

#[derive(Debug, Error)]
pub enum TextEditorError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Spans(#[from] SpanError),
    #[error("range {pos}..{end} is outside a document of {len} characters")]
    OutOfRange { pos: usize, end: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtherCursor {
    pub cursor: Cursor,
    pub color: String,
}

#[derive(Default)]
pub struct TextEditor {
    text: String,
    spans: SpanList<Attributes>,
    cursor: Option<Cursor>,
    others: BTreeMap<String, OtherCursor>,
}

impl TextEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn other_cursor(&self, user_id: &str) -> Option<&OtherCursor> {
        self.others.get(user_id)
    }

    /// Formatting runs overlapping `span`, clipped to it.
    pub fn attribute_spans(&self, span: Span) -> Result<Vec<(Span, Attributes)>, TextEditorError> {
        Ok(self
            .spans
            .get_annotated_spans_for_span(span)?
            .into_iter()
            .map(|run| (run.span(), run.annotation.clone()))
            .collect())
    }

    /// Attributes of the character at `pos`.
    pub fn attributes_at(&self, pos: usize) -> Result<Attributes, TextEditorError> {
        let runs = self.attribute_spans(Span::new(pos, 1))?;
        Ok(runs.into_iter().next().map(|(_, attrs)| attrs).unwrap_or_default())
    }

    /// Types `text` at `pos`. The caret ends up after the inserted text.
    pub fn insert_text(
        &mut self,
        pos: usize,
        text: &str,
        attrs: Attributes,
    ) -> Result<(TextOperation, TextOperation), TextEditorError> {
        let len = self.check_range(pos, 0)?;
        let op = TextOperation::new().retain(pos).insert_with(text, attrs).retain(len - pos);
        let inverse = self.apply_local(&op)?;
        self.cursor = Some(Cursor::caret(pos + text.chars().count()));
        Ok((op, inverse))
    }

    /// Removes `n` characters starting at `pos`.
    pub fn delete_text(&mut self, pos: usize, n: usize) -> Result<(TextOperation, TextOperation), TextEditorError> {
        let len = self.check_range(pos, n)?;
        let op = TextOperation::new().retain(pos).delete(n).retain(len - pos - n);
        let inverse = self.apply_local(&op)?;
        self.cursor = Some(Cursor::caret(pos));
        Ok((op, inverse))
    }

    /// Sets (or with `false`, clears) attributes on `n` characters at `pos`.
    pub fn format_text(
        &mut self,
        pos: usize,
        n: usize,
        attrs: Attributes,
    ) -> Result<(TextOperation, TextOperation), TextEditorError> {
        let len = self.check_range(pos, n)?;
        let op = TextOperation::new().retain(pos).retain_with(n, attrs).retain(len - pos - n);
        let inverse = self.apply_local(&op)?;
        Ok((op, inverse))
    }

    fn check_range(&self, pos: usize, n: usize) -> Result<usize, TextEditorError> {
        let len = self.len();
        match pos.checked_add(n) {
            Some(end) if end <= len => Ok(len),
            _ => Err(TextEditorError::OutOfRange {
                pos,
                end: pos.saturating_add(n),
                len,
            }),
        }
    }

    fn apply_local(&mut self, op: &TextOperation) -> Result<TextOperation, TextEditorError> {
        let inverse = self.invert(op)?;
        self.apply(op)?;
        Ok(inverse)
    }

    /// Inverse of `op` against the current document, restoring deleted text
    /// with its formatting and undoing attribute changes on retained text.
    pub fn invert(&self, op: &TextOperation) -> Result<TextOperation, TextEditorError> {
        if op.base_length() != self.len() {
            return Err(OperationError::LengthMismatch {
                expected: op.base_length(),
                actual: self.len(),
            }
            .into());
        }
        let chars: Vec<char> = self.text.chars().collect();
        let mut inverse = TextOperation::new();
        let mut pos = 0;
        for step in op.steps() {
            match step {
                Step::Retain { n, attrs } if attrs.is_empty() => {
                    inverse.push_retain(*n, Attributes::new());
                    pos += n;
                }
                Step::Retain { n, attrs } => {
                    for run in self.spans.get_annotated_spans_for_span(Span::new(pos, *n))? {
                        inverse.push_retain(run.length, inverse_attributes(run.annotation, attrs));
                    }
                    pos += n;
                }
                Step::Insert { text, .. } => inverse.push_delete(text.chars().count()),
                Step::Delete(n) => {
                    for run in self.spans.get_annotated_spans_for_span(Span::new(pos, *n))? {
                        let deleted: String = chars[run.pos..run.pos + run.length].iter().collect();
                        inverse.push_insert(&deleted, run.annotation.clone());
                    }
                    pos += n;
                }
            }
        }
        Ok(inverse)
    }

    fn apply(&mut self, op: &TextOperation) -> Result<(), TextEditorError> {
        self.text = op.apply(&self.text)?;
        let mut pos = 0;
        for step in op.steps() {
            match step {
                Step::Retain { n, attrs } => {
                    if !attrs.is_empty() {
                        self.spans.update_span(Span::new(pos, *n), |old, _| {
                            let mut updated = old.clone();
                            apply_overrides(&mut updated, attrs);
                            updated
                        })?;
                    }
                    pos += n;
                }
                Step::Insert { text, attrs } => {
                    let n = text.chars().count();
                    self.spans.insert_annotated_span(Span::new(pos, n), without_clears(attrs))?;
                    pos += n;
                }
                Step::Delete(n) => self.spans.remove_span(Span::new(pos, *n))?,
            }
        }
        self.cursor = self.cursor.map(|c| c.transform(op));
        for other in self.others.values_mut() {
            other.cursor = other.cursor.transform(op);
        }
        Ok(())
    }
}

/// Attribute changes that undo `change` on a run currently formatted `current`.
fn inverse_attributes(current: &Attributes, change: &Attributes) -> Attributes {
    change
        .keys()
        .map(|key| {
            let value = current.get(key).cloned().unwrap_or(Value::Bool(false));
            (key.clone(), value)
        })
        .collect()
}

impl EditorAdapter for TextEditor {
    type Error = TextEditorError;

    fn apply_operation(&mut self, op: &TextOperation) -> Result<(), TextEditorError> {
        self.apply(op)
    }

    fn get_cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = Some(cursor);
    }

    fn invert_operation(
        &self,
        op: &WrappedOperation<SelfMeta>,
    ) -> Result<WrappedOperation<SelfMeta>, TextEditorError> {
        Ok(WrappedOperation::new(self.invert(&op.wrapped)?, op.meta.invert()))
    }

    fn set_other_cursor(&mut self, user_id: &str, cursor: Cursor, color: &str) {
        self.others.insert(
            user_id.to_owned(),
            OtherCursor {
                cursor,
                color: color.to_owned(),
            },
        );
    }

    fn remove_other_cursor(&mut self, user_id: &str) {
        self.others.remove(user_id);
    }

    fn document_len(&self) -> usize {
        self.len()
    }
}
