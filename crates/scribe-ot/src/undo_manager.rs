//! Undo / redo stacks of inverse operations.

use std::collections::VecDeque;

use thiserror::Error;

use crate::operation::{OperationError, Transformable};
use crate::wrapped_operation::{SelfMeta, WrappedOperation};

pub const DEFAULT_MAX_ITEMS: usize = 50;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UndoError {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UndoState {
    Normal,
    Undoing,
    Redoing,
}

#[derive(Debug, Clone)]
pub struct UndoManager<O = WrappedOperation<SelfMeta>> {
    max_items: usize,
    state: UndoState,
    dont_compose: bool,
    undo_stack: VecDeque<O>,
    redo_stack: Vec<O>,
}

impl<O: Transformable> Default for UndoManager<O> {
    fn default() -> Self {
        Self::with_max_items(DEFAULT_MAX_ITEMS)
    }
}

impl<O: Transformable> UndoManager<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items,
            state: UndoState::Normal,
            dont_compose: false,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Records the inverse of an edit.
    ///
    /// Inside [`perform_undo`](Self::perform_undo) the inverse lands on the
    /// redo stack, inside [`perform_redo`](Self::perform_redo) on the undo
    /// stack. Otherwise it is pushed onto the undo stack (or composed into
    /// its top when `compose` is set) and the redo stack is cleared.
    pub fn add(&mut self, op: O, compose: bool) -> Result<(), UndoError> {
        match self.state {
            UndoState::Undoing => {
                self.redo_stack.push(op);
                self.dont_compose = true;
            }
            UndoState::Redoing => {
                self.undo_stack.push_back(op);
                self.dont_compose = true;
            }
            UndoState::Normal => {
                match self.undo_stack.back_mut() {
                    Some(top) if compose && !self.dont_compose => {
                        // Inverses run newest first.
                        *top = op.compose(top)?;
                    }
                    _ => {
                        self.undo_stack.push_back(op);
                        if self.undo_stack.len() > self.max_items {
                            self.undo_stack.pop_front();
                        }
                    }
                }
                self.dont_compose = false;
                self.redo_stack.clear();
            }
        }
        Ok(())
    }

    /// Re-expresses both stacks as if `op` had been applied before them.
    pub fn transform(&mut self, op: &O) -> Result<(), OperationError> {
        let undo = transform_stack(self.undo_stack.iter().cloned(), op)?;
        let redo = transform_stack(self.redo_stack.iter().cloned(), op)?;
        self.undo_stack = undo.into();
        self.redo_stack = redo;
        self.dont_compose = true;
        Ok(())
    }

    /// Pops the top undo entry and hands it to `f`, which is expected to
    /// apply it and [`add`](Self::add) the resulting inverse.
    pub fn perform_undo<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Self, O) -> Result<(), E>,
        E: From<UndoError>,
    {
        let op = self.undo_stack.pop_back().ok_or(UndoError::NothingToUndo)?;
        self.state = UndoState::Undoing;
        let result = f(self, op);
        self.state = UndoState::Normal;
        result
    }

    pub fn perform_redo<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&mut Self, O) -> Result<(), E>,
        E: From<UndoError>,
    {
        let op = self.redo_stack.pop().ok_or(UndoError::NothingToRedo)?;
        self.state = UndoState::Redoing;
        let result = f(self, op);
        self.state = UndoState::Normal;
        result
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_undoing(&self) -> bool {
        self.state == UndoState::Undoing
    }

    pub fn is_redoing(&self) -> bool {
        self.state == UndoState::Redoing
    }

    /// The entry the next undo would apply.
    pub fn last_undo(&self) -> Option<&O> {
        self.undo_stack.back()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }
}

/// Walks `stack` from the top down, dropping entries the remote edit made
/// redundant.
fn transform_stack<O, I>(stack: I, op: &O) -> Result<Vec<O>, OperationError>
where
    O: Transformable,
    I: DoubleEndedIterator<Item = O>,
{
    let mut remote = op.clone();
    let mut out = Vec::new();
    for entry in stack.rev() {
        let (entry, next) = entry.transform(&remote)?;
        if !entry.is_noop() {
            out.push(entry);
        }
        remote = next;
    }
    out.reverse();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::TextOperation;

    type Manager = UndoManager<TextOperation>;

    fn undo(manager: &mut Manager, doc: &mut String) {
        manager
            .perform_undo(|m, op| -> Result<(), UndoError> {
                let inverse = op.invert(doc)?;
                *doc = op.apply(doc)?;
                m.add(inverse, false)
            })
            .unwrap();
    }

    fn redo(manager: &mut Manager, doc: &mut String) {
        manager
            .perform_redo(|m, op| -> Result<(), UndoError> {
                let inverse = op.invert(doc)?;
                *doc = op.apply(doc)?;
                m.add(inverse, false)
            })
            .unwrap();
    }

    fn edit(manager: &mut Manager, doc: &mut String, op: TextOperation, compose: bool) {
        let inverse = op.invert(doc).unwrap();
        *doc = op.apply(doc).unwrap();
        manager.add(inverse, compose).unwrap();
    }

    #[test]
    fn undo_then_redo() {
        let mut manager = Manager::new();
        let mut doc = String::new();
        edit(&mut manager, &mut doc, TextOperation::new().insert("abc"), false);
        undo(&mut manager, &mut doc);
        assert_eq!(doc, "");
        assert!(!manager.can_undo());
        assert!(manager.can_redo());
        redo(&mut manager, &mut doc);
        assert_eq!(doc, "abc");
        assert!(manager.can_undo());
        assert!(!manager.can_redo());
    }

    #[test]
    fn empty_stacks_error() {
        let mut manager = Manager::new();
        let result = manager.perform_undo(|_, _| Ok::<(), UndoError>(()));
        assert_eq!(result, Err(UndoError::NothingToUndo));
        let result = manager.perform_redo(|_, _| Ok::<(), UndoError>(()));
        assert_eq!(result, Err(UndoError::NothingToRedo));
        assert!(!manager.is_undoing());
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut manager = Manager::new();
        let mut doc = String::new();
        edit(&mut manager, &mut doc, TextOperation::new().insert("a"), false);
        undo(&mut manager, &mut doc);
        edit(&mut manager, &mut doc, TextOperation::new().insert("b"), false);
        assert!(!manager.can_redo());
    }

    #[test]
    fn oldest_entries_fall_off() {
        let mut manager = Manager::with_max_items(2);
        let mut doc = String::new();
        for c in ["a", "b", "c"] {
            let len = doc.chars().count();
            edit(&mut manager, &mut doc, TextOperation::new().retain(len).insert(c), false);
        }
        assert_eq!(manager.undo_len(), 2);
        undo(&mut manager, &mut doc);
        undo(&mut manager, &mut doc);
        assert_eq!(doc, "a");
        assert!(!manager.can_undo());
    }

    #[test]
    fn no_compose_right_after_undo() {
        let mut manager = Manager::new();
        let mut doc = String::new();
        edit(&mut manager, &mut doc, TextOperation::new().insert("a"), false);
        edit(&mut manager, &mut doc, TextOperation::new().retain(1).insert("b"), false);
        undo(&mut manager, &mut doc);
        redo(&mut manager, &mut doc);
        edit(&mut manager, &mut doc, TextOperation::new().retain(2).insert("c"), true);
        assert_eq!(manager.undo_len(), 3);
    }

    #[test]
    fn transform_moves_entries_and_drops_noops() {
        let mut manager = Manager::new();
        let mut doc = String::from("xy");
        edit(&mut manager, &mut doc, TextOperation::new().retain(1).delete(1), false);
        assert_eq!(doc, "x");

        // A remote edit prepends text.
        let remote = TextOperation::new().insert("++").retain(1);
        doc = remote.apply(&doc).unwrap();
        manager.transform(&remote).unwrap();
        undo(&mut manager, &mut doc);
        assert_eq!(doc, "++xy");

        // The redo entry deletes "y"; a remote wipe makes it redundant.
        assert!(manager.can_redo());
        let wipe = TextOperation::new().delete(4);
        manager.transform(&wipe).unwrap();
        assert!(!manager.can_redo());
    }

    #[test]
    fn composed_entries_undo_together() {
        let mut manager = Manager::new();
        let mut doc = String::new();
        edit(&mut manager, &mut doc, TextOperation::new().insert("a"), true);
        edit(&mut manager, &mut doc, TextOperation::new().retain(1).insert("b"), true);
        edit(&mut manager, &mut doc, TextOperation::new().retain(2).insert("c"), true);
        assert_eq!(manager.undo_len(), 1);
        undo(&mut manager, &mut doc);
        assert_eq!(doc, "");
    }
}
