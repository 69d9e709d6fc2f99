use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operation::{Step, TextOperation};

/// A caret or selection: `position` is the anchor, `selection_end` the head.
/// Both are character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub position: usize,
    pub selection_end: usize,
}

impl Cursor {
    pub fn new(position: usize, selection_end: usize) -> Self {
        Self { position, selection_end }
    }

    pub fn caret(position: usize) -> Self {
        Self::new(position, position)
    }

    pub fn is_collapsed(&self) -> bool {
        self.position == self.selection_end
    }

    /// Whether both ends fall inside a document of `len` characters.
    pub fn is_within(&self, len: usize) -> bool {
        self.position <= len && self.selection_end <= len
    }

    /// Later cursor wins.
    pub fn compose(&self, other: &Cursor) -> Cursor {
        *other
    }

    /// Moves the cursor through `op`. Text inserted exactly at an end pushes
    /// it to the right.
    pub fn transform(&self, op: &TextOperation) -> Cursor {
        let position = transform_index(self.position, op);
        if self.is_collapsed() {
            return Cursor::caret(position);
        }
        Cursor::new(position, transform_index(self.selection_end, op))
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({ "position": self.position, "selectionEnd": self.selection_end })
    }

    /// Reads a cursor from untrusted JSON; anything malformed is `None`.
    pub fn from_json(value: &Value) -> Option<Cursor> {
        let position = value.get("position")?.as_u64()?;
        let selection_end = value.get("selectionEnd")?.as_u64()?;
        Some(Cursor::new(usize::try_from(position).ok()?, usize::try_from(selection_end).ok()?))
    }
}

fn transform_index(index: usize, op: &TextOperation) -> usize {
    // Characters of the original text still ahead of the index.
    let mut ahead = index as isize;
    let mut moved = index;
    for step in op.steps() {
        match step {
            Step::Retain { n, .. } => ahead -= *n as isize,
            Step::Insert { text, .. } => moved += text.chars().count(),
            Step::Delete(n) => {
                moved -= (ahead.max(0) as usize).min(*n);
                ahead -= *n as isize;
            }
        }
        if ahead < 0 {
            break;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_before_moves_caret() {
        let op = TextOperation::new().retain(1).insert("abc").retain(4);
        assert_eq!(Cursor::caret(3).transform(&op), Cursor::caret(6));
        assert_eq!(Cursor::caret(0).transform(&op), Cursor::caret(0));
    }

    #[test]
    fn insert_at_caret_pushes_it_right() {
        let op = TextOperation::new().retain(2).insert("xy").retain(2);
        assert_eq!(Cursor::caret(2).transform(&op), Cursor::caret(4));
    }

    #[test]
    fn delete_around_caret_clamps() {
        let op = TextOperation::new().retain(1).delete(4).retain(1);
        assert_eq!(Cursor::caret(3).transform(&op), Cursor::caret(1));
        assert_eq!(Cursor::caret(6).transform(&op), Cursor::caret(2));
    }

    #[test]
    fn selection_ends_move_independently() {
        let op = TextOperation::new().retain(2).insert("__").retain(4);
        assert_eq!(Cursor::new(1, 4).transform(&op), Cursor::new(1, 6));
    }

    #[test]
    fn json_form_is_camel_case() {
        let cursor = Cursor::new(2, 5);
        assert_eq!(cursor.to_json(), json!({"position": 2, "selectionEnd": 5}));
        assert_eq!(serde_json::to_value(cursor).unwrap(), cursor.to_json());
        assert_eq!(Cursor::from_json(&cursor.to_json()), Some(cursor));
        assert_eq!(Cursor::from_json(&json!({"position": -1, "selectionEnd": 0})), None);
        assert_eq!(Cursor::from_json(&json!("nope")), None);
    }
}
