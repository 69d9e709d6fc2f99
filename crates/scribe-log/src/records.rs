//! Wire records stored in the revision log.
//!
//! | Record | Shape |
//! |--------|-------|
//! | revision | `{"a": author, "o": [operation], "t": timestamp}` |
//! | checkpoint | `{"id": revision id, "a": author, "o": [operation]}` |
//! | presence | `{"id": user, "cursor": {...} \| null, "color": "#rrggbb" \| null, "name": ... \| null}` |

use scribe_ot::editor_client::is_valid_color;
use scribe_ot::{Cursor, OperationError, TextOperation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Placeholder the store replaces with its own clock when a revision is written.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value.get(".sv").and_then(Value::as_str) == Some("timestamp")
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidRevision {
    #[error("revision is not an object")]
    NotAnObject,
    #[error("revision has no author")]
    MissingAuthor,
    #[error("revision has no operation")]
    MissingOperation,
    #[error("revision operation does not decode: {0}")]
    Decode(#[from] OperationError),
    #[error("revision applies to {actual} characters, document has {expected}")]
    BaseLength { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub id: String,
    pub author: String,
    pub operation: TextOperation,
    /// Milliseconds, once the store has resolved the placeholder.
    pub timestamp: Option<i64>,
}

impl Revision {
    /// The value written for a new revision.
    pub fn new_value(author: &str, operation: &TextOperation) -> Value {
        json!({ "a": author, "o": operation.to_json(), "t": server_timestamp() })
    }

    pub fn parse(id: &str, value: &Value) -> Result<Revision, InvalidRevision> {
        let record = value.as_object().ok_or(InvalidRevision::NotAnObject)?;
        let author = record
            .get("a")
            .and_then(Value::as_str)
            .ok_or(InvalidRevision::MissingAuthor)?;
        let operation = record.get("o").ok_or(InvalidRevision::MissingOperation)?;
        Ok(Revision {
            id: id.to_owned(),
            author: author.to_owned(),
            operation: TextOperation::from_json(operation)?,
            timestamp: record.get("t").and_then(Value::as_i64),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Id of the last revision folded into `operation`.
    pub id: String,
    #[serde(rename = "a")]
    pub author: String,
    #[serde(rename = "o")]
    pub operation: TextOperation,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresenceRecord {
    pub id: String,
    pub cursor: Option<Cursor>,
    pub color: Option<String>,
    pub name: Option<String>,
}

impl PresenceRecord {
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "cursor": self.cursor.map(|c| c.to_json()),
            "color": self.color,
            "name": self.name,
        })
    }

    /// Reads a peer's record. Malformed fields become `None` instead of
    /// failing the whole record.
    pub fn parse_lenient(user_id: &str, value: &Value) -> PresenceRecord {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
        PresenceRecord {
            id: user_id.to_owned(),
            cursor: value.get("cursor").and_then(Cursor::from_json),
            color: text("color").filter(|c| is_valid_color(c)),
            name: text("name"),
        }
    }
}
