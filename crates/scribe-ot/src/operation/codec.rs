//! Flat JSON encoding of [`TextOperation`].
//!
//! ```text
//! [5, {"b": true}, "bold", -3, "plain"]
//! ```
//!
//! Positive numbers retain, negative numbers delete, strings insert. An object
//! holds the attributes of the step right after it. An operation with no
//! steps encodes as `[0]`.

use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use super::{Attributes, OperationError, Step, TextOperation};

impl TextOperation {
    pub fn to_json(&self) -> Value {
        if self.steps.is_empty() {
            return Value::Array(vec![Value::from(0)]);
        }
        let mut out = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if let Some(attrs) = step.attributes() {
                if !attrs.is_empty() {
                    out.push(Value::Object(attrs.clone().into_iter().collect::<Map<_, _>>()));
                }
            }
            match step {
                Step::Retain { n, .. } => out.push(Value::from(*n as u64)),
                Step::Insert { text, .. } => out.push(Value::String(text.clone())),
                Step::Delete(n) => out.push(Value::from(-(*n as i64))),
            }
        }
        Value::Array(out)
    }

    pub fn from_json(value: &Value) -> Result<TextOperation, OperationError> {
        let Value::Array(items) = value else {
            return Err(OperationError::InvalidArgument("operation must be an array".into()));
        };
        let mut op = TextOperation::new();
        let mut pending: Option<Attributes> = None;
        for item in items {
            match item {
                Value::Object(map) => {
                    if pending.is_some() {
                        return Err(OperationError::InvalidArgument("two attribute objects in a row".into()));
                    }
                    pending = Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                }
                Value::String(text) => {
                    grow(op.target_length, text.chars().count())?;
                    op.push_insert(text, pending.take().unwrap_or_default());
                }
                Value::Number(n) => {
                    let n = step_count(n)?;
                    let attrs = pending.take().unwrap_or_default();
                    if n > 0 {
                        let n = usize_count(n.unsigned_abs())?;
                        grow(op.base_length, n)?;
                        grow(op.target_length, n)?;
                        op.push_retain(n, attrs);
                    } else if !attrs.is_empty() {
                        return Err(OperationError::InvalidArgument(
                            "attributes must precede a retain or an insert".into(),
                        ));
                    } else if n < 0 {
                        let n = usize_count(n.unsigned_abs())?;
                        grow(op.base_length, n)?;
                        op.push_delete(n);
                    }
                }
                other => {
                    return Err(OperationError::InvalidArgument(format!("unexpected step {other}")));
                }
            }
        }
        if pending.is_some() {
            return Err(OperationError::InvalidArgument("trailing attribute object".into()));
        }
        Ok(op)
    }
}

fn step_count(n: &Number) -> Result<i64, OperationError> {
    n.as_i64()
        .ok_or_else(|| OperationError::InvalidArgument(format!("step count {n} is not an integer")))
}

fn usize_count(n: u64) -> Result<usize, OperationError> {
    usize::try_from(n).map_err(|_| OperationError::InvalidArgument(format!("step count {n} is too large")))
}

/// Lengths of a decoded operation must stay representable.
fn grow(total: usize, n: usize) -> Result<usize, OperationError> {
    total
        .checked_add(n)
        .ok_or_else(|| OperationError::InvalidArgument(format!("step count {n} overflows the operation length")))
}

impl Serialize for TextOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TextOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        TextOperation::from_json(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_flat_steps() {
        let mut bold = Attributes::new();
        bold.insert("b".into(), json!(true));
        let op = TextOperation::new().retain(5).insert_with("bold", bold).delete(3).insert("x");
        assert_eq!(op.to_json(), json!([5, {"b": true}, "bold", "x", -3]));
    }

    #[test]
    fn empty_operation_is_zero_placeholder() {
        assert_eq!(TextOperation::new().to_json(), json!([0]));
        assert_eq!(TextOperation::from_json(&json!([0])).unwrap(), TextOperation::new());
        assert_eq!(TextOperation::from_json(&json!([])).unwrap(), TextOperation::new());
    }

    #[test]
    fn decodes_retain_attributes() {
        let op = TextOperation::from_json(&json!([{"c": "red"}, 2, -1])).unwrap();
        let mut red = Attributes::new();
        red.insert("c".into(), json!("red"));
        assert_eq!(op, TextOperation::new().retain_with(2, red).delete(1));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            json!({"o": 1}),
            json!([1.5]),
            json!([true]),
            json!([null]),
            json!([{"b": true}]),
            json!([{"b": true}, -2]),
            json!([{"b": true}, {"i": true}, "x"]),
        ] {
            assert!(
                matches!(TextOperation::from_json(&bad), Err(OperationError::InvalidArgument(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_lengths_that_overflow() {
        for bad in [
            json!([i64::MAX, i64::MAX, i64::MAX]),
            json!([-i64::MAX, -i64::MAX, -i64::MAX]),
            json!([i64::MAX, -i64::MAX, i64::MAX, -i64::MAX, i64::MAX]),
        ] {
            assert!(
                matches!(TextOperation::from_json(&bad), Err(OperationError::InvalidArgument(_))),
                "{bad} should be rejected"
            );
        }
        let big = TextOperation::from_json(&json!([i64::MAX, -1])).unwrap();
        assert_eq!(big.base_length(), i64::MAX as usize + 1);
    }

    #[test]
    fn serde_uses_flat_form() {
        let op = TextOperation::new().retain(1).insert("é");
        let text = serde_json::to_string(&op).unwrap();
        assert_eq!(text, r#"[1,"é"]"#);
        let back: TextOperation = serde_json::from_str(&text).unwrap();
        assert_eq!(back, op);
    }
}
