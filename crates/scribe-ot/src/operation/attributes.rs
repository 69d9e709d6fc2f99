//! Formatting attributes carried by retain and insert steps.
//!
//! Attributes are a flat map from attribute name to JSON value. Inside a
//! retain step the value `false` means "clear this attribute"; attributes
//! stored on characters never hold a literal `false`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

pub type Attributes = BTreeMap<String, Value>;

/// Well-known attribute names.
pub mod attr {
    pub const BOLD: &str = "b";
    pub const ITALIC: &str = "i";
    pub const UNDERLINE: &str = "u";
    pub const STRIKE: &str = "s";
    pub const FONT: &str = "f";
    pub const FONT_SIZE: &str = "fs";
    pub const COLOR: &str = "c";
    pub const BACKGROUND_COLOR: &str = "bc";
    pub const LINE_SENTINEL: &str = "l";
    pub const LINE_INDENT: &str = "li";
    pub const LINE_ALIGN: &str = "la";
    pub const LIST_TYPE: &str = "lt";
    pub const LINE_CLASS: &str = "lc";
}

/// `true` for the "clear this attribute" marker.
#[inline]
pub fn is_clear(value: &Value) -> bool {
    matches!(value, Value::Bool(false))
}

/// Copy of `attrs` without clear markers.
pub fn without_clears(attrs: &Attributes) -> Attributes {
    attrs
        .iter()
        .filter(|(_, v)| !is_clear(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Applies the overrides of a retain step to a character's attributes.
pub fn apply_overrides(target: &mut Attributes, overrides: &Attributes) {
    for (key, value) in overrides {
        if is_clear(value) {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
    debug_assert!(
        target.values().all(|v| !is_clear(v)),
        "character attributes must not hold a literal false"
    );
}

/// Attributes of `second` layered over `first`.
///
/// When `first` belongs to an insert, clear markers in `second` remove the key
/// outright (the inserted text never had it); between two retains they are
/// kept so the clear still reaches the underlying text.
pub fn compose_attributes(first: &Attributes, second: &Attributes, first_is_insert: bool) -> Attributes {
    let mut merged = first.clone();
    for (key, value) in second {
        if first_is_insert && is_clear(value) {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Resolves two concurrent attribute changes on the same characters.
///
/// A key set by only one side survives on that side. Equal values cancel.
/// Conflicting values resolve in favour of the first side.
pub fn transform_attributes(first: &Attributes, second: &Attributes) -> (Attributes, Attributes) {
    let mut first_prime = Attributes::new();
    let mut second_prime = Attributes::new();
    let keys: BTreeSet<&String> = first.keys().chain(second.keys()).collect();
    for key in keys {
        match (first.get(key), second.get(key)) {
            (Some(a), None) => {
                first_prime.insert(key.clone(), a.clone());
            }
            (None, Some(b)) => {
                second_prime.insert(key.clone(), b.clone());
            }
            (Some(a), Some(b)) if a == b => {}
            (Some(a), Some(_)) => {
                first_prime.insert(key.clone(), a.clone());
            }
            (None, None) => {}
        }
    }
    (first_prime, second_prime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: Value) -> Attributes {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn overrides_clear_and_set() {
        let mut a = attrs(json!({"b": true, "c": "red"}));
        apply_overrides(&mut a, &attrs(json!({"b": false, "i": true})));
        assert_eq!(a, attrs(json!({"c": "red", "i": true})));
    }

    #[test]
    fn compose_keeps_clears_between_retains() {
        let first = attrs(json!({"b": true}));
        let second = attrs(json!({"b": false}));
        assert_eq!(compose_attributes(&first, &second, false), attrs(json!({"b": false})));
        assert_eq!(compose_attributes(&first, &second, true), Attributes::new());
    }

    #[test]
    fn transform_first_wins_conflicts() {
        let a = attrs(json!({"c": "red", "b": true}));
        let b = attrs(json!({"c": "blue", "b": true, "i": true}));
        let (a1, b1) = transform_attributes(&a, &b);
        assert_eq!(a1, attrs(json!({"c": "red"})));
        assert_eq!(b1, attrs(json!({"i": true})));
    }
}
