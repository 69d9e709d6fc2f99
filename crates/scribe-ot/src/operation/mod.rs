//! Text operations and their algebra.
//!
//! # Operation format
//!
//! A [`TextOperation`] is a sequence of steps walked with a cursor over the
//! input text:
//! - `Retain { n, attrs }`: keep `n` characters, overriding their attributes
//!   with `attrs` (`false` clears a key)
//! - `Insert { text, attrs }`: insert `text` carrying `attrs`
//! - `Delete(n)`: drop the next `n` characters
//!
//! Lengths are counted in `char`s. Builders keep the step list canonical:
//! neighbouring steps of the same kind with equal attributes are merged, and
//! an insert issued right after a delete is placed in front of it, so two
//! operations with the same effect compare equal.

pub mod attributes;
pub mod codec;

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

pub use attributes::{attr, compose_attributes, transform_attributes, Attributes};

use attributes::{apply_overrides, without_clears};

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OperationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("incompatible operations: {0}")]
    IncompatibleOperations(&'static str),
}

// ── Transformable ─────────────────────────────────────────────────────────

/// The algebra shared by plain and wrapped operations, as needed by the
/// client state machine and the undo manager.
pub trait Transformable: Clone + Sized {
    /// Single operation equivalent to `self` followed by `other`.
    fn compose(&self, other: &Self) -> Result<Self, OperationError>;

    /// `(self', other')` such that `self ∘ other' == other ∘ self'`.
    fn transform(&self, other: &Self) -> Result<(Self, Self), OperationError>;

    fn is_noop(&self) -> bool;
}

// ── Step ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Retain { n: usize, attrs: Attributes },
    Insert { text: String, attrs: Attributes },
    Delete(usize),
}

impl Step {
    pub fn is_retain(&self) -> bool {
        matches!(self, Step::Retain { .. })
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Step::Insert { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Step::Delete(_))
    }

    /// Number of characters the step covers (inserted or consumed).
    pub fn len(&self) -> usize {
        match self {
            Step::Retain { n, .. } => *n,
            Step::Insert { text, .. } => text.chars().count(),
            Step::Delete(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Step::Retain { attrs, .. } | Step::Insert { attrs, .. } => Some(attrs),
            Step::Delete(_) => None,
        }
    }
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn skip_chars(s: &str, n: usize) -> String {
    s.chars().skip(n).collect()
}

// ── TextOperation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextOperation {
    steps: Vec<Step>,
    base_length: usize,
    target_length: usize,
}

impl TextOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Length of the text this operation applies to.
    pub fn base_length(&self) -> usize {
        self.base_length
    }

    /// Length of the text this operation produces.
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    // ── Builders ──────────────────────────────────────────────────────────

    pub fn retain(mut self, n: usize) -> Self {
        self.push_retain(n, Attributes::new());
        self
    }

    pub fn retain_with(mut self, n: usize, attrs: Attributes) -> Self {
        self.push_retain(n, attrs);
        self
    }

    pub fn insert(mut self, text: &str) -> Self {
        self.push_insert(text, Attributes::new());
        self
    }

    pub fn insert_with(mut self, text: &str, attrs: Attributes) -> Self {
        self.push_insert(text, attrs);
        self
    }

    pub fn delete(mut self, n: usize) -> Self {
        self.push_delete(n);
        self
    }

    /// Deletes as many characters as `text` has.
    pub fn delete_str(mut self, text: &str) -> Self {
        self.push_delete(text.chars().count());
        self
    }

    pub fn push_retain(&mut self, n: usize, attrs: Attributes) {
        if n == 0 {
            return;
        }
        self.base_length += n;
        self.target_length += n;
        if let Some(Step::Retain { n: prev, attrs: prev_attrs }) = self.steps.last_mut() {
            if *prev_attrs == attrs {
                *prev += n;
                return;
            }
        }
        self.steps.push(Step::Retain { n, attrs });
    }

    pub fn push_insert(&mut self, text: &str, attrs: Attributes) {
        if text.is_empty() {
            return;
        }
        self.target_length += text.chars().count();
        let len = self.steps.len();
        let after_delete = matches!(self.steps.last(), Some(Step::Delete(_)));
        // Inserts go in front of a trailing delete.
        let candidate = if after_delete { len.checked_sub(2) } else { len.checked_sub(1) };
        if let Some(Step::Insert { text: prev, attrs: prev_attrs }) = candidate.and_then(|i| self.steps.get_mut(i)) {
            if *prev_attrs == attrs {
                prev.push_str(text);
                return;
            }
        }
        let step = Step::Insert {
            text: text.to_owned(),
            attrs,
        };
        if after_delete {
            self.steps.insert(len - 1, step);
        } else {
            self.steps.push(step);
        }
    }

    pub fn push_delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.base_length += n;
        if let Some(Step::Delete(prev)) = self.steps.last_mut() {
            *prev += n;
            return;
        }
        self.steps.push(Step::Delete(n));
    }

    /// `true` if applying the operation changes nothing.
    pub fn is_noop(&self) -> bool {
        match self.steps.as_slice() {
            [] => true,
            [Step::Retain { attrs, .. }] => attrs.is_empty(),
            _ => false,
        }
    }

    // ── Apply / invert ────────────────────────────────────────────────────

    /// Applies the operation to `s`.
    pub fn apply(&self, s: &str) -> Result<String, OperationError> {
        let chars: Vec<char> = s.chars().collect();
        self.check_base(chars.len())?;
        let mut out = String::with_capacity(s.len());
        let mut index = 0;
        for step in &self.steps {
            match step {
                Step::Retain { n, .. } => {
                    out.extend(&chars[index..index + n]);
                    index += n;
                }
                Step::Insert { text, .. } => out.push_str(text),
                Step::Delete(n) => index += n,
            }
        }
        Ok(out)
    }

    /// Applies the operation to `s` and computes the attributes of every
    /// character of the result.
    ///
    /// `old_attrs[i]` holds the attributes of character `i` of `s` (missing
    /// entries count as empty). One entry per resulting character is pushed
    /// onto `new_attrs`.
    pub fn apply_with_attributes(
        &self,
        s: &str,
        old_attrs: &[Attributes],
        new_attrs: &mut Vec<Attributes>,
    ) -> Result<String, OperationError> {
        let chars: Vec<char> = s.chars().collect();
        self.check_base(chars.len())?;
        let mut out = String::with_capacity(s.len());
        let mut index = 0;
        for step in &self.steps {
            match step {
                Step::Retain { n, attrs } => {
                    out.extend(&chars[index..index + n]);
                    for k in index..index + n {
                        let mut updated = old_attrs.get(k).cloned().unwrap_or_default();
                        apply_overrides(&mut updated, attrs);
                        new_attrs.push(updated);
                    }
                    index += n;
                }
                Step::Insert { text, attrs } => {
                    out.push_str(text);
                    let inserted = without_clears(attrs);
                    new_attrs.extend(text.chars().map(|_| inserted.clone()));
                }
                Step::Delete(n) => index += n,
            }
        }
        Ok(out)
    }

    /// The operation that undoes `self` on the text it was applied to.
    ///
    /// Deleted text is restored without attributes and retains carry no
    /// attribute changes; rich-text inverses come from the editor binding,
    /// which knows the current attributes.
    pub fn invert(&self, s: &str) -> Result<TextOperation, OperationError> {
        let chars: Vec<char> = s.chars().collect();
        self.check_base(chars.len())?;
        let mut inverse = TextOperation::new();
        let mut index = 0;
        for step in &self.steps {
            match step {
                Step::Retain { n, .. } => {
                    inverse.push_retain(*n, Attributes::new());
                    index += n;
                }
                Step::Insert { text, .. } => inverse.push_delete(text.chars().count()),
                Step::Delete(n) => {
                    let deleted: String = chars[index..index + n].iter().collect();
                    inverse.push_insert(&deleted, Attributes::new());
                    index += n;
                }
            }
        }
        Ok(inverse)
    }

    fn check_base(&self, actual: usize) -> Result<(), OperationError> {
        if actual != self.base_length {
            return Err(OperationError::LengthMismatch {
                expected: self.base_length,
                actual,
            });
        }
        Ok(())
    }

    // ── Compose / transform ───────────────────────────────────────────────

    /// Single operation equivalent to applying `self`, then `other`.
    pub fn compose(&self, other: &TextOperation) -> Result<TextOperation, OperationError> {
        if self.target_length != other.base_length {
            return Err(OperationError::LengthMismatch {
                expected: self.target_length,
                actual: other.base_length,
            });
        }
        let mut out = TextOperation::new();
        let mut ops1 = self.steps.iter().cloned();
        let mut ops2 = other.steps.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,
                // Deletes of the first operation never meet the second.
                (Some(Step::Delete(n)), b) => {
                    out.push_delete(n);
                    op1 = ops1.next();
                    op2 = b;
                }
                // Inserts of the second operation never met the first.
                (a, Some(Step::Insert { text, attrs })) => {
                    out.push_insert(&text, attrs);
                    op1 = a;
                    op2 = ops2.next();
                }
                (None, Some(_)) => {
                    return Err(OperationError::IncompatibleOperations("first operation is too short"))
                }
                (Some(_), None) => {
                    return Err(OperationError::IncompatibleOperations("first operation is too long"))
                }
                (Some(Step::Retain { n: n1, attrs: a1 }), Some(Step::Retain { n: n2, attrs: a2 })) => {
                    let attrs = compose_attributes(&a1, &a2, false);
                    match n1.cmp(&n2) {
                        Ordering::Greater => {
                            out.push_retain(n2, attrs);
                            op1 = Some(Step::Retain { n: n1 - n2, attrs: a1 });
                            op2 = ops2.next();
                        }
                        Ordering::Equal => {
                            out.push_retain(n1, attrs);
                            op1 = ops1.next();
                            op2 = ops2.next();
                        }
                        Ordering::Less => {
                            out.push_retain(n1, attrs);
                            op1 = ops1.next();
                            op2 = Some(Step::Retain { n: n2 - n1, attrs: a2 });
                        }
                    }
                }
                (Some(Step::Insert { text, attrs }), Some(Step::Delete(n2))) => {
                    let len = text.chars().count();
                    match len.cmp(&n2) {
                        Ordering::Greater => {
                            op1 = Some(Step::Insert {
                                text: skip_chars(&text, n2),
                                attrs,
                            });
                            op2 = ops2.next();
                        }
                        Ordering::Equal => {
                            op1 = ops1.next();
                            op2 = ops2.next();
                        }
                        Ordering::Less => {
                            op1 = ops1.next();
                            op2 = Some(Step::Delete(n2 - len));
                        }
                    }
                }
                (Some(Step::Insert { text, attrs: a1 }), Some(Step::Retain { n: n2, attrs: a2 })) => {
                    let len = text.chars().count();
                    let attrs = compose_attributes(&a1, &a2, true);
                    match len.cmp(&n2) {
                        Ordering::Greater => {
                            out.push_insert(&take_chars(&text, n2), attrs);
                            op1 = Some(Step::Insert {
                                text: skip_chars(&text, n2),
                                attrs: a1,
                            });
                            op2 = ops2.next();
                        }
                        Ordering::Equal => {
                            out.push_insert(&text, attrs);
                            op1 = ops1.next();
                            op2 = ops2.next();
                        }
                        Ordering::Less => {
                            out.push_insert(&text, attrs);
                            op1 = ops1.next();
                            op2 = Some(Step::Retain { n: n2 - len, attrs: a2 });
                        }
                    }
                }
                (Some(Step::Retain { n: n1, attrs: a1 }), Some(Step::Delete(n2))) => match n1.cmp(&n2) {
                    Ordering::Greater => {
                        out.push_delete(n2);
                        op1 = Some(Step::Retain { n: n1 - n2, attrs: a1 });
                        op2 = ops2.next();
                    }
                    Ordering::Equal => {
                        out.push_delete(n2);
                        op1 = ops1.next();
                        op2 = ops2.next();
                    }
                    Ordering::Less => {
                        out.push_delete(n1);
                        op1 = ops1.next();
                        op2 = Some(Step::Delete(n2 - n1));
                    }
                },
            }
        }
        Ok(out)
    }

    /// Transforms two concurrent operations against each other.
    ///
    /// Returns `(self', other')` with
    /// `apply(apply(s, self), other') == apply(apply(s, other), self')`.
    /// Inserts at the same position put `self`'s text first.
    pub fn transform(&self, other: &TextOperation) -> Result<(TextOperation, TextOperation), OperationError> {
        if self.base_length != other.base_length {
            return Err(OperationError::LengthMismatch {
                expected: self.base_length,
                actual: other.base_length,
            });
        }
        let mut prime1 = TextOperation::new();
        let mut prime2 = TextOperation::new();
        let mut ops1 = self.steps.iter().cloned();
        let mut ops2 = other.steps.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,
                (Some(Step::Insert { text, attrs }), b) => {
                    prime2.push_retain(text.chars().count(), Attributes::new());
                    prime1.push_insert(&text, attrs);
                    op1 = ops1.next();
                    op2 = b;
                }
                (a, Some(Step::Insert { text, attrs })) => {
                    prime1.push_retain(text.chars().count(), Attributes::new());
                    prime2.push_insert(&text, attrs);
                    op1 = a;
                    op2 = ops2.next();
                }
                (None, Some(_)) => {
                    return Err(OperationError::IncompatibleOperations("first operation is too short"))
                }
                (Some(_), None) => {
                    return Err(OperationError::IncompatibleOperations("first operation is too long"))
                }
                (Some(Step::Retain { n: n1, attrs: a1 }), Some(Step::Retain { n: n2, attrs: a2 })) => {
                    let min = n1.min(n2);
                    let (attrs1, attrs2) = transform_attributes(&a1, &a2);
                    prime1.push_retain(min, attrs1);
                    prime2.push_retain(min, attrs2);
                    op1 = if n1 > min { Some(Step::Retain { n: n1 - min, attrs: a1 }) } else { ops1.next() };
                    op2 = if n2 > min { Some(Step::Retain { n: n2 - min, attrs: a2 }) } else { ops2.next() };
                }
                // Both deleted the same characters: nothing left to do.
                (Some(Step::Delete(n1)), Some(Step::Delete(n2))) => {
                    let min = n1.min(n2);
                    op1 = if n1 > min { Some(Step::Delete(n1 - min)) } else { ops1.next() };
                    op2 = if n2 > min { Some(Step::Delete(n2 - min)) } else { ops2.next() };
                }
                (Some(Step::Delete(n1)), Some(Step::Retain { n: n2, attrs: a2 })) => {
                    let min = n1.min(n2);
                    prime1.push_delete(min);
                    op1 = if n1 > min { Some(Step::Delete(n1 - min)) } else { ops1.next() };
                    op2 = if n2 > min { Some(Step::Retain { n: n2 - min, attrs: a2 }) } else { ops2.next() };
                }
                (Some(Step::Retain { n: n1, attrs: a1 }), Some(Step::Delete(n2))) => {
                    let min = n1.min(n2);
                    prime2.push_delete(min);
                    op1 = if n1 > min { Some(Step::Retain { n: n1 - min, attrs: a1 }) } else { ops1.next() };
                    op2 = if n2 > min { Some(Step::Delete(n2 - min)) } else { ops2.next() };
                }
            }
        }
        Ok((prime1, prime2))
    }

    // ── Undo grouping heuristics ──────────────────────────────────────────

    /// The single insert or delete of an operation that is otherwise only
    /// leading / trailing retains.
    fn simple_step(&self) -> Option<&Step> {
        match self.steps.as_slice() {
            [only] => Some(only),
            [Step::Retain { .. }, step] => Some(step),
            [step, Step::Retain { .. }] => Some(step),
            [Step::Retain { .. }, step, Step::Retain { .. }] => Some(step),
            _ => None,
        }
    }

    fn start_index(&self) -> usize {
        match self.steps.first() {
            Some(Step::Retain { n, .. }) => *n,
            _ => 0,
        }
    }

    /// Whether `other`, applied right after `self`, should join it in a single
    /// undo entry: consecutive typing, or consecutive backspace / delete-key
    /// presses.
    pub fn should_be_composed_with(&self, other: &TextOperation) -> bool {
        if self.is_noop() || other.is_noop() {
            return true;
        }
        let (start_a, start_b) = (self.start_index(), other.start_index());
        let (Some(a), Some(b)) = (self.simple_step(), other.simple_step()) else {
            return false;
        };
        match (a, b) {
            (Step::Insert { text, .. }, Step::Insert { .. }) => start_a + text.chars().count() == start_b,
            (Step::Delete(_), Step::Delete(n)) => start_b + n == start_a || start_a == start_b,
            _ => false,
        }
    }

    /// Same decision as [`should_be_composed_with`](Self::should_be_composed_with),
    /// made on the inverses of the two edits.
    pub fn should_be_composed_with_inverted(&self, other: &TextOperation) -> bool {
        if self.is_noop() || other.is_noop() {
            return true;
        }
        let (start_a, start_b) = (self.start_index(), other.start_index());
        let (Some(a), Some(b)) = (self.simple_step(), other.simple_step()) else {
            return false;
        };
        match (a, b) {
            (Step::Insert { text, .. }, Step::Insert { .. }) => {
                start_a + text.chars().count() == start_b || start_a == start_b
            }
            (Step::Delete(_), Step::Delete(n)) => start_b + n == start_a,
            _ => false,
        }
    }
}

impl Transformable for TextOperation {
    fn compose(&self, other: &Self) -> Result<Self, OperationError> {
        TextOperation::compose(self, other)
    }

    fn transform(&self, other: &Self) -> Result<(Self, Self), OperationError> {
        TextOperation::transform(self, other)
    }

    fn is_noop(&self) -> bool {
        TextOperation::is_noop(self)
    }
}

impl fmt::Display for TextOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
