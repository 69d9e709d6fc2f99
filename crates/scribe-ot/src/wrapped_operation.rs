use crate::cursor::Cursor;
use crate::operation::{OperationError, TextOperation, Transformable};

/// Metadata carried alongside an operation and kept in step with it.
pub trait Meta: Clone {
    fn invert(&self) -> Self;
    fn compose(&self, other: &Self) -> Self;
    fn transform(&self, op: &TextOperation) -> Self;
}

impl Meta for () {
    fn invert(&self) -> Self {}
    fn compose(&self, _other: &Self) -> Self {}
    fn transform(&self, _op: &TextOperation) -> Self {}
}

/// Cursors around a local edit, so undo can restore the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelfMeta {
    pub cursor_before: Option<Cursor>,
    pub cursor_after: Option<Cursor>,
}

impl SelfMeta {
    pub fn new(cursor_before: Option<Cursor>, cursor_after: Option<Cursor>) -> Self {
        Self {
            cursor_before,
            cursor_after,
        }
    }
}

impl Meta for SelfMeta {
    fn invert(&self) -> Self {
        SelfMeta::new(self.cursor_after, self.cursor_before)
    }

    fn compose(&self, other: &Self) -> Self {
        SelfMeta::new(self.cursor_before, other.cursor_after)
    }

    fn transform(&self, op: &TextOperation) -> Self {
        SelfMeta::new(
            self.cursor_before.map(|c| c.transform(op)),
            self.cursor_after.map(|c| c.transform(op)),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrappedOperation<M = ()> {
    pub wrapped: TextOperation,
    pub meta: M,
}

impl<M: Meta> WrappedOperation<M> {
    pub fn new(wrapped: TextOperation, meta: M) -> Self {
        Self { wrapped, meta }
    }

    pub fn apply(&self, s: &str) -> Result<String, OperationError> {
        self.wrapped.apply(s)
    }

    pub fn invert(&self, s: &str) -> Result<Self, OperationError> {
        Ok(Self::new(self.wrapped.invert(s)?, self.meta.invert()))
    }
}

impl<M: Meta> Transformable for WrappedOperation<M> {
    fn compose(&self, other: &Self) -> Result<Self, OperationError> {
        Ok(Self::new(self.wrapped.compose(&other.wrapped)?, self.meta.compose(&other.meta)))
    }

    fn transform(&self, other: &Self) -> Result<(Self, Self), OperationError> {
        let (a, b) = self.wrapped.transform(&other.wrapped)?;
        Ok((
            Self::new(a, self.meta.transform(&other.wrapped)),
            Self::new(b, other.meta.transform(&self.wrapped)),
        ))
    }

    fn is_noop(&self) -> bool {
        self.wrapped.is_noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_meta_follows_the_algebra() {
        let meta = SelfMeta::new(Some(Cursor::caret(1)), Some(Cursor::caret(3)));
        assert_eq!(meta.invert(), SelfMeta::new(Some(Cursor::caret(3)), Some(Cursor::caret(1))));

        let later = SelfMeta::new(Some(Cursor::caret(3)), Some(Cursor::caret(7)));
        assert_eq!(meta.compose(&later), SelfMeta::new(Some(Cursor::caret(1)), Some(Cursor::caret(7))));
    }

    #[test]
    fn transform_moves_metadata_through_the_other_operation() {
        let a = WrappedOperation::new(
            TextOperation::new().retain(2).insert("x"),
            SelfMeta::new(Some(Cursor::caret(2)), Some(Cursor::caret(3))),
        );
        let b = WrappedOperation::new(TextOperation::new().insert("yy").retain(2), SelfMeta::default());
        let (a1, b1) = a.transform(&b).unwrap();
        assert_eq!(a1.meta, SelfMeta::new(Some(Cursor::caret(4)), Some(Cursor::caret(5))));
        assert_eq!(b1.meta, SelfMeta::default());
        assert_eq!(b1.apply(&a.apply("ab").unwrap()).unwrap(), "yyabx");
    }

    #[test]
    fn invert_and_compose_wrap_the_operation() {
        let op = WrappedOperation::new(TextOperation::new().retain(1).delete(1), ());
        let inverse = op.invert("ab").unwrap();
        assert_eq!(inverse.wrapped, TextOperation::new().retain(1).insert("b"));
        assert_eq!(op.compose(&inverse).unwrap().apply("ab").unwrap(), "ab");
        assert!(inverse.compose(&op).unwrap().is_noop());
    }
}
