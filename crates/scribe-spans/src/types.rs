//! Spans, change records and the listener contract.

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpanError {
    #[error("span {pos}..{end} exceeds the bounds of the span list (length {len})")]
    OutOfBounds { pos: usize, end: usize, len: usize },
    #[error("adjacent runs at offset {0} carry equal annotations")]
    UnmergedRuns(usize),
}

// ── Span ──────────────────────────────────────────────────────────────────

/// A half-open character range `[pos, pos + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub pos: usize,
    pub length: usize,
}

impl Span {
    pub fn new(pos: usize, length: usize) -> Self {
        Self { pos, length }
    }

    pub fn end(&self) -> usize {
        self.pos + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

// ── Change records ────────────────────────────────────────────────────────

/// A run that was removed from the list by a splice.
///
/// Owns whatever object had been attached to the run; the listener may take
/// it to tear it down; otherwise it is dropped after the listener returns.
#[derive(Debug)]
pub struct OldSpan<A, O> {
    pub pos: usize,
    pub length: usize,
    pub annotation: A,
    pub(crate) attached: Option<O>,
}

impl<A, O> OldSpan<A, O> {
    pub fn span(&self) -> Span {
        Span::new(self.pos, self.length)
    }

    pub fn attached_object(&self) -> Option<&O> {
        self.attached.as_ref()
    }

    pub fn take_attached_object(&mut self) -> Option<O> {
        self.attached.take()
    }
}

/// A run that was created by a splice.
///
/// Anything passed to [`NewSpan::attach_object`] is stored on the run once
/// the listener returns and is handed back through [`OldSpan`] when the run
/// is later split, merged or removed.
#[derive(Debug)]
pub struct NewSpan<A, O> {
    pub pos: usize,
    pub length: usize,
    pub annotation: A,
    pub(crate) attached: Option<O>,
}

impl<A, O> NewSpan<A, O> {
    pub fn span(&self) -> Span {
        Span::new(self.pos, self.length)
    }

    pub fn attach_object(&mut self, object: O) {
        self.attached = Some(object);
    }
}

/// Read-only view of a run currently in the list.
#[derive(Debug)]
pub struct AnnotatedSpan<'a, A, O> {
    pub pos: usize,
    pub length: usize,
    pub annotation: &'a A,
    pub attached: Option<&'a O>,
}

impl<A, O> AnnotatedSpan<'_, A, O> {
    pub fn span(&self) -> Span {
        Span::new(self.pos, self.length)
    }
}

impl<A, O> Clone for AnnotatedSpan<'_, A, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, O> Copy for AnnotatedSpan<'_, A, O> {}

// ── Listener ──────────────────────────────────────────────────────────────

/// Receives every structural change of a [`SpanList`](crate::SpanList).
pub trait SpanListener<A, O> {
    fn on_change(&mut self, old: &mut [OldSpan<A, O>], new: &mut [NewSpan<A, O>]);
}

/// Listener that ignores all changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl<A, O> SpanListener<A, O> for NoopListener {
    fn on_change(&mut self, _old: &mut [OldSpan<A, O>], _new: &mut [NewSpan<A, O>]) {}
}

impl<A, O, F> SpanListener<A, O> for F
where
    F: FnMut(&mut [OldSpan<A, O>], &mut [NewSpan<A, O>]),
{
    fn on_change(&mut self, old: &mut [OldSpan<A, O>], new: &mut [NewSpan<A, O>]) {
        self(old, new)
    }
}
