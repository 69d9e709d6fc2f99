//! Annotation index for collaborative rich text.
//!
//! A [`SpanList`] partitions `[0, len)` of a document into maximal runs of
//! identical annotations (attribute sets, line classes, thread ids, ...).
//! Every structural change is reported to a [`SpanListener`] as the exact
//! list of runs that disappeared and the runs that replaced them, both with
//! absolute document offsets, so that objects attached to runs (rendered
//! markers and the like) can be detached and re-attached precisely.
//!
//! Runs live in an arena-backed treap ordered by position, so locating the
//! run under an offset and splicing a range are logarithmic.
//!
//! # Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! [`types`] | [`Span`], the old/new span records handed to listeners, [`SpanError`] |
//! [`span_list`] | [`SpanList`] and the splice primitive |
//! `tree` | the arena treap (crate-private) |

pub mod span_list;
pub mod types;

mod tree;

pub use span_list::SpanList;
pub use types::{
    AnnotatedSpan, NewSpan, NoopListener, OldSpan, Span, SpanError, SpanListener,
};
