//! [`SpanList`]: the authoritative partition of a document into annotated
//! runs.
//!
//! All mutations funnel through [`SpanList::splice`], which
//!
//! 1. finds the runs touched by a span, plus the run right before it (only if
//!    the span starts on a run boundary) and the run right after it (only if
//!    the span ends on one),
//! 2. detaches the touched runs,
//! 3. asks a range-specific builder for their replacement,
//! 4. merges equal neighbours inside the replacement and against the
//!    predecessor / successor,
//! 5. splices the result back, and
//! 6. reports `(old, new)` runs with absolute offsets to the listener.

use crate::tree::RunTree;
use crate::types::{AnnotatedSpan, NewSpan, NoopListener, OldSpan, Span, SpanError, SpanListener};

/// A run handed to, and produced by, splice builders.
#[derive(Debug, Clone, PartialEq)]
struct Run<A> {
    length: usize,
    annotation: A,
}

impl<A> Run<A> {
    fn new(length: usize, annotation: A) -> Self {
        Self { length, annotation }
    }
}

/// Boundary neighbour of a splice: node id, start offset, length, annotation.
struct Neighbour<A> {
    id: u32,
    pos: usize,
    length: usize,
    annotation: A,
}

/// Partition of `[0, len)` into maximal runs of equal annotations.
///
/// `A` is the annotation (compared with `==`), `O` the type of objects that
/// may be attached to runs, `L` the change listener.
#[derive(Debug, Clone)]
pub struct SpanList<A, O = (), L = NoopListener> {
    tree: RunTree<A, O>,
    listener: L,
}

impl<A, O> SpanList<A, O, NoopListener>
where
    A: Clone + PartialEq,
{
    pub fn new() -> Self {
        Self::with_listener(NoopListener)
    }
}

impl<A, O> Default for SpanList<A, O, NoopListener>
where
    A: Clone + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, O, L> SpanList<A, O, L>
where
    A: Clone + PartialEq,
    L: SpanListener<A, O>,
{
    pub fn with_listener(listener: L) -> Self {
        Self {
            tree: RunTree::new(),
            listener,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Total length covered by all runs.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Inserts `span.length` characters annotated with `annotation` at
    /// `span.pos`, shifting everything after it.
    pub fn insert_annotated_span(&mut self, span: Span, annotation: A) -> Result<(), SpanError> {
        self.check_bounds(Span::new(span.pos, 0))?;
        if span.is_empty() {
            return Ok(());
        }
        if self.tree.len().checked_add(span.length).is_none() {
            return Err(SpanError::OutOfBounds {
                pos: span.pos,
                end: span.pos.saturating_add(span.length),
                len: self.tree.len(),
            });
        }
        let pos = span.pos;
        self.splice(Span::new(pos, 0), move |old_pos, old| {
            let inserted = Run::new(span.length, annotation);
            match old.first() {
                None => vec![inserted],
                Some(old) => vec![
                    Run::new(pos - old_pos, old.annotation.clone()),
                    inserted,
                    Run::new(old_pos + old.length - pos, old.annotation.clone()),
                ],
            }
        })
    }

    /// Removes the characters covered by `span`.
    pub fn remove_span(&mut self, span: Span) -> Result<(), SpanError> {
        self.check_bounds(span)?;
        if span.is_empty() {
            return Ok(());
        }
        self.splice(span, |old_pos, old| {
            let mut out = Vec::with_capacity(2);
            if let Some(first) = old.first() {
                if span.pos > old_pos {
                    out.push(Run::new(span.pos - old_pos, first.annotation.clone()));
                }
            }
            if let Some(last) = old.last() {
                let old_end = old_pos + old.iter().map(|r| r.length).sum::<usize>();
                if old_end > span.end() {
                    out.push(Run::new(old_end - span.end(), last.annotation.clone()));
                }
            }
            out
        })
    }

    /// Replaces the annotation of every character in `span` with
    /// `update(old_annotation, run_length)`.
    pub fn update_span<F>(&mut self, span: Span, mut update: F) -> Result<(), SpanError>
    where
        F: FnMut(&A, usize) -> A,
    {
        self.check_bounds(span)?;
        if span.is_empty() {
            return Ok(());
        }
        self.splice(span, |start_pos, old| {
            let mut out = Vec::with_capacity(old.len() + 2);
            let mut current_pos = start_pos;
            let mut old_pos = start_pos;
            let before = span.pos - start_pos;
            if let (true, Some(first)) = (before > 0, old.first()) {
                out.push(Run::new(before, first.annotation.clone()));
                current_pos += before;
            }
            let mut i = 0;
            while let Some(run) = old.get(i) {
                if span.end() < old_pos + run.length {
                    break;
                }
                let length = old_pos + run.length - current_pos;
                out.push(Run::new(length, update(&run.annotation, length)));
                current_pos += length;
                old_pos += run.length;
                i += 1;
            }
            let update_chars = span.end() - current_pos;
            if let (true, Some(run)) = (update_chars > 0, old.get(i)) {
                out.push(Run::new(update_chars, update(&run.annotation, update_chars)));
                current_pos += update_chars;
                out.push(Run::new(old_pos + run.length - current_pos, run.annotation.clone()));
            }
            out
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// The runs touching offset `pos`: the run ending at `pos` (if `pos` is a
    /// run boundary) and the run containing `pos`.
    pub fn get_annotated_spans_for_pos(&self, pos: usize) -> Result<Vec<AnnotatedSpan<'_, A, O>>, SpanError> {
        self.check_bounds(Span::new(pos, 0))?;
        let mut res = Vec::with_capacity(2);
        match self.tree.locate(pos) {
            Some((index, start, id)) => {
                if start == pos && index > 0 {
                    if let Some((prev, prev_pos)) = self.tree.nth(index - 1) {
                        res.push(self.view(prev, prev_pos));
                    }
                }
                res.push(self.view(id, start));
            }
            None => {
                let count = self.tree.count();
                if count > 0 {
                    if let Some((last, last_pos)) = self.tree.nth(count - 1) {
                        res.push(self.view(last, last_pos));
                    }
                }
            }
        }
        Ok(res)
    }

    /// The runs overlapping `span`, clipped to it.
    pub fn get_annotated_spans_for_span(&self, span: Span) -> Result<Vec<AnnotatedSpan<'_, A, O>>, SpanError> {
        self.check_bounds(span)?;
        if span.is_empty() {
            return Ok(Vec::new());
        }
        let mut res = Vec::new();
        let Some((mut index, mut current_pos, _)) = self.tree.locate(span.pos) else {
            return Ok(res);
        };
        while current_pos < span.end() {
            let Some((id, _)) = self.tree.nth(index) else {
                break;
            };
            let node = self.tree.node(id);
            let start = current_pos.max(span.pos);
            let end = (current_pos + node.length).min(span.end());
            res.push(AnnotatedSpan {
                pos: start,
                length: end - start,
                annotation: &node.annotation,
                attached: node.attached.as_ref(),
            });
            current_pos += node.length;
            index += 1;
        }
        Ok(res)
    }

    /// All runs in document order.
    pub fn iter(&self) -> impl Iterator<Item = AnnotatedSpan<'_, A, O>> + '_ {
        let mut pos = 0;
        self.tree.in_order(self.tree.root).into_iter().map(move |id| {
            let view = self.view(id, pos);
            pos += view.length;
            view
        })
    }

    /// Number of runs. Debug builds also verify that no two neighbouring runs
    /// carry equal annotations.
    pub fn count(&self) -> usize {
        debug_assert!(self.check_invariants().is_ok(), "span list holds unmerged runs");
        self.tree.count()
    }

    /// Verifies that neighbouring runs differ.
    pub fn check_invariants(&self) -> Result<(), SpanError> {
        let mut prev: Option<AnnotatedSpan<'_, A, O>> = None;
        for run in self.iter() {
            if let Some(p) = prev {
                if p.annotation == run.annotation {
                    return Err(SpanError::UnmergedRuns(run.pos));
                }
            }
            prev = Some(run);
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn view(&self, id: u32, pos: usize) -> AnnotatedSpan<'_, A, O> {
        let node = self.tree.node(id);
        AnnotatedSpan {
            pos,
            length: node.length,
            annotation: &node.annotation,
            attached: node.attached.as_ref(),
        }
    }

    fn check_bounds(&self, span: Span) -> Result<(), SpanError> {
        let len = self.tree.len();
        match span.pos.checked_add(span.length) {
            Some(end) if end <= len => Ok(()),
            _ => Err(SpanError::OutOfBounds {
                pos: span.pos,
                end: span.pos.saturating_add(span.length),
                len,
            }),
        }
    }

    fn neighbour(&self, index: usize) -> Option<Neighbour<A>> {
        self.tree.nth(index).map(|(id, pos)| {
            let node = self.tree.node(id);
            Neighbour {
                id,
                pos,
                length: node.length,
                annotation: node.annotation.clone(),
            }
        })
    }

    /// The shared splice primitive. `build(start_pos, affected)` receives the
    /// detached runs (empty when `span` is empty and sits on a run boundary)
    /// and returns their replacement. Bounds must already be checked.
    fn splice<F>(&mut self, span: Span, build: F) -> Result<(), SpanError>
    where
        F: FnOnce(usize, &[Run<A>]) -> Vec<Run<A>>,
    {
        let count = self.tree.count();
        let (start_index, start_pos) = match self.tree.locate(span.pos) {
            Some((index, start, _)) => (index, start),
            None => (count, self.tree.len()),
        };
        let on_boundary = start_pos == span.pos;

        // Affected runs are [start_index, end_index).
        let (end_index, end_pos) = if span.is_empty() && on_boundary {
            (start_index, start_pos)
        } else {
            let last = if span.is_empty() { span.pos } else { span.end() - 1 };
            match self.tree.locate(last) {
                Some((index, start, id)) => (index + 1, start + self.tree.node(id).length),
                None => {
                    return Err(SpanError::OutOfBounds {
                        pos: span.pos,
                        end: span.end(),
                        len: self.tree.len(),
                    })
                }
            }
        };

        let pred = if on_boundary && span.pos > 0 {
            self.neighbour(start_index - 1)
        } else {
            None
        };
        let succ = if end_pos == span.end() && end_index < count {
            self.neighbour(end_index)
        } else {
            None
        };

        // Cut the tree into left | pred | affected | succ | right.
        let pred_n = usize::from(pred.is_some());
        let succ_n = usize::from(succ.is_some());
        let (left, rest) = self.tree.split(self.tree.root, start_index - pred_n);
        let (pred_tree, rest) = self.tree.split(rest, pred_n);
        let (affected_tree, rest) = self.tree.split(rest, end_index - start_index);
        let (succ_tree, right) = self.tree.split(rest, succ_n);
        self.tree.root = None;

        let mut old_spans: Vec<OldSpan<A, O>> = Vec::new();
        let mut affected: Vec<Run<A>> = Vec::with_capacity(end_index - start_index);
        let mut detached: Vec<OldSpan<A, O>> = Vec::with_capacity(end_index - start_index);
        let mut old_pos = start_pos;
        for id in self.tree.in_order(affected_tree) {
            let (length, annotation) = {
                let node = self.tree.node(id);
                (node.length, node.annotation.clone())
            };
            let attached = self.tree.release(id);
            affected.push(Run::new(length, annotation.clone()));
            detached.push(OldSpan {
                pos: old_pos,
                length,
                annotation,
                attached,
            });
            old_pos += length;
        }

        let mut new_runs = merge_runs(build(start_pos, &affected));

        let mut new_pos = start_pos;
        let mut pred_merged = false;
        let mut succ_merged = false;
        if !new_runs.is_empty() {
            if let Some(p) = &pred {
                if new_runs[0].annotation == p.annotation {
                    new_runs[0].length += p.length;
                    new_pos = p.pos;
                    pred_merged = true;
                }
            }
            if let (Some(s), Some(last)) = (&succ, new_runs.last_mut()) {
                if last.annotation == s.annotation {
                    last.length += s.length;
                    succ_merged = true;
                }
            }
        } else if let (Some(p), Some(s)) = (&pred, &succ) {
            if p.annotation == s.annotation {
                new_runs.push(Run::new(p.length + s.length, p.annotation.clone()));
                new_pos = p.pos;
                pred_merged = true;
                succ_merged = true;
            }
        }

        if let (true, Some(p)) = (pred_merged, pred) {
            let attached = self.tree.release(p.id);
            old_spans.push(OldSpan {
                pos: p.pos,
                length: p.length,
                annotation: p.annotation,
                attached,
            });
        }
        old_spans.append(&mut detached);
        if let (true, Some(s)) = (succ_merged, succ) {
            let attached = self.tree.release(s.id);
            old_spans.push(OldSpan {
                pos: old_pos,
                length: s.length,
                annotation: s.annotation,
                attached,
            });
        }

        let mut new_ids = Vec::with_capacity(new_runs.len());
        let mut new_spans = Vec::with_capacity(new_runs.len());
        let mut middle = None;
        for run in new_runs {
            let id = self.tree.alloc(run.length, run.annotation.clone());
            middle = self.tree.merge(middle, Some(id));
            new_ids.push(id);
            new_spans.push(NewSpan {
                pos: new_pos,
                length: run.length,
                annotation: run.annotation,
                attached: None,
            });
            new_pos += run.length;
        }

        let mut root = left;
        if !pred_merged {
            root = self.tree.merge(root, pred_tree);
        }
        root = self.tree.merge(root, middle);
        if !succ_merged {
            root = self.tree.merge(root, succ_tree);
        }
        self.tree.root = self.tree.merge(root, right);

        self.listener.on_change(&mut old_spans, &mut new_spans);

        for (id, span) in new_ids.into_iter().zip(new_spans) {
            if let Some(object) = span.attached {
                self.tree.node_mut(id).attached = Some(object);
            }
        }
        Ok(())
    }
}

/// Coalesces neighbouring runs with equal annotations and drops empty runs.
fn merge_runs<A: PartialEq>(runs: Vec<Run<A>>) -> Vec<Run<A>> {
    let mut out: Vec<Run<A>> = Vec::with_capacity(runs.len());
    for run in runs {
        if run.length == 0 {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.annotation == run.annotation => last.length += run.length,
            _ => out.push(run),
        }
    }
    out
}
