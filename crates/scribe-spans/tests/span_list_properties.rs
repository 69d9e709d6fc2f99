use std::collections::BTreeSet;

use proptest::prelude::*;
use scribe_spans::{NewSpan, OldSpan, Span, SpanList};

#[derive(Debug, Clone)]
enum Edit {
    Insert { pos_pct: f64, len: usize, ann: u8 },
    Remove { pos_pct: f64, len_pct: f64 },
    Update { pos_pct: f64, len_pct: f64, ann: u8 },
}

fn arbitrary_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0.0..=1.0f64, 1usize..6, 0u8..3).prop_map(|(pos_pct, len, ann)| Edit::Insert { pos_pct, len, ann }),
        (0.0..=1.0f64, 0.0..=0.5f64).prop_map(|(pos_pct, len_pct)| Edit::Remove { pos_pct, len_pct }),
        (0.0..=1.0f64, 0.0..=0.5f64, 0u8..3).prop_map(|(pos_pct, len_pct, ann)| Edit::Update { pos_pct, len_pct, ann }),
    ]
}

fn range(len: usize, pos_pct: f64, len_pct: f64) -> Span {
    let pos = ((pos_pct * len as f64) as usize).min(len);
    let max = len - pos;
    let n = ((len_pct * max as f64) as usize).min(max);
    Span::new(pos, n)
}

/// Tracks which attached ids are alive, enforcing the attach/detach contract.
#[derive(Default)]
struct Markers {
    next_id: u32,
    live: BTreeSet<u32>,
}

impl Markers {
    fn on_change(&mut self, old: &mut [OldSpan<u8, u32>], new: &mut [NewSpan<u8, u32>]) {
        for span in old.iter_mut() {
            let id = span.take_attached_object().expect("every run carries a marker");
            assert!(self.live.remove(&id), "marker {id} detached twice");
        }
        for span in new.iter_mut() {
            self.next_id += 1;
            self.live.insert(self.next_id);
            span.attach_object(self.next_id);
        }
    }
}

fn flatten<L>(list: &SpanList<u8, u32, L>) -> Vec<u8>
where
    L: scribe_spans::SpanListener<u8, u32>,
{
    let mut out = Vec::new();
    for run in list.iter() {
        out.extend(std::iter::repeat(*run.annotation).take(run.length));
    }
    out
}

proptest! {
    #[test]
    fn runs_stay_maximal_and_match_model(edits in prop::collection::vec(arbitrary_edit(), 1..60)) {
        let mut markers = Markers::default();
        let mut list = SpanList::with_listener(|old: &mut [OldSpan<u8, u32>], new: &mut [NewSpan<u8, u32>]| {
            markers.on_change(old, new);
        });
        let mut model: Vec<u8> = Vec::new();

        for edit in &edits {
            match *edit {
                Edit::Insert { pos_pct, len, ann } => {
                    let pos = ((pos_pct * model.len() as f64) as usize).min(model.len());
                    list.insert_annotated_span(Span::new(pos, len), ann).unwrap();
                    model.splice(pos..pos, std::iter::repeat(ann).take(len));
                }
                Edit::Remove { pos_pct, len_pct } => {
                    let span = range(model.len(), pos_pct, len_pct);
                    list.remove_span(span).unwrap();
                    model.drain(span.pos..span.end());
                }
                Edit::Update { pos_pct, len_pct, ann } => {
                    let span = range(model.len(), pos_pct, len_pct);
                    list.update_span(span, |_, _| ann).unwrap();
                    for c in &mut model[span.pos..span.end()] {
                        *c = ann;
                    }
                }
            }
            prop_assert!(list.check_invariants().is_ok());
            prop_assert_eq!(list.len(), model.len());
            prop_assert_eq!(flatten(&list), model.clone());
        }

        let attached: BTreeSet<u32> = list.iter().map(|run| *run.attached.expect("run without marker")).collect();
        drop(list);
        prop_assert_eq!(attached, markers.live.clone());
    }
}

#[test]
fn listener_sees_absolute_offsets() {
    let mut log: Vec<(Vec<(usize, usize, char)>, Vec<(usize, usize, char)>)> = Vec::new();
    let mut list = SpanList::with_listener(|old: &mut [OldSpan<char, ()>], new: &mut [NewSpan<char, ()>]| {
        log.push((
            old.iter().map(|s| (s.pos, s.length, s.annotation)).collect(),
            new.iter().map(|s| (s.pos, s.length, s.annotation)).collect(),
        ));
    });
    list.insert_annotated_span(Span::new(0, 4), 'a').unwrap();
    list.insert_annotated_span(Span::new(4, 4), 'b').unwrap();
    list.update_span(Span::new(4, 2), |_, _| 'a').unwrap();
    drop(list);

    assert_eq!(log[0], (vec![], vec![(0, 4, 'a')]));
    assert_eq!(log[1], (vec![], vec![(4, 4, 'b')]));
    // The updated prefix of 'b' merges into the preceding 'a' run.
    assert_eq!(log[2], (vec![(0, 4, 'a'), (4, 4, 'b')], vec![(0, 6, 'a'), (6, 2, 'b')]));
}

#[test]
fn removing_everything_empties_the_list() {
    let mut list: SpanList<char> = SpanList::new();
    list.insert_annotated_span(Span::new(0, 3), 'x').unwrap();
    list.insert_annotated_span(Span::new(3, 3), 'y').unwrap();
    list.remove_span(Span::new(0, 6)).unwrap();
    assert!(list.is_empty());
    assert_eq!(list.count(), 0);
    assert!(list.get_annotated_spans_for_pos(0).unwrap().is_empty());
}
