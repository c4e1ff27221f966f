//! Property tests: the gap buffer against a plain-string reference model.
//!
//! Generated text is ASCII so bytes, graphemes and columns coincide; the
//! model can then track the cursor as a byte index and mirror every
//! operation exactly, including undo/redo as whole-state snapshots.

use proptest::prelude::*;
use quill_text::{Point, TextBuffer};

#[derive(Clone, Debug)]
enum Op {
    Insert(String),
    Delete(i8),
    MoveDelta(i8),
    MoveTo(u8, u8),
    Undo,
    Redo,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z \\n]{0,6}".prop_map(Op::Insert),
        (-5i8..=5).prop_map(Op::Delete),
        (-8i8..=8).prop_map(Op::MoveDelta),
        (0u8..12, 0u8..6).prop_map(|(x, y)| Op::MoveTo(x, y)),
        Just(Op::Undo),
        Just(Op::Redo),
    ]
}

#[derive(Clone, Default)]
struct Model {
    text: String,
    cursor: usize,
    undo: Vec<(String, usize)>,
    redo: Vec<(String, usize)>,
}

impl Model {
    fn logical_to_offset(&self, x: usize, y: usize) -> usize {
        let lines: Vec<&str> = self.text.split('\n').collect();
        let y = y.min(lines.len() - 1);
        let prefix: usize = lines[..y].iter().map(|l| l.len() + 1).sum();
        prefix + x.min(lines[y].len())
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Insert(s) => {
                if s.is_empty() {
                    return;
                }
                self.undo.push((self.text.clone(), self.cursor));
                self.redo.clear();
                self.text.insert_str(self.cursor, s);
                self.cursor += s.len();
            }
            Op::Delete(n) => {
                let (beg, end) = if *n >= 0 {
                    (self.cursor, (self.cursor + *n as usize).min(self.text.len()))
                } else {
                    (self.cursor.saturating_sub((-*n) as usize), self.cursor)
                };
                if beg >= end {
                    return;
                }
                self.undo.push((self.text.clone(), self.cursor));
                self.redo.clear();
                self.text.replace_range(beg..end, "");
                self.cursor = beg;
            }
            Op::MoveDelta(n) => {
                self.cursor = if *n >= 0 {
                    (self.cursor + *n as usize).min(self.text.len())
                } else {
                    self.cursor.saturating_sub((-*n) as usize)
                };
            }
            Op::MoveTo(x, y) => {
                self.cursor = self.logical_to_offset(*x as usize, *y as usize);
            }
            Op::Undo => {
                if let Some((text, cursor)) = self.undo.pop() {
                    self.redo.push((self.text.clone(), self.cursor));
                    self.text = text;
                    self.cursor = cursor;
                }
            }
            Op::Redo => {
                if let Some((text, cursor)) = self.redo.pop() {
                    self.undo.push((self.text.clone(), self.cursor));
                    self.text = text;
                    self.cursor = cursor;
                }
            }
        }
    }
}

fn apply_store(tb: &mut TextBuffer, op: &Op) {
    match op {
        Op::Insert(s) => tb.write(s),
        Op::Delete(n) => {
            tb.delete(*n as isize);
        }
        Op::MoveDelta(n) => {
            tb.cursor_move_delta(*n as isize);
        }
        Op::MoveTo(x, y) => {
            tb.cursor_move_to_logical(Point::new(*x as i32, *y as i32));
        }
        Op::Undo => {
            tb.undo();
        }
        Op::Redo => {
            tb.redo();
        }
    }
}

proptest! {
    #[test]
    fn store_matches_reference_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let mut tb = TextBuffer::new();
        let mut model = Model::default();
        for op in &ops {
            apply_store(&mut tb, op);
            model.apply(op);
            tb.debug_invariants();
            prop_assert_eq!(tb.contents(), model.text.clone());
            prop_assert_eq!(tb.cursor().offset, model.cursor);
            prop_assert_eq!(tb.text_len(), model.text.len());
        }
    }

    #[test]
    fn extract_matches_read_views(ops in proptest::collection::vec(op_strategy(), 0..24)) {
        let mut tb = TextBuffer::new();
        for op in &ops {
            apply_store(&mut tb, op);
        }
        let len = tb.text_len();
        let mut joined = tb.read_forward(0).to_vec();
        if joined.len() < len {
            joined.extend_from_slice(tb.read_forward(joined.len()));
        }
        let mut extracted = Vec::new();
        tb.extract(0, len, &mut extracted);
        prop_assert_eq!(joined, extracted);
    }

    #[test]
    fn logical_moves_are_idempotent(ops in proptest::collection::vec(op_strategy(), 0..24),
                                    x in 0i32..16, y in 0i32..8) {
        let mut tb = TextBuffer::new();
        for op in &ops {
            apply_store(&mut tb, op);
        }
        tb.cursor_move_to_logical(Point::new(x, y));
        let first = tb.cursor();
        tb.cursor_move_to_logical(Point::new(x, y));
        prop_assert_eq!(tb.cursor(), first);
    }

    #[test]
    fn undo_all_then_redo_all_is_identity(ops in proptest::collection::vec(op_strategy(), 0..32)) {
        let mut tb = TextBuffer::new();
        for op in &ops {
            // Keep undo/redo out of the edit run; they are exercised above.
            if matches!(op, Op::Undo | Op::Redo) {
                continue;
            }
            apply_store(&mut tb, op);
        }
        let text = tb.contents();
        let mut depth = 0usize;
        while tb.undo() {
            depth += 1;
        }
        prop_assert_eq!(tb.text_len(), 0);
        for _ in 0..depth {
            prop_assert!(tb.redo());
        }
        prop_assert_eq!(tb.contents(), text);
    }
}
