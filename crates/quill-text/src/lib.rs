//! Gap-buffer text store.
//!
//! The document lives in one contiguous allocation with a movable gap at the
//! edit point. All offsets visible to callers are native indices that skip
//! the gap. The cursor is tracked in three coordinate systems at once: a
//! byte offset, a logical position (graphemes into line, line) and a visual
//! position (terminal cells into row, row — wrap-aware when word wrap is
//! on). Every mutation and motion re-derives the three together so they can
//! never drift apart.
//!
//! Unicode measurement is delegated to the [`ucd`] module, which walks
//! grapheme clusters directly over the two halves of the gap.

use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{trace, warn};

pub mod ucd;
pub mod undo;

use ucd::MeasureArgs;
use undo::{UndoEntry, UndoLog};

/// Gap growth quantum. Growth always overshoots the request by one chunk to
/// amortise bursts of small inserts.
const GAP_CHUNK: usize = 4096;

/// A position in signed cells or graphemes. Which one depends on context:
/// logical positions count graphemes per line, visual positions count
/// terminal columns per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The cursor in all three coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub offset: usize,
    pub logical: Point,
    pub visual: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    None,
    Maybe,
    Active,
    Done,
}

/// Selection endpoints in logical coordinates. `beg` may lie after `end`
/// while a drag is in flight; the store never swaps them, the renderer
/// orders them locally when drawing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selection {
    pub state: SelectionState,
    pub beg: Point,
    pub end: Point,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextStats {
    /// Line count; always at least 1.
    pub lines: i32,
}

#[derive(Debug, Error)]
pub enum TextIoError {
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy)]
enum WalkStop {
    Offset(usize),
    Logical(Point),
    Visual(Point),
}

struct RowCollector {
    first: i32,
    count: usize,
    spans: Vec<Range<usize>>,
}

pub struct TextBuffer {
    buf: Vec<u8>,
    gap_off: usize,
    gap_len: usize,
    cursor: Cursor,
    selection: Selection,
    undo: UndoLog,
    wrap: Option<u16>,
    dirty: bool,
    overtype: bool,
    stats: TextStats,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::from_str("")
    }

    pub fn from_str(content: &str) -> Self {
        let buf = content.as_bytes().to_vec();
        let lines = 1 + content.bytes().filter(|&b| b == b'\n').count() as i32;
        Self {
            gap_off: buf.len(),
            gap_len: 0,
            buf,
            cursor: Cursor::default(),
            selection: Selection::default(),
            undo: UndoLog::new(),
            wrap: None,
            dirty: false,
            overtype: false,
            stats: TextStats { lines },
        }
    }

    // ---- accessors --------------------------------------------------------

    pub fn text_len(&self) -> usize {
        self.buf.len() - self.gap_len
    }

    pub fn is_empty(&self) -> bool {
        self.text_len() == 0
    }

    pub fn line_count(&self) -> i32 {
        self.stats.lines
    }

    pub fn stats(&self) -> TextStats {
        self.stats
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn overtype(&self) -> bool {
        self.overtype
    }

    pub fn set_overtype(&mut self, on: bool) {
        self.overtype = on;
    }

    pub fn wrap_columns(&self) -> Option<u16> {
        self.wrap
    }

    pub fn wrap_enabled(&self) -> bool {
        self.wrap.is_some()
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    // ---- raw views --------------------------------------------------------

    /// Contiguous bytes from `off` up to the gap (or the end). Invalidated
    /// by any mutation; re-request after edits.
    pub fn read_forward(&self, off: usize) -> &[u8] {
        let off = off.min(self.text_len());
        if off < self.gap_off {
            &self.buf[off..self.gap_off]
        } else {
            &self.buf[off + self.gap_len..]
        }
    }

    /// Contiguous bytes ending at `off`, reaching back to the gap (or the
    /// start).
    pub fn read_backward(&self, off: usize) -> &[u8] {
        let off = off.min(self.text_len());
        if off <= self.gap_off {
            &self.buf[..off]
        } else {
            &self.buf[self.gap_off + self.gap_len..off + self.gap_len]
        }
    }

    fn halves(&self) -> (&[u8], &[u8]) {
        (
            &self.buf[..self.gap_off],
            &self.buf[self.gap_off + self.gap_len..],
        )
    }

    /// Copy `[beg, end)` into `out`, straddling the gap as needed.
    /// Out-of-range bounds clamp; an inverted range copies nothing.
    pub fn extract(&self, beg: usize, end: usize, out: &mut Vec<u8>) {
        let len = self.text_len();
        let beg = beg.min(len);
        let end = end.min(len);
        if beg >= end {
            return;
        }
        let (front, back) = self.halves();
        let front_end = end.min(front.len());
        if beg < front_end {
            out.extend_from_slice(&front[beg..front_end]);
        }
        let back_beg = beg.saturating_sub(front.len());
        let back_end = end.saturating_sub(front.len());
        if back_beg < back_end {
            out.extend_from_slice(&back[back_beg..back_end]);
        }
    }

    pub fn extract_string(&self, beg: usize, end: usize) -> String {
        let mut bytes = Vec::new();
        self.extract(beg, end, &mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn contents(&self) -> String {
        self.extract_string(0, self.text_len())
    }

    fn extract_bytes(&self, range: Range<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(range.len());
        self.extract(range.start, range.end, &mut out);
        out
    }

    // ---- gap management ---------------------------------------------------

    /// Move the gap to `off` and make sure it holds at least `len` bytes.
    fn allocate_gap(&mut self, off: usize, len: usize) {
        debug_assert!(off <= self.text_len());
        if off < self.gap_off {
            self.buf.copy_within(off..self.gap_off, off + self.gap_len);
            self.gap_off = off;
        } else if off > self.gap_off {
            self.buf
                .copy_within(self.gap_off + self.gap_len..off + self.gap_len, self.gap_off);
            self.gap_off = off;
        }
        if self.gap_len < len {
            let grow = (len - self.gap_len + GAP_CHUNK).next_multiple_of(GAP_CHUNK);
            let old = self.buf.len();
            self.buf.resize(old + grow, 0);
            self.buf
                .copy_within(self.gap_off + self.gap_len..old, self.gap_off + self.gap_len + grow);
            self.gap_len += grow;
            trace!(target: "text.gap", capacity = self.buf.len(), gap = self.gap_len, "grow");
        }
    }

    fn insert_bytes(&mut self, at: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.allocate_gap(at, bytes.len());
        self.buf[self.gap_off..self.gap_off + bytes.len()].copy_from_slice(bytes);
        self.gap_off += bytes.len();
        self.gap_len -= bytes.len();
        self.stats.lines += bytes.iter().filter(|&&b| b == b'\n').count() as i32;
    }

    fn remove_bytes(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.allocate_gap(range.start, 0);
        let doomed =
            &self.buf[self.gap_off + self.gap_len..self.gap_off + self.gap_len + range.len()];
        self.stats.lines -= doomed.iter().filter(|&&b| b == b'\n').count() as i32;
        self.gap_len += range.len();
    }

    // ---- position resolution ----------------------------------------------

    fn clamp_logical(&self, p: Point) -> Point {
        Point {
            x: p.x.max(0),
            y: p.y.clamp(0, self.stats.lines - 1),
        }
    }

    fn resolve_logical(&self, target: Point) -> Cursor {
        let target = self.clamp_logical(target);
        if self.wrap.is_some() {
            return self.walk_wrapped(WalkStop::Logical(target), None);
        }
        let (front, back) = self.halves();
        let (line_off, y) = ucd::newlines_forward(front, back, 0, 0, target.y);
        let m = ucd::measure_forward(
            front,
            back,
            MeasureArgs::new(line_off, Point::default()).limit(target.x as usize),
        );
        Cursor {
            offset: m.offset,
            logical: Point::new(m.movements as i32, y),
            visual: Point::new(m.pos.x, y),
        }
    }

    fn resolve_visual(&self, target: Point) -> Cursor {
        let target = Point::new(target.x.max(0), target.y.max(0));
        if self.wrap.is_some() {
            // Resolve to an offset first, then canonicalise: the offset walk
            // is the single source of truth for wrapped coordinates.
            let probe = self.walk_wrapped(WalkStop::Visual(target), None);
            return self.walk_wrapped(WalkStop::Offset(probe.offset), None);
        }
        let y = target.y.clamp(0, self.stats.lines - 1);
        let (front, back) = self.halves();
        let (line_off, y) = ucd::newlines_forward(front, back, 0, 0, y);
        let m = ucd::measure_forward(
            front,
            back,
            MeasureArgs::new(line_off, Point::default()).until_column(target.x),
        );
        Cursor {
            offset: m.offset,
            logical: Point::new(m.movements as i32, y),
            visual: Point::new(m.pos.x, y),
        }
    }

    fn resolve_offset(&self, off: usize) -> Cursor {
        let off = off.min(self.text_len());
        if self.wrap.is_some() {
            return self.walk_wrapped(WalkStop::Offset(off), None);
        }
        let (front, back) = self.halves();
        let y = ucd::count_newlines(front, back, 0, off);
        let line_off = ucd::line_start(front, back, off);
        let m = ucd::measure_forward(
            front,
            back,
            MeasureArgs::new(line_off, Point::default()).until_offset(off),
        );
        let mut offset = m.offset;
        let mut logical_x = m.movements as i32;
        let mut visual_x = m.pos.x;
        if offset < off && !m.hit_newline {
            // The target lands inside a cluster; snap past it so the cursor
            // stays on a grapheme boundary.
            let m2 = ucd::measure_forward(
                front,
                back,
                MeasureArgs::new(offset, Point::new(visual_x, 0)).limit(1),
            );
            offset = m2.offset;
            logical_x += m2.movements as i32;
            visual_x = m2.pos.x;
        }
        Cursor {
            offset,
            logical: Point::new(logical_x, y),
            visual: Point::new(visual_x, y),
        }
    }

    /// The wrapped-coordinate walk. Starts at the document origin and runs
    /// row by row, breaking at the wrap column (preferring the last word
    /// boundary) until `stop` is satisfied. Optionally records visual row
    /// spans along the way.
    fn walk_wrapped(&self, stop: WalkStop, mut rows: Option<&mut RowCollector>) -> Cursor {
        let wrap_cols = i32::from(self.wrap.unwrap_or(u16::MAX)).max(1);
        let (front, back) = self.halves();
        let total = self.text_len();
        let target_offset = match stop {
            WalkStop::Offset(t) => t.min(total),
            _ => total,
        };
        let mut offset = 0usize;
        let mut logical = Point::default();
        let mut visual = Point::default();
        let mut row_start = 0usize;
        let mut row_wrap: Option<(usize, i32)> = None;
        loop {
            let mut args =
                MeasureArgs::new(offset, Point::new(visual.x, 0)).until_column(wrap_cols);
            match stop {
                WalkStop::Offset(_) => args = args.until_offset(target_offset),
                WalkStop::Logical(t) if logical.y == t.y => {
                    args = args.limit((t.x - logical.x).max(0) as usize);
                }
                WalkStop::Visual(t) if visual.y == t.y => {
                    args = args.until_column(t.x.min(wrap_cols));
                }
                _ => {}
            }
            let logical_x_before = logical.x;
            let m = ucd::measure_forward(front, back, args);
            offset = m.offset;
            visual.x = m.pos.x;
            logical.x = logical_x_before + m.movements as i32;
            if let Some(wp) = m.wrap_opportunity {
                row_wrap = Some((wp.offset, logical_x_before + wp.movements as i32));
            }

            match stop {
                WalkStop::Offset(_) => {
                    if offset >= target_offset {
                        break;
                    }
                    if !m.hit_newline && !m.hit_column {
                        // A cluster straddles the target; snap past it.
                        let m2 = ucd::measure_forward(
                            front,
                            back,
                            MeasureArgs::new(offset, Point::new(visual.x, 0)).limit(1),
                        );
                        offset = m2.offset;
                        visual.x = m2.pos.x;
                        logical.x += m2.movements as i32;
                        break;
                    }
                }
                WalkStop::Logical(t) => {
                    if logical.y == t.y && (logical.x >= t.x || m.hit_newline) {
                        break;
                    }
                }
                WalkStop::Visual(t) => {
                    if visual.y == t.y {
                        break;
                    }
                }
            }

            if m.hit_newline {
                close_row(&mut rows, visual.y, row_start, offset);
                offset += 1;
                logical = Point::new(0, logical.y + 1);
                visual = Point::new(0, visual.y + 1);
                row_start = offset;
                row_wrap = None;
                continue;
            }
            if m.hit_column {
                // Space clusters at the boundary overhang the row; the wrap
                // break lands after them.
                let logical_cap = match stop {
                    WalkStop::Logical(t) if logical.y == t.y => (t.x - logical.x).max(0),
                    _ => i32::MAX,
                };
                let mut ate = 0i32;
                let mut arrived = false;
                while let Some(c) = ucd::next_cluster(front, back, offset) {
                    if c.newline || !c.space {
                        break;
                    }
                    if ate >= logical_cap {
                        arrived = true;
                        break;
                    }
                    offset += c.len;
                    visual.x += c.width;
                    logical.x += 1;
                    ate += 1;
                    if matches!(stop, WalkStop::Offset(_)) && offset >= target_offset {
                        arrived = true;
                        break;
                    }
                }
                if arrived {
                    break;
                }
                if ate > 0 {
                    close_row(&mut rows, visual.y, row_start, offset);
                    visual = Point::new(0, visual.y + 1);
                    row_start = offset;
                    row_wrap = None;
                    continue;
                }
                match row_wrap {
                    Some((break_off, break_lx)) if break_off > row_start => {
                        // Word wrap: the run since the last space moves down.
                        close_row(&mut rows, visual.y, row_start, break_off);
                        offset = break_off;
                        logical.x = break_lx;
                        visual = Point::new(0, visual.y + 1);
                        row_start = break_off;
                        row_wrap = None;
                    }
                    _ if m.movements == 0 && visual.x == 0 => {
                        // A cluster wider than the wrap width owns its row.
                        let m2 = ucd::measure_forward(
                            front,
                            back,
                            MeasureArgs::new(offset, Point::new(0, 0)).limit(1),
                        );
                        offset = m2.offset;
                        visual.x = m2.pos.x;
                        logical.x += m2.movements as i32;
                    }
                    _ => {
                        close_row(&mut rows, visual.y, row_start, offset);
                        visual = Point::new(0, visual.y + 1);
                        row_start = offset;
                        row_wrap = None;
                    }
                }
                continue;
            }
            break;
        }
        close_row(&mut rows, visual.y, row_start, offset);
        if matches!(stop, WalkStop::Offset(_) | WalkStop::Logical(_)) && visual.x >= wrap_cols {
            visual = Point::new(0, visual.y + 1);
        }
        Cursor {
            offset,
            logical,
            visual,
        }
    }

    // ---- cursor motion ----------------------------------------------------

    /// Move to a logical `(grapheme, line)` position, clamped to the
    /// document. Returns the resulting byte offset.
    pub fn cursor_move_to_logical(&mut self, pos: Point) -> usize {
        self.cursor = self.resolve_logical(pos);
        self.cursor.offset
    }

    /// Move to a visual `(column, row)` position, clamped to the document.
    pub fn cursor_move_to_visual(&mut self, pos: Point) -> usize {
        self.cursor = self.resolve_visual(pos);
        self.cursor.offset
    }

    /// Move by `n` grapheme movements (negative moves left). Newlines count
    /// as one movement.
    pub fn cursor_move_delta(&mut self, n: isize) -> usize {
        if n > 0 {
            let off = self.offset_after_movements(self.cursor.offset, n as usize);
            self.cursor = self.resolve_offset(off);
        } else if n < 0 {
            let target = self.logical_back_movements((-n) as usize);
            self.cursor = self.resolve_logical(target);
        }
        self.cursor.offset
    }

    /// Set (or clear) the word-wrap column count and re-derive the visual
    /// cursor position from the logical one under the new width.
    pub fn set_wrap(&mut self, columns: Option<u16>) {
        self.wrap = columns.map(|c| c.max(1));
        self.cursor = self.resolve_logical(self.cursor.logical);
    }

    fn offset_after_movements(&self, mut off: usize, mut n: usize) -> usize {
        let (front, back) = self.halves();
        while n > 0 {
            let m = ucd::measure_forward(front, back, MeasureArgs::new(off, Point::default()).limit(n));
            off = m.offset;
            n -= m.movements;
            if n > 0 {
                if m.hit_newline {
                    off += 1;
                    n -= 1;
                } else {
                    break;
                }
            }
        }
        off
    }

    fn logical_back_movements(&self, mut n: usize) -> Point {
        let mut p = self.cursor.logical;
        loop {
            if p.x as usize >= n {
                p.x -= n as i32;
                return p;
            }
            if p.y == 0 {
                return Point::default();
            }
            n -= p.x as usize + 1;
            p.y -= 1;
            p.x = self.line_cluster_count(p.y);
        }
    }

    fn line_cluster_count(&self, y: i32) -> i32 {
        let (front, back) = self.halves();
        let (line_off, _) = ucd::newlines_forward(front, back, 0, 0, y);
        ucd::measure_forward(front, back, MeasureArgs::new(line_off, Point::default())).movements
            as i32
    }

    // ---- editing ----------------------------------------------------------

    /// Insert `text` at the cursor, or replace the cluster under the cursor
    /// in overtype mode. Records one undo entry and leaves the cursor just
    /// past the insertion.
    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let at = self.cursor.offset;
        let mut removed = Vec::new();
        if self.overtype {
            let (front, back) = self.halves();
            let m = ucd::measure_forward(front, back, MeasureArgs::new(at, Point::default()).limit(1));
            if m.movements == 1 {
                removed = self.extract_bytes(at..m.offset);
            }
        }
        self.undo.push(UndoEntry {
            offset: at,
            cursor_before: self.cursor.logical,
            removed: removed.clone(),
            inserted: text.as_bytes().to_vec(),
        });
        if !removed.is_empty() {
            self.remove_bytes(at..at + removed.len());
        }
        self.insert_bytes(at, text.as_bytes());
        self.dirty = true;
        // Resolving through the line start subsumes the "did the insertion
        // join with its predecessor" check: a combining mark typed after its
        // base lands the cursor past the merged cluster.
        self.cursor = self.resolve_offset(at + text.len());
        trace!(target: "text.edit", at, inserted = text.len(), removed = removed.len(), "write");
    }

    /// Delete `n` grapheme movements forward (positive) or backward
    /// (negative) from the cursor. Returns whether anything was removed.
    pub fn delete(&mut self, n: isize) -> bool {
        if n == 0 {
            return false;
        }
        let (beg, end) = if n > 0 {
            let end = self.offset_after_movements(self.cursor.offset, n as usize);
            (self.cursor.offset, end)
        } else {
            let target = self.logical_back_movements((-n) as usize);
            (self.resolve_logical(target).offset, self.cursor.offset)
        };
        if beg >= end {
            return false;
        }
        let removed = self.extract_bytes(beg..end);
        self.undo.push(UndoEntry {
            offset: beg,
            cursor_before: self.cursor.logical,
            removed,
            inserted: Vec::new(),
        });
        self.remove_bytes(beg..end);
        self.dirty = true;
        self.cursor = self.resolve_offset(beg);
        trace!(target: "text.edit", beg, end, "delete");
        true
    }

    // ---- selection --------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Feed a new endpoint into the selection state machine: the first
    /// update anchors `beg`, later ones move `end` and arm the selection.
    pub fn selection_update(&mut self, pos: Point) {
        match self.selection.state {
            SelectionState::None | SelectionState::Done => {
                self.selection = Selection {
                    state: SelectionState::Maybe,
                    beg: pos,
                    end: pos,
                };
            }
            SelectionState::Maybe | SelectionState::Active => {
                self.selection.state = SelectionState::Active;
                self.selection.end = pos;
            }
        }
    }

    /// Finish the in-flight selection. An armed selection survives as
    /// `Done` (returns true); a mere press collapses to `None`.
    pub fn selection_end(&mut self) -> bool {
        if self.selection.state == SelectionState::Active {
            self.selection.state = SelectionState::Done;
            true
        } else {
            self.selection.state = SelectionState::None;
            false
        }
    }

    pub fn selection_clear(&mut self) {
        self.selection = Selection::default();
    }

    /// Ordered byte range of the current selection, if one is armed.
    pub fn selection_byte_range(&self) -> Option<Range<usize>> {
        match self.selection.state {
            SelectionState::Active | SelectionState::Done => {
                let a = self.resolve_logical(self.selection.beg).offset;
                let b = self.resolve_logical(self.selection.end).offset;
                if a == b {
                    None
                } else {
                    Some(a.min(b)..a.max(b))
                }
            }
            _ => None,
        }
    }

    /// Remove the selected range, moving the cursor to its start.
    pub fn delete_selection(&mut self) -> bool {
        let Some(range) = self.selection_byte_range() else {
            self.selection_clear();
            return false;
        };
        let removed = self.extract_bytes(range.clone());
        self.undo.push(UndoEntry {
            offset: range.start,
            cursor_before: self.cursor.logical,
            removed,
            inserted: Vec::new(),
        });
        self.remove_bytes(range.clone());
        self.cursor = self.resolve_offset(range.start);
        self.selection_clear();
        self.dirty = true;
        true
    }

    // ---- undo / redo ------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        if !self.undo.can_undo() {
            return false;
        }
        self.undo.retreat();
        self.apply_current_log_entry();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.undo.can_redo() {
            return false;
        }
        self.apply_current_log_entry();
        self.undo.advance();
        true
    }

    /// Apply the log entry at the tail: remove what it inserted, restore
    /// what it removed, then swap the record's sides and exchange its saved
    /// cursor with the live one so the inverse applies the same way.
    fn apply_current_log_entry(&mut self) {
        let mut entry = self.undo.take_current();
        if !entry.inserted.is_empty() {
            self.remove_bytes(entry.offset..entry.offset + entry.inserted.len());
        }
        if !entry.removed.is_empty() {
            self.insert_bytes(entry.offset, &entry.removed);
        }
        std::mem::swap(&mut entry.removed, &mut entry.inserted);
        let live = self.cursor.logical;
        self.cursor = self.resolve_logical(entry.cursor_before);
        entry.cursor_before = live;
        self.undo.restore_current(entry);
        self.dirty = true;
    }

    // ---- visual rows (for rendering) --------------------------------------

    /// Total number of visual rows under the current wrap width.
    pub fn visual_line_count(&self) -> i32 {
        match self.wrap {
            None => self.stats.lines,
            Some(_) => {
                self.walk_wrapped(WalkStop::Offset(self.text_len()), None)
                    .visual
                    .y
                    + 1
            }
        }
    }

    /// Byte spans of `count` consecutive visual rows starting at `first`.
    /// Spans exclude the terminating newline; rows past the end are omitted.
    pub fn visual_rows(&self, first: i32, count: usize) -> Vec<Range<usize>> {
        let first = first.max(0);
        if count == 0 {
            return Vec::new();
        }
        match self.wrap {
            None => self.line_spans(first, count),
            Some(_) => {
                let mut collector = RowCollector {
                    first,
                    count,
                    spans: Vec::new(),
                };
                self.walk_wrapped(WalkStop::Offset(self.text_len()), Some(&mut collector));
                collector.spans
            }
        }
    }

    fn line_spans(&self, first: i32, count: usize) -> Vec<Range<usize>> {
        let (front, back) = self.halves();
        let total = self.text_len();
        let (mut off, _) = ucd::newlines_forward(front, back, 0, 0, first);
        let mut spans = Vec::with_capacity(count);
        for line in first..first + count as i32 {
            if line >= self.stats.lines {
                break;
            }
            let (next, stepped) = ucd::newlines_forward(front, back, off, 0, 1);
            let end = if stepped == 1 { next - 1 } else { total };
            spans.push(off..end);
            off = next;
        }
        spans
    }

    // ---- file I/O ----------------------------------------------------------

    /// Replace the document with the contents of `path`. A file that cannot
    /// be opened or read leaves the buffer untouched and returns false.
    pub fn read_file(&mut self, path: &Path) -> bool {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                warn!(target: "text.io", path = %path.display(), %err, "read failed");
                return false;
            }
        };
        self.stats.lines = 1 + bytes.iter().filter(|&&b| b == b'\n').count() as i32;
        self.gap_off = bytes.len();
        self.gap_len = 0;
        self.buf = bytes;
        self.cursor = Cursor::default();
        self.selection = Selection::default();
        self.undo.clear();
        self.dirty = false;
        true
    }

    /// Write the document to `path`, emitting the two halves of the buffer
    /// in order.
    pub fn write_file(&mut self, path: &Path) -> Result<(), TextIoError> {
        let io = |source| TextIoError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = std::fs::File::create(path).map_err(io)?;
        let (front, back) = self.halves();
        file.write_all(front).map_err(io)?;
        file.write_all(back).map_err(io)?;
        file.flush().map_err(io)?;
        self.dirty = false;
        Ok(())
    }

    // ---- diagnostics -------------------------------------------------------

    /// Assert the store's structural invariants. Test support.
    #[doc(hidden)]
    pub fn debug_invariants(&self) {
        assert!(self.gap_off + self.gap_len <= self.buf.len());
        assert!(self.gap_off <= self.text_len());
        assert!(self.cursor.offset <= self.text_len());
        assert!(self.cursor.logical.x >= 0);
        assert!(self.cursor.logical.y >= 0 && self.cursor.logical.y < self.stats.lines);
        assert!(self.stats.lines >= 1);
        if self.wrap.is_none() {
            assert_eq!(self.cursor.visual.y, self.cursor.logical.y);
        }
    }
}

fn close_row(rows: &mut Option<&mut RowCollector>, row: i32, beg: usize, end: usize) {
    if let Some(collector) = rows.as_deref_mut() {
        if row >= collector.first && ((row - collector.first) as usize) < collector.count {
            collector.spans.push(beg..end);
        }
    }
}
