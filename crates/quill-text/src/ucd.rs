//! Grapheme cluster measurement over a document stored as two byte halves.
//!
//! The gap buffer exposes its contents as a `(front, back)` pair of slices so
//! measurement never has to copy the document into one allocation. A plain
//! slice is measured as `(slice, &[])`. All offsets taken and returned here
//! are native indices: the gap does not exist from this module's point of
//! view, `front.len()` is immediately followed by `back[0]`.
//!
//! Contract:
//! - Clusters never span a newline; `measure_forward` stops *before* a `\n`
//!   and reports it via `hit_newline`. Crossing is one explicit byte at the
//!   call site, which keeps line bookkeeping in exactly one place.
//! - Invalid UTF-8 measures as one replacement cell per byte.
//! - Widths come from `unicode-width` per cluster; control bytes other than
//!   `\n` occupy one cell, combining-only clusters may occupy zero.

use crate::Point;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Window sizes for cluster decoding. A cluster longer than `WINDOW_MAX`
/// bytes (pathological ZWJ chains) is split; everything realistic fits.
const WINDOW: usize = 64;
const WINDOW_MAX: usize = 256;

/// One decoded grapheme cluster.
#[derive(Clone, Copy, Debug)]
pub struct Cluster {
    /// Byte length of the cluster.
    pub len: usize,
    /// Terminal cell width.
    pub width: i32,
    /// The cluster is a line feed.
    pub newline: bool,
    /// The cluster is a space or tab, i.e. a legal word-wrap break point.
    pub space: bool,
}

/// Arguments for a measurement walk. Constructed with [`MeasureArgs::new`]
/// and narrowed with the builder methods; every stop defaults to "none".
#[derive(Clone, Copy, Debug)]
pub struct MeasureArgs {
    /// Starting native offset.
    pub offset: usize,
    /// Position carried in; `pos.x` accumulates cell columns.
    pub pos: Point,
    /// Forward: exclusive upper byte bound. Backward: inclusive lower bound.
    pub byte_stop: usize,
    /// Stop before a cluster that would move `pos.x` past this column.
    pub column_stop: i32,
    /// Maximum number of cluster movements to take.
    pub movement_limit: usize,
}

impl MeasureArgs {
    pub fn new(offset: usize, pos: Point) -> Self {
        Self {
            offset,
            pos,
            byte_stop: usize::MAX,
            column_stop: i32::MAX,
            movement_limit: usize::MAX,
        }
    }

    pub fn until_offset(mut self, stop: usize) -> Self {
        self.byte_stop = stop;
        self
    }

    pub fn until_column(mut self, stop: i32) -> Self {
        self.column_stop = stop;
        self
    }

    pub fn limit(mut self, movements: usize) -> Self {
        self.movement_limit = movements;
        self
    }
}

/// A legal word-wrap break inside a measured span: the offset just past a
/// space cluster, together with how many movements into the span it lies.
#[derive(Clone, Copy, Debug)]
pub struct WrapPoint {
    pub offset: usize,
    pub movements: usize,
}

/// Result of a measurement walk.
#[derive(Clone, Copy, Debug)]
pub struct Measurement {
    pub offset: usize,
    pub pos: Point,
    pub movements: usize,
    /// The next cluster was a newline; it was not consumed.
    pub hit_newline: bool,
    /// Consuming the next cluster would have crossed `column_stop`.
    pub hit_column: bool,
    /// Latest wrap opportunity seen within the measured span.
    pub wrap_opportunity: Option<WrapPoint>,
}

fn total_len(front: &[u8], back: &[u8]) -> usize {
    front.len() + back.len()
}

fn byte_at(front: &[u8], back: &[u8], off: usize) -> u8 {
    if off < front.len() {
        front[off]
    } else {
        back[off - front.len()]
    }
}

/// Copy-free view of `want` bytes starting at `off`, stitching across the
/// seam into `scratch` only when the request straddles it.
fn fill_window<'a>(
    front: &'a [u8],
    back: &'a [u8],
    off: usize,
    want: usize,
    scratch: &'a mut [u8; WINDOW_MAX],
) -> &'a [u8] {
    let total = total_len(front, back);
    let end = (off + want.min(WINDOW_MAX)).min(total);
    if end <= front.len() {
        return &front[off..end];
    }
    if off >= front.len() {
        return &back[off - front.len()..end - front.len()];
    }
    let head = front.len() - off;
    let n = end - off;
    scratch[..head].copy_from_slice(&front[off..]);
    scratch[head..n].copy_from_slice(&back[..end - front.len()]);
    &scratch[..n]
}

enum Decode {
    Done(Cluster),
    Grow,
}

fn decode_cluster(window: &[u8], truncated: bool, want: usize) -> Decode {
    let b = window[0];
    if b == b'\n' {
        return Decode::Done(Cluster {
            len: 1,
            width: 0,
            newline: true,
            space: false,
        });
    }
    let valid = match std::str::from_utf8(window) {
        Ok(s) => s,
        Err(e) => {
            if e.valid_up_to() == 0 {
                // An incomplete sequence cut off by the window may still
                // complete with more bytes; a truly invalid byte never will.
                if e.error_len().is_none() && truncated && want < WINDOW_MAX {
                    return Decode::Grow;
                }
                return Decode::Done(Cluster {
                    len: 1,
                    width: 1,
                    newline: false,
                    space: false,
                });
            }
            let (prefix, _) = window.split_at(e.valid_up_to());
            match std::str::from_utf8(prefix) {
                Ok(s) => s,
                Err(_) => {
                    return Decode::Done(Cluster {
                        len: 1,
                        width: 1,
                        newline: false,
                        space: false,
                    });
                }
            }
        }
    };
    let Some(g) = valid.graphemes(true).next() else {
        return Decode::Done(Cluster {
            len: 1,
            width: 1,
            newline: false,
            space: false,
        });
    };
    // Segmentation fuses "\r\n" into one cluster; split it so the line feed
    // keeps its newline role on the next step.
    if g == "\r\n" {
        return Decode::Done(Cluster {
            len: 1,
            width: 1,
            newline: false,
            space: false,
        });
    }
    // The cluster may extend past what we decoded; widen the window once.
    if g.len() == valid.len() && (truncated || valid.len() < window.len()) && want < WINDOW_MAX {
        return Decode::Grow;
    }
    Decode::Done(Cluster {
        len: g.len(),
        width: cluster_width(g),
        newline: false,
        space: g == " " || g == "\t",
    })
}

/// Terminal cell width of a single grapheme cluster.
pub fn cluster_width(cluster: &str) -> i32 {
    let mut chars = cluster.chars();
    let Some(first) = chars.next() else {
        return 0;
    };
    if first.is_control() {
        // C0 bytes render as one placeholder cell; `\n` never reaches here.
        return 1;
    }
    cluster.width() as i32
}

/// Decode the cluster starting at `off`, or `None` at end of text.
pub fn next_cluster(front: &[u8], back: &[u8], off: usize) -> Option<Cluster> {
    let total = total_len(front, back);
    if off >= total {
        return None;
    }
    let mut scratch = [0u8; WINDOW_MAX];
    let mut want = WINDOW;
    loop {
        let decision = {
            let window = fill_window(front, back, off, want, &mut scratch);
            let truncated = off + window.len() < total;
            decode_cluster(window, truncated, want)
        };
        match decision {
            Decode::Done(c) => return Some(c),
            Decode::Grow => want *= 2,
        }
    }
}

/// Decode the cluster ending at `off`, or `None` at the start of text.
///
/// Backward segmentation is windowed: the window is aligned to a UTF-8
/// boundary (and restarted after any newline it contains), scanned forward,
/// and the final cluster is taken. Clusters longer than the window split.
pub fn prev_cluster(front: &[u8], back: &[u8], off: usize) -> Option<Cluster> {
    if off == 0 || off > total_len(front, back) {
        return None;
    }
    if byte_at(front, back, off - 1) == b'\n' {
        return Some(Cluster {
            len: 1,
            width: 0,
            newline: true,
            space: false,
        });
    }
    let mut scratch = [0u8; WINDOW_MAX];
    let mut want = WINDOW;
    loop {
        let start = off.saturating_sub(want);
        let (cluster, anchored) = {
            let window = fill_window(front, back, start, off - start, &mut scratch);
            let mut w = window;
            let mut trimmed = 0usize;
            while !w.is_empty() && (w[0] & 0xC0) == 0x80 && trimmed < 3 {
                w = &w[1..];
                trimmed += 1;
            }
            if let Some(p) = w.iter().rposition(|&b| b == b'\n') {
                w = &w[p + 1..];
            }
            last_cluster_of(w)
        };
        match cluster {
            Some(c) if anchored || start == 0 || want >= WINDOW_MAX => return Some(c),
            Some(_) => want *= 2,
            None => {
                // Window held nothing but stray continuation bytes.
                return Some(Cluster {
                    len: 1,
                    width: 1,
                    newline: false,
                    space: false,
                });
            }
        }
    }
}

/// Forward-scan a contiguous slice, returning its last cluster and whether
/// that cluster starts strictly inside the slice (a trustworthy boundary).
fn last_cluster_of(w: &[u8]) -> (Option<Cluster>, bool) {
    let mut i = 0usize;
    let mut last: Option<(usize, Cluster)> = None;
    while i < w.len() {
        match next_cluster(w, &[], i) {
            Some(c) => {
                last = Some((i, c));
                i += c.len;
            }
            None => break,
        }
    }
    match last {
        Some((at, c)) => (Some(c), at > 0),
        None => (None, false),
    }
}

/// Walk clusters forward from `args.offset`, stopping at the first of the
/// configured bounds or end of text. See module docs for the newline rule.
pub fn measure_forward(front: &[u8], back: &[u8], args: MeasureArgs) -> Measurement {
    let byte_stop = args.byte_stop.min(total_len(front, back));
    let mut offset = args.offset.min(byte_stop);
    let mut pos = args.pos;
    let mut movements = 0usize;
    let mut hit_newline = false;
    let mut hit_column = false;
    let mut wrap_opportunity = None;
    while movements < args.movement_limit && offset < byte_stop {
        let Some(cluster) = next_cluster(front, back, offset) else {
            break;
        };
        if cluster.newline {
            hit_newline = true;
            break;
        }
        if offset + cluster.len > byte_stop {
            break;
        }
        if pos.x + cluster.width > args.column_stop {
            hit_column = true;
            break;
        }
        offset += cluster.len;
        pos.x += cluster.width;
        movements += 1;
        if cluster.space {
            wrap_opportunity = Some(WrapPoint { offset, movements });
        }
    }
    Measurement {
        offset,
        pos,
        movements,
        hit_newline,
        hit_column,
        wrap_opportunity,
    }
}

/// Walk clusters backward from `args.offset`. Stops before crossing a
/// newline (`hit_newline` with the offset just past it) and treats
/// `byte_stop` as an inclusive lower bound and `column_stop` as a floor.
pub fn measure_backward(front: &[u8], back: &[u8], args: MeasureArgs) -> Measurement {
    let floor = if args.byte_stop == usize::MAX {
        0
    } else {
        args.byte_stop
    };
    let column_floor = if args.column_stop == i32::MAX {
        i32::MIN
    } else {
        args.column_stop
    };
    let mut offset = args.offset.min(total_len(front, back));
    let mut pos = args.pos;
    let mut movements = 0usize;
    let mut hit_newline = false;
    let mut hit_column = false;
    while movements < args.movement_limit && offset > floor {
        let Some(cluster) = prev_cluster(front, back, offset) else {
            break;
        };
        if cluster.newline {
            hit_newline = true;
            break;
        }
        if offset < floor + cluster.len {
            break;
        }
        offset -= cluster.len;
        pos.x -= cluster.width;
        movements += 1;
        if pos.x <= column_floor {
            hit_column = true;
            break;
        }
    }
    Measurement {
        offset,
        pos,
        movements,
        hit_newline,
        hit_column,
        wrap_opportunity: None,
    }
}

/// Advance `offset` past newlines until `line` reaches `line_stop` or the
/// text ends, returning the new `(offset, line)` pair. On a full advance
/// the offset is the first byte of line `line_stop`.
pub fn newlines_forward(
    front: &[u8],
    back: &[u8],
    offset: usize,
    line: i32,
    line_stop: i32,
) -> (usize, i32) {
    let total = total_len(front, back);
    let mut offset = offset.min(total);
    let mut line = line;
    while line < line_stop {
        match find_byte(front, back, offset, b'\n') {
            Some(p) => {
                offset = p + 1;
                line += 1;
            }
            None => {
                offset = total;
                break;
            }
        }
    }
    (offset, line)
}

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(front: &[u8], back: &[u8], offset: usize) -> usize {
    let off = offset.min(total_len(front, back));
    if off == 0 {
        return 0;
    }
    let in_back = off.saturating_sub(front.len());
    if in_back > 0 {
        if let Some(i) = back[..in_back].iter().rposition(|&b| b == b'\n') {
            return front.len() + i + 1;
        }
    }
    let front_end = off.min(front.len());
    if let Some(i) = front[..front_end].iter().rposition(|&b| b == b'\n') {
        return i + 1;
    }
    0
}

/// Number of newline bytes in `[range.start, range.end)`.
pub fn count_newlines(front: &[u8], back: &[u8], beg: usize, end: usize) -> i32 {
    let total = total_len(front, back);
    let beg = beg.min(total);
    let end = end.min(total).max(beg);
    let mut n = 0i32;
    let fe = end.min(front.len());
    if beg < fe {
        n += front[beg..fe].iter().filter(|&&b| b == b'\n').count() as i32;
    }
    let bb = beg.saturating_sub(front.len());
    let be = end.saturating_sub(front.len());
    if bb < be {
        n += back[bb..be].iter().filter(|&&b| b == b'\n').count() as i32;
    }
    n
}

fn find_byte(front: &[u8], back: &[u8], from: usize, needle: u8) -> Option<usize> {
    if from < front.len() {
        if let Some(i) = front[from..].iter().position(|&b| b == needle) {
            return Some(from + i);
        }
    }
    let start = from.saturating_sub(front.len());
    if start < back.len() {
        if let Some(i) = back[start..].iter().position(|&b| b == needle) {
            return Some(front.len() + start + i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fwd(front: &[u8], back: &[u8], args: MeasureArgs) -> Measurement {
        measure_forward(front, back, args)
    }

    #[test]
    fn ascii_advance() {
        let m = fwd(b"hello", b"", MeasureArgs::new(0, Point::default()));
        assert_eq!(m.offset, 5);
        assert_eq!(m.pos.x, 5);
        assert_eq!(m.movements, 5);
        assert!(!m.hit_newline);
    }

    #[test]
    fn stops_before_newline() {
        let m = fwd(b"ab\ncd", b"", MeasureArgs::new(0, Point::default()));
        assert_eq!(m.offset, 2);
        assert!(m.hit_newline);
        assert_eq!(m.movements, 2);
    }

    #[test]
    fn wide_glyph_width() {
        let m = fwd("a世b".as_bytes(), b"", MeasureArgs::new(0, Point::default()));
        assert_eq!(m.pos.x, 4);
        assert_eq!(m.movements, 3);
    }

    #[test]
    fn column_stop_before_wide_glyph() {
        // A wide glyph that does not fit in the remaining column stays out.
        let m = fwd(
            "a世".as_bytes(),
            b"",
            MeasureArgs::new(0, Point::default()).until_column(2),
        );
        assert_eq!(m.offset, 1);
        assert_eq!(m.pos.x, 1);
        assert!(m.hit_column);
    }

    #[test]
    fn cluster_across_seam() {
        // "é" as e + combining acute, split between the halves.
        let all = "xe\u{301}y".as_bytes();
        let m = fwd(&all[..2], &all[2..], MeasureArgs::new(0, Point::default()));
        assert_eq!(m.movements, 3);
        assert_eq!(m.pos.x, 3);
        assert_eq!(m.offset, all.len());
    }

    #[test]
    fn invalid_utf8_is_one_cell_per_byte() {
        let m = fwd(&[b'a', 0xFF, 0xFE, b'b'], b"", MeasureArgs::new(0, Point::default()));
        assert_eq!(m.movements, 4);
        assert_eq!(m.pos.x, 4);
    }

    #[test]
    fn movement_limit() {
        let m = fwd(b"abcdef", b"", MeasureArgs::new(0, Point::default()).limit(3));
        assert_eq!(m.offset, 3);
        assert_eq!(m.movements, 3);
    }

    #[test]
    fn byte_stop_does_not_split_cluster() {
        let s = "a世".as_bytes(); // '世' is 3 bytes at offset 1
        let m = fwd(s, b"", MeasureArgs::new(0, Point::default()).until_offset(2));
        assert_eq!(m.offset, 1, "must stop before the straddling cluster");
    }

    #[test]
    fn wrap_opportunity_reported() {
        let m = fwd(b"ab cd", b"", MeasureArgs::new(0, Point::default()));
        let wp = m.wrap_opportunity.expect("space seen");
        assert_eq!(wp.offset, 3);
        assert_eq!(wp.movements, 3);
    }

    #[test]
    fn backward_walk() {
        let m = measure_backward(
            "a世b".as_bytes(),
            b"",
            MeasureArgs::new(5, Point { x: 4, y: 0 }).limit(2),
        );
        assert_eq!(m.offset, 1);
        assert_eq!(m.pos.x, 1);
        assert_eq!(m.movements, 2);
    }

    #[test]
    fn backward_stops_at_newline() {
        let m = measure_backward(b"ab\ncd", b"", MeasureArgs::new(5, Point { x: 2, y: 1 }));
        assert_eq!(m.offset, 3);
        assert_eq!(m.movements, 2);
        assert!(m.hit_newline);
    }

    #[test]
    fn newline_seek() {
        let (off, line) = newlines_forward(b"a\nbb\nccc", b"", 0, 0, 2);
        assert_eq!((off, line), (5, 2));
        let (off, line) = newlines_forward(b"a\nbb", b"", 0, 0, 9);
        assert_eq!((off, line), (4, 1));
    }

    #[test]
    fn line_start_lookup() {
        let s = b"one\ntwo\nthree";
        assert_eq!(line_start(s, b"", 0), 0);
        assert_eq!(line_start(s, b"", 3), 0);
        assert_eq!(line_start(s, b"", 4), 4);
        assert_eq!(line_start(s, b"", 6), 4);
        assert_eq!(line_start(s, b"", 13), 8);
    }

    #[test]
    fn line_start_across_seam() {
        let s = b"one\ntwo\nthree";
        assert_eq!(line_start(&s[..5], &s[5..], 10), 8);
        assert_eq!(line_start(&s[..9], &s[9..], 10), 8);
    }

    #[test]
    fn newline_count() {
        let s = b"a\nb\nc";
        assert_eq!(count_newlines(&s[..3], &s[3..], 0, 5), 2);
        assert_eq!(count_newlines(&s[..3], &s[3..], 2, 4), 1);
    }

    #[test]
    fn tab_and_controls_are_single_cells() {
        let m = fwd(b"\ta\x01", b"", MeasureArgs::new(0, Point::default()));
        assert_eq!(m.pos.x, 3);
    }
}
