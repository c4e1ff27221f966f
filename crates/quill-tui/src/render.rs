//! Painting and output: a character + color framebuffer, gamma-correct
//! blending, grapheme-aware line mutation and the ANSI diff emitter.
//!
//! Colors are 0xAARRGGBB. Alpha 0 paints nothing, alpha 255 overwrites,
//! anything between blends in linear light (blending in sRGB space shifts
//! perceived brightness, so the conversion is a correctness requirement).
//!
//! Output: the first frame repaints everything behind `ESC[H` with rows
//! separated by CRLF and SGR emitted only when the color pair changes along
//! the scan; subsequent frames diff against the previous framebuffer and
//! emit only changed spans as cursor-position + minimal SGR + text. The SGR
//! state persists across frames so an unchanged color never re-emits.

use std::fmt::Write as _;

use quill_text::ucd::{self, MeasureArgs};

use crate::geometry::{Point, Rect, Size};
use crate::{Content, Node, NodeIdx, Tree};

/// Cursor placement appended after the frame, with its DECSCUSR shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCursor {
    pub pos: Point,
    pub overtype: bool,
}

/// Row-major character lines plus parallel background/foreground bitmaps.
/// Every line holds exactly `size.width` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub size: Size,
    pub lines: Vec<String>,
    pub bg: Vec<u32>,
    pub fg: Vec<u32>,
    pub cursor: Option<RenderCursor>,
}

impl FrameBuffer {
    pub fn new(size: Size, bg: u32, fg: u32) -> Self {
        let w = size.width.max(0) as usize;
        let h = size.height.max(0) as usize;
        Self {
            size,
            lines: vec![" ".repeat(w); h],
            bg: vec![bg; w * h],
            fg: vec![fg; w * h],
            cursor: None,
        }
    }
}

pub(crate) fn alpha(color: u32) -> u32 {
    color >> 24
}

fn srgb_to_linear(c: u8) -> f32 {
    let x = f32::from(c) / 255.0;
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(x: f32) -> u8 {
    let v = if x <= 0.003_130_8 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    };
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Blend `src` over `dst` in linear light. Fully opaque and fully
/// transparent sources short-circuit.
pub fn blend(dst: u32, src: u32) -> u32 {
    let a = alpha(src);
    if a == 0xFF {
        return src;
    }
    if a == 0 {
        return dst;
    }
    let af = a as f32 / 255.0;
    let mut out = 0xFF00_0000u32;
    for shift in [16u32, 8, 0] {
        let d = srgb_to_linear((dst >> shift) as u8);
        let s = srgb_to_linear((src >> shift) as u8);
        let c = linear_to_srgb(s * af + d * (1.0 - af));
        out |= u32::from(c) << shift;
    }
    out
}

/// Display width of a single-line string in terminal columns.
pub(crate) fn text_width(s: &str) -> i32 {
    ucd::measure_forward(s.as_bytes(), &[], MeasureArgs::new(0, Point::default())).pos.x
}

/// Replace the columns `[x1, x1 + width(text))` of `line` with `text`,
/// bounded by `x2`. Wide clusters cut at either boundary are blanked with
/// spaces and a line shorter than `x1` is extended. Returns the column just
/// past the written text.
pub fn replace_text(line: &mut String, x1: i32, x2: i32, text: &str) -> i32 {
    if x2 <= x1 {
        return x1;
    }
    let tm = ucd::measure_forward(
        text.as_bytes(),
        &[],
        MeasureArgs::new(0, Point::default()).until_column(x2 - x1),
    );
    let tw = tm.pos.x;
    if tm.offset == 0 {
        return x1;
    }
    let piece = &text[..tm.offset];

    let lbytes = line.as_bytes();
    let m1 = ucd::measure_forward(
        lbytes,
        &[],
        MeasureArgs::new(0, Point::default()).until_column(x1),
    );
    // A wide cluster cut by x1 stays out of the prefix; the suffix cut
    // below drops it and `left_pad` blanks its leading cells.
    let b1 = m1.offset;
    let left_pad = x1 - m1.pos.x;

    let target = x1 + tw;
    let m2 = ucd::measure_forward(
        lbytes,
        &[],
        MeasureArgs::new(0, Point::default()).until_column(target),
    );
    let mut b2 = m2.offset;
    let mut right_pad = 0;
    if m2.pos.x < target && m2.hit_column {
        let m = ucd::measure_forward(
            lbytes,
            &[],
            MeasureArgs::new(m2.offset, Point::new(m2.pos.x, 0)).limit(1),
        );
        b2 = m.offset;
        right_pad = (m.pos.x - target).max(0);
    }
    let b2 = b2.max(b1);

    let mut out = String::with_capacity(line.len() + piece.len() + 8);
    out.push_str(&line[..b1]);
    for _ in 0..left_pad {
        out.push(' ');
    }
    out.push_str(piece);
    for _ in 0..right_pad {
        out.push(' ');
    }
    out.push_str(&line[b2..]);
    *line = out;
    x1 + tw
}

/// Write `text` at `(x, y)` clipped to `clip` and the framebuffer bounds.
/// Returns the painted column span.
pub(crate) fn blit_str(fb: &mut FrameBuffer, x: i32, y: i32, clip: Rect, text: &str) -> (i32, i32) {
    let clip = clip.intersect(Rect::of_size(fb.size));
    if clip.is_empty() || y < clip.top || y >= clip.bottom || x >= clip.right {
        return (x, x);
    }
    let bytes = text.as_bytes();
    let mut lead_pad = 0i32;
    let mut start_byte = 0usize;
    let mut start_col = x;
    if x < clip.left {
        let skip = clip.left - x;
        let m = ucd::measure_forward(
            bytes,
            &[],
            MeasureArgs::new(0, Point::default()).until_column(skip),
        );
        start_byte = m.offset;
        start_col = clip.left;
        if m.pos.x < skip {
            if m.hit_column {
                let m2 = ucd::measure_forward(
                    bytes,
                    &[],
                    MeasureArgs::new(m.offset, Point::new(m.pos.x, 0)).limit(1),
                );
                start_byte = m2.offset;
                lead_pad = (x + m2.pos.x - clip.left).max(0);
            } else {
                return (x, x);
            }
        }
    }
    let avail = clip.right - start_col - lead_pad;
    if avail <= 0 {
        return (start_col, start_col);
    }
    let m3 = ucd::measure_forward(
        bytes,
        &[],
        MeasureArgs::new(start_byte, Point::default()).until_column(avail),
    );
    if lead_pad == 0 && m3.offset == start_byte {
        return (start_col, start_col);
    }
    let mut piece = String::with_capacity(lead_pad as usize + m3.offset - start_byte);
    for _ in 0..lead_pad {
        piece.push(' ');
    }
    piece.push_str(&text[start_byte..m3.offset]);
    let end_col = start_col + lead_pad + m3.pos.x;
    replace_text(&mut fb.lines[y as usize], start_col, clip.right, &piece);
    (start_col, end_col)
}

fn stamp(cells: &mut [u32], size: Size, rect: Rect, color: u32) {
    let rect = rect.intersect(Rect::of_size(size));
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            let i = (y * size.width + x) as usize;
            cells[i] = blend(cells[i], color);
        }
    }
}

// ---- per-node painting -----------------------------------------------------

pub(crate) fn paint_tree(tree: &Tree, fb: &mut FrameBuffer) {
    if tree.nodes.is_empty() {
        return;
    }
    paint_node(tree, 0, fb);
    for &f in &tree.floaters {
        paint_node(tree, f, fb);
    }
}

fn paint_node(tree: &Tree, idx: NodeIdx, fb: &mut FrameBuffer) {
    let node = tree.node(idx);
    let oc = node.outer_clipped.intersect(Rect::of_size(fb.size));
    if oc.is_empty() {
        return;
    }
    if node.attrs.floating {
        // Opaque backdrop: whatever lies underneath must not shine through.
        let blank = " ".repeat(oc.width() as usize);
        for y in oc.top..oc.bottom {
            replace_text(&mut fb.lines[y as usize], oc.left, oc.right, &blank);
        }
    }
    if node.attrs.bordered {
        draw_border(node, oc, fb);
    }
    if let Content::Scrollarea(off) = &node.content {
        draw_scrollbar(tree, node, *off, oc, fb);
    }
    if alpha(node.attrs.bg) != 0 {
        stamp(&mut fb.bg, fb.size, oc, node.attrs.bg);
    }
    if alpha(node.attrs.fg) != 0 {
        stamp(&mut fb.fg, fb.size, oc, node.attrs.fg);
    }
    let ic = node.inner_clipped;
    if !ic.is_empty() {
        match &node.content {
            Content::Text { chunks } => paint_chunks(node, chunks, fb),
            Content::Textarea(view) => paint_textarea(node, view, fb),
            _ => {}
        }
    }
    let mut child = node.first_child;
    while let Some(c) = child {
        paint_node(tree, c, fb);
        child = tree.node(c).next_sib;
    }
}

fn draw_border(node: &Node, oc: Rect, fb: &mut FrameBuffer) {
    let o = node.outer;
    if o.width() < 2 || o.height() < 2 {
        return;
    }
    let mid = (o.width() - 2) as usize;
    let top = format!("┌{}┐", "─".repeat(mid));
    let bottom = format!("└{}┘", "─".repeat(mid));
    blit_str(fb, o.left, o.top, oc, &top);
    blit_str(fb, o.left, o.bottom - 1, oc, &bottom);
    for y in (o.top + 1)..(o.bottom - 1) {
        blit_str(fb, o.left, y, oc, "│");
        blit_str(fb, o.right - 1, y, oc, "│");
    }
}

fn draw_scrollbar(tree: &Tree, node: &Node, off: Point, oc: Rect, fb: &mut FrameBuffer) {
    let Some(child) = node.first_child else {
        return;
    };
    let inner = node.inner;
    let viewport = inner.height();
    let content = tree.node(child).size.height;
    if viewport <= 0 || content <= viewport {
        return;
    }
    let border = i32::from(node.attrs.bordered);
    let track_x = node.outer.right - 1 - border;
    let thumb_h = ((viewport * viewport + content / 2) / content).max(1);
    let denom = (content - viewport).max(1);
    let thumb_top = inner.top + (off.y * (viewport - thumb_h) + denom / 2) / denom;
    for y in inner.top..inner.bottom {
        let glyph = if y >= thumb_top && y < thumb_top + thumb_h {
            "█"
        } else {
            "░"
        };
        blit_str(fb, track_x, y, oc, glyph);
    }
}

fn paint_chunks(node: &Node, chunks: &[crate::TextChunk], fb: &mut FrameBuffer) {
    let ic = node.inner_clipped;
    let mut x = node.inner.left;
    let y = node.inner.top;
    for chunk in chunks {
        let (s, e) = blit_str(fb, x, y, ic, &chunk.text);
        if alpha(chunk.fg) != 0 && e > s {
            stamp(&mut fb.fg, fb.size, Rect::new(s, y, e, y + 1), chunk.fg);
        }
        x += text_width(&chunk.text);
    }
}

fn paint_textarea(node: &Node, view: &crate::TextView, fb: &mut FrameBuffer) {
    let inner = node.inner;
    let ic = node.inner_clipped;
    for (i, row) in view.rows.iter().enumerate() {
        let y = inner.top + i as i32;
        if y < ic.top || y >= ic.bottom {
            continue;
        }
        blit_str(fb, inner.left, y, ic, &row.text);
        if let Some((c1, c2)) = row.selection {
            let rect = Rect::new(inner.left + c1, y, inner.left + c2, y + 1).intersect(ic);
            if !rect.is_empty() {
                stamp(&mut fb.bg, fb.size, rect, view.sel_bg);
                stamp(&mut fb.fg, fb.size, rect, view.sel_fg);
            }
        }
    }
    if let Some(c) = view.cursor {
        let pos = Point::new(inner.left + c.x, inner.top + c.y);
        if ic.contains(pos) {
            fb.cursor = Some(RenderCursor {
                pos,
                overtype: view.overtype,
            });
        }
    }
}

// ---- output emission -------------------------------------------------------

/// Leader cluster per column; continuation columns hold the empty string.
fn row_cells(line: &str, width: usize) -> Vec<&str> {
    let mut cells = vec![""; width];
    let bytes = line.as_bytes();
    let mut off = 0usize;
    let mut col = 0usize;
    while col < width {
        let Some(c) = ucd::next_cluster(bytes, &[], off) else {
            break;
        };
        if c.newline {
            break;
        }
        if c.width <= 0 {
            off += c.len;
            continue;
        }
        cells[col] = &line[off..off + c.len];
        off += c.len;
        col += c.width as usize;
    }
    cells
}

fn push_color(out: &mut String, first: &mut bool, color: u32, palette: &[u32; 16], is_bg: bool) {
    if !std::mem::take(first) {
        out.push(';');
    }
    if let Some(i) = palette.iter().position(|&p| p == color) {
        let code = match (is_bg, i < 8) {
            (true, true) => 40 + i,
            (true, false) => 100 + i - 8,
            (false, true) => 30 + i,
            (false, false) => 90 + i - 8,
        };
        let _ = write!(out, "{code}");
    } else {
        let (r, g, b) = ((color >> 16) & 0xFF, (color >> 8) & 0xFF, color & 0xFF);
        let _ = write!(out, "{};2;{};{};{}", if is_bg { 48 } else { 38 }, r, g, b);
    }
}

fn emit_sgr(
    out: &mut String,
    state: &mut Option<(u32, u32)>,
    bg: u32,
    fg: u32,
    palette: &[u32; 16],
) {
    let (need_bg, need_fg) = match state {
        Some((b, f)) => (*b != bg, *f != fg),
        None => (true, true),
    };
    if !need_bg && !need_fg {
        return;
    }
    out.push_str("\x1b[");
    let mut first = true;
    if need_bg {
        push_color(out, &mut first, bg, palette, true);
    }
    if need_fg {
        push_color(out, &mut first, fg, palette, false);
    }
    out.push('m');
    *state = Some((bg, fg));
}

/// Serialise the framebuffer into an ANSI sequence, diffing against the
/// previous frame when shapes match. See module docs for the protocol.
pub(crate) fn flush_frame(
    fb: &FrameBuffer,
    prev: Option<&FrameBuffer>,
    palette: &[u32; 16],
    sgr: &mut Option<(u32, u32)>,
) -> String {
    let w = fb.size.width.max(0) as usize;
    let h = fb.size.height.max(0) as usize;
    let mut out = String::with_capacity(64 + w * h / 4);
    out.push_str("\x1b[H");
    match prev {
        Some(p) if p.size == fb.size => diff_rows(fb, p, palette, sgr, w, h, &mut out),
        _ => full_rows(fb, palette, sgr, w, h, &mut out),
    }
    match fb.cursor {
        Some(c) => {
            let _ = write!(out, "\x1b[{};{}H", c.pos.y + 1, c.pos.x + 1);
            out.push_str(if c.overtype { "\x1b[2 q" } else { "\x1b[6 q" });
            out.push_str("\x1b[?25h");
        }
        None => out.push_str("\x1b[?25l"),
    }
    out
}

fn full_rows(
    fb: &FrameBuffer,
    palette: &[u32; 16],
    sgr: &mut Option<(u32, u32)>,
    w: usize,
    h: usize,
    out: &mut String,
) {
    for y in 0..h {
        if y > 0 {
            out.push_str("\r\n");
        }
        let cells = row_cells(&fb.lines[y], w);
        let mut col = 0usize;
        while col < w {
            let cluster = cells[col];
            if cluster.is_empty() {
                col += 1;
                continue;
            }
            let i = y * w + col;
            emit_sgr(out, sgr, fb.bg[i], fb.fg[i], palette);
            out.push_str(cluster);
            col += ucd::cluster_width(cluster).max(1) as usize;
        }
    }
}

fn diff_rows(
    fb: &FrameBuffer,
    prev: &FrameBuffer,
    palette: &[u32; 16],
    sgr: &mut Option<(u32, u32)>,
    w: usize,
    h: usize,
    out: &mut String,
) {
    for y in 0..h {
        let row = y * w..(y + 1) * w;
        if fb.lines[y] == prev.lines[y]
            && fb.bg[row.clone()] == prev.bg[row.clone()]
            && fb.fg[row.clone()] == prev.fg[row.clone()]
        {
            continue;
        }
        let cur = row_cells(&fb.lines[y], w);
        let old = row_cells(&prev.lines[y], w);
        let differs = |col: usize| {
            let i = y * w + col;
            cur[col] != old[col] || fb.bg[i] != prev.bg[i] || fb.fg[i] != prev.fg[i]
        };
        let mut col = 0usize;
        while col < w {
            if !differs(col) {
                col += 1;
                continue;
            }
            let mut start = col;
            while start > 0 && cur[start].is_empty() {
                start -= 1;
            }
            let mut end = col + 1;
            while end < w && (differs(end) || cur[end].is_empty()) {
                end += 1;
            }
            let _ = write!(out, "\x1b[{};{}H", y + 1, start + 1);
            let mut c = start;
            while c < end {
                let cluster = cur[c];
                if cluster.is_empty() {
                    c += 1;
                    continue;
                }
                let i = y * w + c;
                emit_sgr(out, sgr, fb.bg[i], fb.fg[i], palette);
                out.push_str(cluster);
                c += ucd::cluster_width(cluster).max(1) as usize;
            }
            col = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_opaque_and_transparent() {
        assert_eq!(blend(0xFF000000, 0xFFFFFFFF), 0xFFFFFFFF);
        assert_eq!(blend(0xFF123456, 0x00FFFFFF), 0xFF123456);
    }

    #[test]
    fn blend_half_gray_is_linear_not_srgb() {
        // Half white over black in linear light is brighter than 0x80.
        let mid = blend(0xFF000000, 0x80FFFFFF);
        let r = (mid >> 16) & 0xFF;
        assert!(r > 0x90, "linear blend expected, got {r:#x}");
    }

    #[test]
    fn replace_text_basic() {
        let mut line = "abcdef".to_string();
        let end = replace_text(&mut line, 2, 6, "XY");
        assert_eq!(line, "abXYef");
        assert_eq!(end, 4);
    }

    #[test]
    fn replace_text_extends_short_line() {
        let mut line = "ab".to_string();
        replace_text(&mut line, 4, 8, "Z");
        assert_eq!(line, "ab  Z");
    }

    #[test]
    fn replace_text_pads_split_wide_glyph() {
        let mut line = "a世b".to_string();
        // Column 2 falls on the wide glyph's second cell.
        replace_text(&mut line, 2, 4, "X");
        assert_eq!(line, "a Xb");
    }

    #[test]
    fn replace_text_truncates_to_bound() {
        let mut line = "      ".to_string();
        let end = replace_text(&mut line, 0, 3, "abcdef");
        assert_eq!(line, "abc   ");
        assert_eq!(end, 3);
    }

    #[test]
    fn row_cells_marks_continuations() {
        let cells = row_cells("a世b ", 5);
        assert_eq!(cells, vec!["a", "世", "", "b", " "]);
    }

    #[test]
    fn sgr_uses_indexed_colors_for_palette_entries() {
        let mut out = String::new();
        let mut state = None;
        let palette = crate::DEFAULT_PALETTE;
        emit_sgr(&mut out, &mut state, palette[1], palette[15], &palette);
        assert_eq!(out, "\x1b[41;97m");
        out.clear();
        emit_sgr(&mut out, &mut state, palette[1], palette[15], &palette);
        assert_eq!(out, "", "unchanged colors emit nothing");
        emit_sgr(&mut out, &mut state, 0xFF102030, palette[15], &palette);
        assert_eq!(out, "\x1b[48;2;16;32;48m");
    }
}
