//! Built-in widgets: labels, buttons, textarea, scrollarea and a menubar.
//!
//! All of them are thin wrappers over the node builder plus the retained
//! state they read back from the previous frame (rects, scroll offsets,
//! focus). The textarea owns all editing interaction: it feeds text and
//! keys into the store, drives the mouse selection state machine and
//! prepares the visible rows for the renderer.

use quill_text::ucd::{self, MeasureArgs};
use quill_text::TextBuffer;
use quill_vt::{Key, KeyInput, Mods, MouseAction};
use smallvec::SmallVec;

use crate::geometry::{Point, Rect, Size};
use crate::{Content, Ctx, FloatSpec, FrameInput, TextChunk, TextRow, TextView};

impl Ctx {
    pub fn label(&mut self, id: &str, text: &str) {
        self.push_node(
            id,
            Content::Text {
                chunks: vec![TextChunk {
                    text: text.to_string(),
                    fg: 0,
                }],
            },
        );
    }

    pub fn styled_label(&mut self, id: &str, chunks: Vec<TextChunk>) {
        self.push_node(id, Content::Text { chunks });
    }

    /// A click target. Returns true on the frame the click completes.
    pub fn button(&mut self, id: &str, text: &str) -> bool {
        let idx = self.push_node(
            id,
            Content::Text {
                chunks: vec![TextChunk {
                    text: text.to_string(),
                    fg: 0,
                }],
            },
        );
        self.tree.node_mut(idx).attrs.padding = Rect::new(1, 0, 1, 0);
        let node_id = self.tree.node(idx).id;
        if self.focused == node_id {
            let bg = self.indexed(8);
            self.tree.node_mut(idx).attrs.bg = bg;
        } else if self.is_hovered() {
            let bg = self.indexed(12);
            self.tree.node_mut(idx).attrs.bg = bg;
        }
        self.was_clicked()
    }

    /// Open a scroll viewport. Exactly one child is expected between this
    /// and [`Ctx::scrollarea_end`]; the wheel scrolls it while hovered and
    /// layout clamps the retained offset.
    pub fn scrollarea_begin(&mut self, id: &str) -> u64 {
        let idx = self.push_node(id, Content::Scrollarea(Point::default()));
        let node_id = self.tree.node(idx).id;
        let mut offset = self
            .prev_node(node_id)
            .and_then(|n| match n.content {
                Content::Scrollarea(p) => Some(p),
                _ => None,
            })
            .unwrap_or_default();
        if !self.input_consumed
            && matches!(self.input, FrameInput::Mouse)
            && self.mouse.action == MouseAction::Scroll
            && self.is_hovered()
        {
            offset.y += self.mouse.scroll;
            self.consume_input();
        }
        if let Content::Scrollarea(p) = &mut self.tree.node_mut(idx).content {
            *p = offset;
        }
        self.parent_stack.push(idx);
        node_id
    }

    pub fn scrollarea_end(&mut self) {
        self.container_end();
    }

    // ---- menubar -----------------------------------------------------------

    /// A one-row menu bar across the top of its parent.
    pub fn menubar_begin(&mut self) {
        self.container_begin("menubar");
        let width = self.size.width;
        self.attr_intrinsic(Size::new(width, 1));
        let bg = self.indexed(7);
        let fg = self.indexed(0);
        self.attr_background(bg);
        self.attr_foreground(fg);
    }

    pub fn menubar_end(&mut self) {
        let idx = *self.parent_stack.last().expect("menubar_begin missing");
        let mut count = 0usize;
        let mut child = self.tree.node(idx).first_child;
        while let Some(c) = child {
            count += 1;
            child = self.tree.node(c).next_sib;
        }
        self.tree.node_mut(idx).attrs.columns = SmallVec::from_vec(vec![0; count.max(1)]);
        self.container_end();
        if self.open_menu != 0 && self.consume_shortcut(KeyInput::plain(Key::Escape)) {
            self.open_menu = 0;
        }
    }

    /// Menu title button; when the menu is open, a bordered drop-down
    /// floats beneath it and this returns true. Close the scope with
    /// [`Ctx::menu_end`] in that case.
    pub fn menu_begin(&mut self, id: &str, title: &str) -> bool {
        let clicked = self.button(id, title);
        let title_id = self.last_id();
        if clicked {
            self.open_menu = if self.open_menu == title_id {
                0
            } else {
                title_id
            };
        }
        if self.open_menu != title_id {
            return false;
        }
        let bar_idx = *self.parent_stack.last().expect("menu outside menubar");
        let bar_id = self.tree.node(bar_idx).id;
        let bar_left = self.prev_node(bar_id).map(|n| n.outer.left).unwrap_or(0);
        let title_left = self
            .prev_node(title_id)
            .map(|n| n.outer.left)
            .unwrap_or(bar_left);
        let items_label = format!("{id}-items");
        self.container_begin(&items_label);
        self.attr_float(FloatSpec {
            gravity_x: 0.0,
            gravity_y: 0.0,
            offset_x: title_left - bar_left,
            offset_y: 1,
        });
        self.attr_border();
        let bg = self.indexed(7);
        let fg = self.indexed(0);
        self.attr_background(bg);
        self.attr_foreground(fg);
        true
    }

    pub fn menu_item(&mut self, id: &str, text: &str) -> bool {
        let clicked = self.button(id, text);
        if clicked {
            self.open_menu = 0;
        }
        clicked
    }

    pub fn menu_end(&mut self) {
        self.container_end();
    }

    // ---- textarea ----------------------------------------------------------

    /// The document editor widget. Consumes text/key/mouse input while
    /// focused, keeps the cursor in view, and captures the visible rows
    /// (with selection spans) for the renderer. Returns the widget id.
    pub fn textarea(&mut self, id: &str, tb: &mut TextBuffer) -> u64 {
        let idx = self.push_node(id, Content::Textarea(TextView::default()));
        let node_id = self.tree.node(idx).id;
        let focused = self.focused == node_id;
        let prev_inner = self.prev_node(node_id).map(|n| n.inner).unwrap_or_default();
        let viewport = prev_inner.size();
        let mut scroll = self
            .prev_node(node_id)
            .and_then(|n| match &n.content {
                Content::Textarea(v) => Some(v.scroll),
                _ => None,
            })
            .unwrap_or_default();

        // Reflow to the viewport whenever wrap is on and the width moved.
        if tb.wrap_enabled()
            && viewport.width > 0
            && tb.wrap_columns() != Some(viewport.width.max(1) as u16)
        {
            tb.set_wrap(Some(viewport.width.max(1) as u16));
        }

        if focused {
            if let Some(text) = self.take_text() {
                tb.delete_selection();
                tb.write(&text);
            } else if let Some(key) = self.peek_key() {
                if apply_textarea_key(tb, key, viewport) {
                    self.consume_input();
                }
            }
        }

        if !self.input_consumed && matches!(self.input, FrameInput::Mouse) {
            let m = self.mouse;
            let over = self.is_hovered();
            match m.action {
                MouseAction::Scroll if over => {
                    scroll.y += m.scroll;
                    self.consume_input();
                }
                MouseAction::Left if focused && over => {
                    let pos = Point::new(
                        m.x - prev_inner.left + scroll.x,
                        m.y - prev_inner.top + scroll.y,
                    );
                    tb.cursor_move_to_visual(pos);
                    tb.selection_update(tb.cursor().logical);
                    self.consume_input();
                }
                MouseAction::Release if focused => {
                    tb.selection_end();
                    self.consume_input();
                }
                _ => {}
            }
        }

        // Keep the cursor inside the viewport, then clamp the offset.
        let cursor = tb.cursor();
        if focused && viewport.height > 0 {
            if cursor.visual.y < scroll.y {
                scroll.y = cursor.visual.y;
            }
            if cursor.visual.y >= scroll.y + viewport.height {
                scroll.y = cursor.visual.y - viewport.height + 1;
            }
            if tb.wrap_enabled() {
                scroll.x = 0;
            } else {
                if cursor.visual.x < scroll.x {
                    scroll.x = cursor.visual.x;
                }
                if viewport.width > 0 && cursor.visual.x >= scroll.x + viewport.width {
                    scroll.x = cursor.visual.x - viewport.width + 1;
                }
            }
        }
        scroll.y = scroll
            .y
            .clamp(0, (tb.visual_line_count() - viewport.height).max(0));
        scroll.x = scroll.x.max(0);

        let spans = tb.visual_rows(scroll.y, viewport.height.max(0) as usize);
        let selection = tb.selection_byte_range();
        let mut rows = Vec::with_capacity(spans.len());
        for span in spans {
            let full = tb.extract_string(span.start, span.end);
            let sel = selection.as_ref().and_then(|sel| {
                let beg = sel.start.max(span.start);
                let end = sel.end.min(span.end);
                if beg >= end {
                    return None;
                }
                let col_at = |byte: usize| {
                    ucd::measure_forward(
                        full.as_bytes(),
                        &[],
                        MeasureArgs::new(0, Point::default()).until_offset(byte),
                    )
                    .pos
                    .x
                };
                let c1 = (col_at(beg - span.start) - scroll.x).max(0);
                let c2 = col_at(end - span.start) - scroll.x;
                (c2 > c1).then_some((c1, c2))
            });
            rows.push(TextRow {
                text: slice_columns(&full, scroll.x),
                selection: sel,
            });
        }

        let view = TextView {
            rows,
            scroll,
            cursor: (focused && viewport.height > 0).then(|| {
                Point::new(cursor.visual.x - scroll.x, cursor.visual.y - scroll.y)
            }),
            overtype: tb.overtype(),
            sel_bg: self.indexed(4),
            sel_fg: self.indexed(15),
        };
        if let Content::Textarea(v) = &mut self.tree.node_mut(idx).content {
            *v = view;
        }
        node_id
    }
}

fn apply_textarea_key(tb: &mut TextBuffer, key: KeyInput, viewport: Size) -> bool {
    let ctrl = key.mods.contains(Mods::CTRL);
    match key.key {
        Key::Left => {
            tb.selection_clear();
            tb.cursor_move_delta(-1);
        }
        Key::Right => {
            tb.selection_clear();
            tb.cursor_move_delta(1);
        }
        Key::Up => {
            tb.selection_clear();
            let v = tb.cursor().visual;
            tb.cursor_move_to_visual(Point::new(v.x, v.y - 1));
        }
        Key::Down => {
            tb.selection_clear();
            let v = tb.cursor().visual;
            tb.cursor_move_to_visual(Point::new(v.x, v.y + 1));
        }
        Key::Home if ctrl => {
            tb.cursor_move_to_logical(Point::new(0, 0));
        }
        Key::End if ctrl => {
            tb.cursor_move_to_logical(Point::new(i32::MAX, i32::MAX));
        }
        Key::Home => {
            let y = tb.cursor().logical.y;
            tb.cursor_move_to_logical(Point::new(0, y));
        }
        Key::End => {
            let y = tb.cursor().logical.y;
            tb.cursor_move_to_logical(Point::new(i32::MAX, y));
        }
        Key::PageUp => {
            let v = tb.cursor().visual;
            tb.cursor_move_to_visual(Point::new(v.x, v.y - viewport.height.max(1)));
        }
        Key::PageDown => {
            let v = tb.cursor().visual;
            tb.cursor_move_to_visual(Point::new(v.x, v.y + viewport.height.max(1)));
        }
        Key::Backspace => {
            if !tb.delete_selection() {
                tb.delete(-1);
            }
        }
        Key::Delete => {
            if !tb.delete_selection() {
                tb.delete(1);
            }
        }
        Key::Enter => {
            tb.delete_selection();
            tb.write("\n");
        }
        Key::Tab => {
            tb.delete_selection();
            tb.write("\t");
        }
        Key::Insert => {
            let overtype = !tb.overtype();
            tb.set_overtype(overtype);
        }
        _ => return false,
    }
    true
}

/// Drop the first `skip` columns of a row, blanking a wide cluster cut by
/// the boundary.
fn slice_columns(text: &str, skip: i32) -> String {
    if skip <= 0 {
        return text.to_string();
    }
    let bytes = text.as_bytes();
    let m = ucd::measure_forward(
        bytes,
        &[],
        MeasureArgs::new(0, Point::default()).until_column(skip),
    );
    let mut start = m.offset;
    let mut pad = 0;
    if m.pos.x < skip {
        if m.hit_column {
            let m2 = ucd::measure_forward(
                bytes,
                &[],
                MeasureArgs::new(m.offset, Point::new(m.pos.x, 0)).limit(1),
            );
            start = m2.offset;
            pad = (m2.pos.x - skip).max(0);
        } else {
            return String::new();
        }
    }
    let mut out = String::with_capacity(pad as usize + text.len() - start);
    for _ in 0..pad {
        out.push(' ');
    }
    out.push_str(&text[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_columns_plain() {
        assert_eq!(slice_columns("abcdef", 2), "cdef");
        assert_eq!(slice_columns("ab", 5), "");
        assert_eq!(slice_columns("ab", 0), "ab");
    }

    #[test]
    fn slice_columns_blanks_cut_wide_glyph() {
        // Skipping one column cuts 世 in half; its right cell becomes a space.
        assert_eq!(slice_columns("世x", 1), " x");
    }
}
