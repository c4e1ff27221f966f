//! Immediate-mode terminal UI engine.
//!
//! Every frame rebuilds a tree of layout nodes from scratch; state that must
//! survive frames (focus, scroll offsets, rects consulted for hit tests) is
//! recovered through stable 64-bit ids hashed from widget labels along the
//! parent chain. Two node arenas swap roles each frame: the tree under
//! construction writes into one while hit tests and retained-state lookups
//! read the other.
//!
//! Frame protocol: [`Ctx::frame_begin`] with the (possibly absent) input
//! event, then builder calls (`container_begin`/`container_end`, attribute
//! setters, widgets), then [`Ctx::render`] — or [`Ctx::finalize`] alone for
//! the suppressed frames of an input batch.

use std::collections::HashMap;
use std::hash::Hasher;

use smallvec::SmallVec;
use tracing::trace;

pub mod geometry;
mod layout;
pub mod render;
mod widgets;

pub use geometry::{Point, Rect, Size};
pub use render::{FrameBuffer, RenderCursor, blend, replace_text};

use quill_vt::{InputEvent, KeyInput, MouseAction, MouseInput};

/// Index of a node inside its frame arena.
pub(crate) type NodeIdx = u32;

/// Float placement: gravity is the fraction of the node's own size pulled
/// back across the anchor, offset is relative to the logical parent's
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatSpec {
    pub gravity_x: f32,
    pub gravity_y: f32,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// Per-node presentation attributes. Colors are 0xAARRGGBB; zero alpha
/// means "paint nothing".
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    pub padding: Rect,
    pub bg: u32,
    pub fg: u32,
    pub float: Option<FloatSpec>,
    pub bordered: bool,
    pub floating: bool,
    /// Grid column spec: positive = absolute cells, negative = flex weight,
    /// zero = intrinsic. Empty means one flexible column.
    pub columns: SmallVec<[i32; 4]>,
    /// Content size override (inner cells).
    pub intrinsic: Option<Size>,
}

/// One styled run inside a text node.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub fg: u32,
}

/// A prepared textarea row: the visible slice of one visual row plus the
/// selection column range covering it, both viewport-relative.
#[derive(Debug, Clone, Default)]
pub struct TextRow {
    pub text: String,
    pub selection: Option<(i32, i32)>,
}

/// Textarea payload captured at build time; the renderer only paints it.
#[derive(Debug, Clone, Default)]
pub struct TextView {
    pub rows: Vec<TextRow>,
    pub scroll: Point,
    /// Viewport-relative cursor cell when this textarea is focused.
    pub cursor: Option<Point>,
    pub overtype: bool,
    pub sel_bg: u32,
    pub sel_fg: u32,
}

#[derive(Debug, Clone)]
pub enum Content {
    Container,
    Text { chunks: Vec<TextChunk> },
    Textarea(TextView),
    Scrollarea(Point),
}

/// A layout node. Lives for one frame inside its arena; linked to parent
/// and siblings by arena indices.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub(crate) parent: Option<NodeIdx>,
    pub(crate) first_child: Option<NodeIdx>,
    pub(crate) last_child: Option<NodeIdx>,
    pub(crate) prev_sib: Option<NodeIdx>,
    pub(crate) next_sib: Option<NodeIdx>,
    /// Parent at creation time; survives float re-homing.
    pub(crate) stack_parent: Option<NodeIdx>,
    pub attrs: Attrs,
    pub content: Content,
    /// Intrinsic outer size, filled in by finalize.
    pub size: Size,
    pub outer: Rect,
    pub inner: Rect,
    pub outer_clipped: Rect,
    pub inner_clipped: Rect,
}

impl Node {
    fn new(id: u64, content: Content) -> Self {
        Self {
            id,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sib: None,
            next_sib: None,
            stack_parent: None,
            attrs: Attrs::default(),
            content,
            size: Size::default(),
            outer: Rect::default(),
            inner: Rect::default(),
            outer_clipped: Rect::default(),
            inner_clipped: Rect::default(),
        }
    }
}

/// One frame's arena: the node vector plus the id lookup table built at
/// finalize, and the root-level float list.
#[derive(Default)]
pub(crate) struct Tree {
    pub nodes: Vec<Node>,
    pub map: HashMap<u64, NodeIdx, ahash::RandomState>,
    pub floaters: Vec<NodeIdx>,
}

impl Tree {
    fn clear(&mut self) {
        self.nodes.clear();
        self.map.clear();
        self.floaters.clear();
    }

    pub(crate) fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx as usize]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum FrameInput {
    #[default]
    None,
    Resize,
    Text(String),
    Key(KeyInput),
    Mouse,
}

/// Standard 16-color palette (xterm defaults) used until the host installs
/// the terminal's own answers to the startup palette queries.
pub const DEFAULT_PALETTE: [u32; 16] = [
    0xFF000000, 0xFFCD0000, 0xFF00CD00, 0xFFCDCD00, 0xFF0000EE, 0xFFCD00CD, 0xFF00CDCD, 0xFFE5E5E5,
    0xFF7F7F7F, 0xFFFF0000, 0xFF00FF00, 0xFFFFFF00, 0xFF5C5CFF, 0xFFFF00FF, 0xFF00FFFF, 0xFFFFFFFF,
];

pub struct Ctx {
    pub(crate) tree: Tree,
    pub(crate) prev: Tree,
    pub(crate) parent_stack: Vec<NodeIdx>,
    pub(crate) attr_target: Option<NodeIdx>,
    pub(crate) id_mixin: u64,
    pub(crate) focused: u64,
    pub(crate) autofocus: bool,
    pub(crate) open_menu: u64,
    pub(crate) size: Size,
    pub(crate) mouse: MouseInput,
    pub(crate) mouse_down: MouseAction,
    pub(crate) mouse_action: MouseAction,
    pub(crate) input: FrameInput,
    pub(crate) input_consumed: bool,
    pub(crate) palette: [u32; 16],
    pub(crate) default_bg: u32,
    pub(crate) default_fg: u32,
    pub(crate) prev_fb: Option<FrameBuffer>,
    pub(crate) sgr: Option<(u32, u32)>,
    pub(crate) finalized: bool,
}

impl Ctx {
    pub fn new(size: Size) -> Self {
        Self {
            tree: Tree::default(),
            prev: Tree::default(),
            parent_stack: Vec::new(),
            attr_target: None,
            id_mixin: 0,
            focused: 0,
            autofocus: false,
            open_menu: 0,
            size,
            mouse: MouseInput::default(),
            mouse_down: MouseAction::None,
            mouse_action: MouseAction::None,
            input: FrameInput::None,
            input_consumed: true,
            palette: DEFAULT_PALETTE,
            default_bg: DEFAULT_PALETTE[0],
            default_fg: DEFAULT_PALETTE[7],
            prev_fb: None,
            sgr: None,
            finalized: false,
        }
    }

    // ---- frame lifecycle --------------------------------------------------

    /// Swap the arenas, seed a fresh root and classify the frame's input.
    pub fn frame_begin(&mut self, input: Option<&InputEvent>) {
        // A release is an edge, not a state; it must not re-trigger clicks
        // on later frames.
        if self.mouse_action == MouseAction::Release {
            self.mouse_action = MouseAction::None;
        }
        std::mem::swap(&mut self.tree, &mut self.prev);
        self.tree.clear();
        self.parent_stack.clear();
        self.attr_target = None;
        self.id_mixin = 0;
        self.finalized = false;

        let root = Node::new(derive_id(0, "root", 0), Content::Container);
        self.tree.nodes.push(root);
        self.parent_stack.push(0);

        match input {
            None => {
                // Keep the previous mouse action; nothing new to consume.
                self.input = FrameInput::None;
                self.input_consumed = true;
            }
            Some(InputEvent::Resize { width, height }) => {
                self.size = Size::new((*width).clamp(1, 32767), (*height).clamp(1, 32767));
                self.input = FrameInput::Resize;
                self.input_consumed = true;
                self.mouse_action = MouseAction::None;
            }
            Some(InputEvent::Text(text)) => {
                self.input = FrameInput::Text(text.clone());
                self.input_consumed = false;
                self.mouse_action = MouseAction::None;
            }
            Some(InputEvent::Key(key)) => {
                self.input = FrameInput::Key(*key);
                self.input_consumed = false;
                self.mouse_action = MouseAction::None;
            }
            Some(InputEvent::Mouse(m)) => {
                self.mouse = *m;
                let mut action = m.action;
                match action {
                    MouseAction::None
                        if matches!(
                            self.mouse_down,
                            MouseAction::Left | MouseAction::Middle | MouseAction::Right
                        ) =>
                    {
                        action = MouseAction::Release;
                        self.mouse_down = MouseAction::None;
                    }
                    MouseAction::Left | MouseAction::Middle | MouseAction::Right => {
                        self.mouse_down = action;
                        if action == MouseAction::Left {
                            if let Some(id) = self.hit_test_prev(Point::new(m.x, m.y)) {
                                self.focused = id;
                                trace!(target: "tui.focus", id, "focus_by_press");
                            }
                        }
                    }
                    _ => {}
                }
                self.mouse.action = action;
                self.mouse_action = action;
                self.input = FrameInput::Mouse;
                self.input_consumed = false;
            }
        }
    }

    /// Build the id table and run the layout passes. Idempotent per frame.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        layout::finalize(&mut self.tree, self.size);
        trace!(target: "tui.layout", nodes = self.tree.nodes.len(), "finalize");
    }

    /// Finalize, paint and diff into the ANSI byte sequence for stdout.
    pub fn render(&mut self) -> String {
        self.finalize();
        let mut fb = FrameBuffer::new(self.size, self.default_bg, self.default_fg);
        render::paint_tree(&self.tree, &mut fb);
        let out = render::flush_frame(&fb, self.prev_fb.as_ref(), &self.palette, &mut self.sgr);
        self.prev_fb = Some(fb);
        out
    }

    // ---- tree building ----------------------------------------------------

    pub(crate) fn push_node(&mut self, label: &str, content: Content) -> NodeIdx {
        let parent = *self
            .parent_stack
            .last()
            .expect("frame_begin must run before building");
        let seed = self.tree.node(parent).id;
        let mixin = std::mem::take(&mut self.id_mixin);
        let id = derive_id(seed, label, mixin);
        let idx = self.tree.nodes.len() as NodeIdx;
        let mut node = Node::new(id, content);
        node.parent = Some(parent);
        node.stack_parent = Some(parent);
        node.prev_sib = self.tree.node(parent).last_child;
        self.tree.nodes.push(node);
        if let Some(prev_sib) = self.tree.node(parent).last_child {
            self.tree.node_mut(prev_sib).next_sib = Some(idx);
        } else {
            self.tree.node_mut(parent).first_child = Some(idx);
        }
        self.tree.node_mut(parent).last_child = Some(idx);
        if self.autofocus && self.focused == seed {
            self.focused = id;
        }
        self.attr_target = Some(idx);
        idx
    }

    /// Open a container; subsequent nodes become its children until the
    /// matching [`Ctx::container_end`]. Returns the container's id.
    pub fn container_begin(&mut self, label: &str) -> u64 {
        let idx = self.push_node(label, Content::Container);
        self.parent_stack.push(idx);
        self.tree.node(idx).id
    }

    pub fn container_end(&mut self) {
        assert!(self.parent_stack.len() > 1, "container_end without begin");
        let idx = self.parent_stack.pop().expect("stack");
        self.attr_target = Some(idx);
        self.autofocus = false;
    }

    /// Salt mixed into the next node's id; lets loops emit distinct ids
    /// from one label.
    pub fn next_id_mixin(&mut self, mixin: u64) {
        self.id_mixin = mixin;
    }

    // ---- attributes (apply to the most recent node) ------------------------

    fn target(&mut self) -> &mut Node {
        let idx = self.attr_target.expect("no node to attribute");
        self.tree.node_mut(idx)
    }

    pub fn attr_padding(&mut self, padding: Rect) {
        self.target().attrs.padding = padding;
    }

    pub fn attr_background(&mut self, bg: u32) {
        self.target().attrs.bg = bg;
    }

    pub fn attr_foreground(&mut self, fg: u32) {
        self.target().attrs.fg = fg;
    }

    pub fn attr_border(&mut self) {
        self.target().attrs.bordered = true;
    }

    pub fn attr_columns(&mut self, columns: &[i32]) {
        self.target().attrs.columns = SmallVec::from_slice(columns);
    }

    pub fn attr_intrinsic(&mut self, size: Size) {
        self.target().attrs.intrinsic = Some(size);
    }

    /// Re-home the target node to the root-level float list; it will be
    /// laid out against its logical parent with gravity and offset and
    /// clipped to the root.
    pub fn attr_float(&mut self, spec: FloatSpec) {
        let idx = self.attr_target.expect("no node to float");
        self.unlink(idx);
        let node = self.tree.node_mut(idx);
        node.attrs.float = Some(spec);
        node.attrs.floating = true;
        self.tree.floaters.push(idx);
    }

    fn unlink(&mut self, idx: NodeIdx) {
        let (parent, prev_sib, next_sib) = {
            let n = self.tree.node(idx);
            (n.parent, n.prev_sib, n.next_sib)
        };
        if let Some(p) = prev_sib {
            self.tree.node_mut(p).next_sib = next_sib;
        } else if let Some(par) = parent {
            self.tree.node_mut(par).first_child = next_sib;
        }
        if let Some(nx) = next_sib {
            self.tree.node_mut(nx).prev_sib = prev_sib;
        } else if let Some(par) = parent {
            self.tree.node_mut(par).last_child = prev_sib;
        }
        let node = self.tree.node_mut(idx);
        node.parent = None;
        node.prev_sib = None;
        node.next_sib = None;
    }

    // ---- retained state, focus and input ----------------------------------

    /// The previous frame's node for `id`, if it existed.
    pub fn prev_node(&self, id: u64) -> Option<&Node> {
        self.prev.map.get(&id).map(|&idx| self.prev.node(idx))
    }

    pub fn focus(&self) -> u64 {
        self.focused
    }

    pub fn set_focus(&mut self, id: u64) {
        self.focused = id;
    }

    /// Migrate focus into the next node created under the currently focused
    /// one. Cleared by `container_end`.
    pub fn autofocus_next(&mut self) {
        self.autofocus = true;
    }

    /// Focus the most recently created node.
    pub fn steal_focus(&mut self) {
        if let Some(idx) = self.attr_target {
            self.focused = self.tree.node(idx).id;
        }
    }

    /// Id of the most recently created node.
    pub fn last_id(&self) -> u64 {
        self.attr_target
            .map(|idx| self.tree.node(idx).id)
            .unwrap_or(0)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn mouse(&self) -> MouseInput {
        self.mouse
    }

    /// Palette entry as an opaque color.
    pub fn indexed(&self, i: usize) -> u32 {
        self.palette[i & 15]
    }

    pub fn set_palette(&mut self, palette: [u32; 16]) {
        self.palette = palette;
        self.default_bg = palette[0];
        self.default_fg = palette[7];
    }

    /// True when the live mouse position lies inside the previous-frame
    /// rect of the most recent node.
    pub fn is_hovered(&self) -> bool {
        let id = self.last_id();
        self.prev_node(id)
            .is_some_and(|n| n.inner_clipped.contains(Point::new(self.mouse.x, self.mouse.y)))
    }

    /// Focus on the most recent node plus a release this frame.
    pub fn was_clicked(&self) -> bool {
        self.focused == self.last_id() && self.mouse_action == MouseAction::Release
    }

    /// Consume the frame's keyboard input if it matches `shortcut`.
    pub fn consume_shortcut(&mut self, shortcut: KeyInput) -> bool {
        if self.input_consumed {
            return false;
        }
        if let FrameInput::Key(key) = &self.input {
            if *key == shortcut {
                self.input_consumed = true;
                return true;
            }
        }
        false
    }

    pub(crate) fn take_text(&mut self) -> Option<String> {
        if self.input_consumed {
            return None;
        }
        if let FrameInput::Text(t) = &self.input {
            let t = t.clone();
            self.input_consumed = true;
            return Some(t);
        }
        None
    }

    pub(crate) fn peek_key(&self) -> Option<KeyInput> {
        if self.input_consumed {
            return None;
        }
        match &self.input {
            FrameInput::Key(k) => Some(*k),
            _ => None,
        }
    }

    pub(crate) fn consume_input(&mut self) {
        self.input_consumed = true;
    }

    fn hit_test_prev(&self, p: Point) -> Option<u64> {
        if self.prev.nodes.is_empty() {
            return None;
        }
        let mut best = hit_node(&self.prev, 0, p);
        for &f in &self.prev.floaters {
            if let Some(hit) = hit_node(&self.prev, f, p) {
                best = Some(hit);
            }
        }
        best.map(|idx| self.prev.node(idx).id)
    }
}

/// Deepest node whose clipped interior contains `p`; later siblings win.
fn hit_node(tree: &Tree, idx: NodeIdx, p: Point) -> Option<NodeIdx> {
    let node = tree.node(idx);
    let mut best = node.inner_clipped.contains(p).then_some(idx);
    let mut child = node.first_child;
    while let Some(c) = child {
        if let Some(hit) = hit_node(tree, c, p) {
            best = Some(hit);
        }
        child = tree.node(c).next_sib;
    }
    best
}

fn derive_id(seed: u64, label: &str, mixin: u64) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    h.write_u64(seed);
    h.write(label.as_bytes());
    if mixin != 0 {
        h.write_u64(mixin);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_across_frames() {
        let mut ctx = Ctx::new(Size::new(20, 5));
        ctx.frame_begin(None);
        let a1 = ctx.container_begin("a");
        ctx.container_end();
        ctx.finalize();
        ctx.frame_begin(None);
        let a2 = ctx.container_begin("a");
        ctx.container_end();
        assert_eq!(a1, a2);
    }

    #[test]
    fn ids_depend_on_parent_chain_and_mixin() {
        let mut ctx = Ctx::new(Size::new(20, 5));
        ctx.frame_begin(None);
        let outer = ctx.container_begin("x");
        let nested = ctx.container_begin("x");
        ctx.container_end();
        ctx.container_end();
        assert_ne!(outer, nested);
        ctx.next_id_mixin(1);
        let m1 = ctx.container_begin("loop");
        ctx.container_end();
        ctx.next_id_mixin(2);
        let m2 = ctx.container_begin("loop");
        ctx.container_end();
        assert_ne!(m1, m2);
    }

    #[test]
    fn prev_node_lookup_after_frame_swap() {
        let mut ctx = Ctx::new(Size::new(20, 5));
        ctx.frame_begin(None);
        let id = ctx.container_begin("pane");
        ctx.container_end();
        ctx.finalize();
        ctx.frame_begin(None);
        assert!(ctx.prev_node(id).is_some());
        assert!(ctx.prev_node(id ^ 1).is_none());
    }

    #[test]
    fn autofocus_chains_into_new_children() {
        let mut ctx = Ctx::new(Size::new(20, 5));
        ctx.frame_begin(None);
        let pane = ctx.container_begin("pane");
        ctx.set_focus(pane);
        ctx.autofocus_next();
        let child = ctx.container_begin("child");
        ctx.container_end();
        ctx.container_end();
        assert_eq!(ctx.focus(), child);
    }

    #[test]
    fn shortcut_consumed_once() {
        use quill_vt::{Key, KeyInput};
        let mut ctx = Ctx::new(Size::new(20, 5));
        let ev = InputEvent::Key(KeyInput::ctrl(Key::Char('S')));
        ctx.frame_begin(Some(&ev));
        assert!(ctx.consume_shortcut(KeyInput::ctrl(Key::Char('S'))));
        assert!(!ctx.consume_shortcut(KeyInput::ctrl(Key::Char('S'))));
    }
}
