//! Layout: id table, intrinsic sizes, grid placement, scrollareas and
//! floaters.
//!
//! Runs once per frame from `Ctx::finalize`. Intrinsic sizes are computed
//! depth-first (a node's outer size is its content plus padding, border and
//! the scrollarea gutter), then the document root is laid out against the
//! screen rect, then each floater is placed against its logical parent and
//! clipped to the root.

use smallvec::SmallVec;

use crate::geometry::{Point, Rect, Size};
use crate::render::text_width;
use crate::{Content, Node, NodeIdx, Tree};

pub(crate) fn finalize(tree: &mut Tree, screen: Size) {
    if tree.nodes.is_empty() {
        return;
    }
    for i in 0..tree.nodes.len() {
        let id = tree.nodes[i].id;
        tree.map.insert(id, i as NodeIdx);
    }
    intrinsic(tree, 0);
    let floaters = tree.floaters.clone();
    for &f in &floaters {
        intrinsic(tree, f);
    }

    let screen_rect = Rect::of_size(screen);
    place(tree, 0, screen_rect, screen_rect);

    let root_inner = tree.node(0).inner;
    for &f in &floaters {
        let node = tree.node(f);
        let spec = node.attrs.float.unwrap_or_default();
        let size = node.size;
        let anchor = node
            .stack_parent
            .map(|p| tree.node(p).outer)
            .unwrap_or(screen_rect);
        let origin = Point::new(
            anchor.left + spec.offset_x - (spec.gravity_x * size.width as f32).round() as i32,
            anchor.top + spec.offset_y - (spec.gravity_y * size.height as f32).round() as i32,
        );
        let outer = Rect::at(origin, size);
        let clip = outer.intersect(root_inner);
        place(tree, f, outer, clip);
    }
}

/// Horizontal and vertical chrome around a node's content: padding, border
/// and the scrollbar gutter.
fn chrome(node: &Node) -> (i32, i32) {
    let border = i32::from(node.attrs.bordered);
    let gutter = i32::from(matches!(node.content, Content::Scrollarea(_)));
    let p = node.attrs.padding;
    (
        p.left + p.right + 2 * border + gutter,
        p.top + p.bottom + 2 * border,
    )
}

fn outer_to_inner(node: &Node, outer: Rect) -> Rect {
    let border = i32::from(node.attrs.bordered);
    let gutter = i32::from(matches!(node.content, Content::Scrollarea(_)));
    let p = node.attrs.padding;
    let mut r = Rect::new(
        outer.left + border + p.left,
        outer.top + border + p.top,
        outer.right - border - gutter - p.right,
        outer.bottom - border - p.bottom,
    );
    if r.right < r.left {
        r.right = r.left;
    }
    if r.bottom < r.top {
        r.bottom = r.top;
    }
    r
}

/// Depth-first intrinsic size computation; writes each node's outer size.
fn intrinsic(tree: &mut Tree, idx: NodeIdx) {
    let mut child = tree.node(idx).first_child;
    while let Some(c) = child {
        intrinsic(tree, c);
        child = tree.node(c).next_sib;
    }
    let inner = if let Some(explicit) = tree.node(idx).attrs.intrinsic {
        explicit
    } else {
        match &tree.node(idx).content {
            Content::Text { chunks } => Size::new(
                chunks.iter().map(|c| text_width(&c.text)).sum(),
                1,
            ),
            Content::Textarea(view) => Size::new(
                view.rows
                    .iter()
                    .map(|r| text_width(&r.text))
                    .max()
                    .unwrap_or(0),
                view.rows.len() as i32,
            ),
            Content::Scrollarea(_) => tree
                .node(idx)
                .first_child
                .map(|c| tree.node(c).size)
                .unwrap_or_default(),
            Content::Container => container_intrinsic(tree, idx),
        }
    };
    let (cw, ch) = chrome(tree.node(idx));
    tree.node_mut(idx).size = Size::new(inner.width + cw, inner.height + ch);
}

/// Grid accumulation: children flow row-major across the column spec; each
/// row is as tall as its tallest child.
fn container_intrinsic(tree: &Tree, idx: NodeIdx) -> Size {
    let columns = effective_columns(tree.node(idx));
    let k = columns.len();
    let mut total = Size::default();
    let (mut row_w, mut row_h, mut col) = (0i32, 0i32, 0usize);
    let mut child = tree.node(idx).first_child;
    while let Some(c) = child {
        let cs = tree.node(c).size;
        row_w += cs.width.max(columns[col]);
        row_h = row_h.max(cs.height);
        col += 1;
        if col == k {
            total.width = total.width.max(row_w);
            total.height += row_h;
            row_w = 0;
            row_h = 0;
            col = 0;
        }
        child = tree.node(c).next_sib;
    }
    if col > 0 {
        total.width = total.width.max(row_w);
        total.height += row_h;
    }
    total
}

fn effective_columns(node: &Node) -> SmallVec<[i32; 4]> {
    if node.attrs.columns.is_empty() {
        SmallVec::from_slice(&[-1])
    } else {
        node.attrs.columns.clone()
    }
}

/// Assign a node's rects and recurse into its content.
fn place(tree: &mut Tree, idx: NodeIdx, outer: Rect, clip: Rect) {
    let inner = outer_to_inner(tree.node(idx), outer);
    {
        let n = tree.node_mut(idx);
        n.outer = outer;
        n.inner = inner;
        n.outer_clipped = outer.intersect(clip);
        n.inner_clipped = inner.intersect(clip);
    }
    if matches!(tree.node(idx).content, Content::Scrollarea(_)) {
        place_scrollarea(tree, idx);
    } else {
        place_children(tree, idx, clip);
    }
}

fn place_children(tree: &mut Tree, idx: NodeIdx, clip: Rect) {
    let inner = tree.node(idx).inner;
    let columns = effective_columns(tree.node(idx));
    let k = columns.len();
    let mut kids: Vec<NodeIdx> = Vec::new();
    let mut child = tree.node(idx).first_child;
    while let Some(c) = child {
        kids.push(c);
        child = tree.node(c).next_sib;
    }
    if kids.is_empty() {
        return;
    }
    // Intrinsic width per column, then absolute / flexible resolution.
    let mut colw = vec![0i32; k];
    for (i, &c) in kids.iter().enumerate() {
        colw[i % k] = colw[i % k].max(tree.node(c).size.width);
    }
    let absolute: i32 = columns.iter().filter(|&&w| w > 0).sum();
    let flex: i32 = columns.iter().filter(|&&w| w < 0).map(|&w| -w).sum();
    let remaining = (inner.width() - absolute).max(0);
    let resolved: Vec<i32> = columns
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            if w > 0 {
                w
            } else if w == 0 {
                colw[i]
            } else {
                colw[i].max(((-w as f64) * f64::from(remaining) / f64::from(flex.max(1))).round()
                    as i32)
            }
        })
        .collect();

    let (mut x, mut y, mut row_h) = (inner.left, inner.top, 0i32);
    for (i, &c) in kids.iter().enumerate() {
        let col = i % k;
        let size = tree.node(c).size;
        let outer = Rect::new(x, y, x + size.width, y + size.height).intersect(inner);
        place(tree, c, outer, clip);
        row_h = row_h.max(size.height);
        x += resolved[col];
        if col + 1 == k {
            x = inner.left;
            y += row_h;
            row_h = 0;
        }
    }
}

fn place_scrollarea(tree: &mut Tree, idx: NodeIdx) {
    let Some(child) = tree.node(idx).first_child else {
        return;
    };
    let inner = tree.node(idx).inner;
    let inner_clipped = tree.node(idx).inner_clipped;
    let content = tree.node(child).size;
    let size = Size::new(
        content.width.max(inner.width()),
        content.height.max(inner.height()),
    );
    let max_x = (size.width - inner.width()).max(0);
    let max_y = (size.height - inner.height()).max(0);
    let off = {
        let n = tree.node_mut(idx);
        if let Content::Scrollarea(off) = &mut n.content {
            off.x = off.x.clamp(0, max_x);
            off.y = off.y.clamp(0, max_y);
            *off
        } else {
            Point::default()
        }
    };
    let outer = Rect::at(Point::new(inner.left - off.x, inner.top - off.y), size);
    place(tree, child, outer, inner_clipped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_accounts_for_border_and_padding() {
        let mut node = Node::new(1, Content::Container);
        node.attrs.bordered = true;
        node.attrs.padding = Rect::new(1, 0, 2, 0);
        let (cw, ch) = chrome(&node);
        assert_eq!((cw, ch), (5, 2));
    }

    #[test]
    fn scrollarea_chrome_reserves_the_gutter() {
        let node = Node::new(1, Content::Scrollarea(Point::default()));
        assert_eq!(chrome(&node), (1, 0));
    }

    #[test]
    fn inner_never_inverts() {
        let mut node = Node::new(1, Content::Container);
        node.attrs.bordered = true;
        let r = outer_to_inner(&node, Rect::new(0, 0, 1, 1));
        assert!(!r.is_empty() || (r.width() == 0 && r.height() == 0));
    }
}
