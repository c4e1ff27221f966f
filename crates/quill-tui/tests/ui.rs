//! Frame-level scenarios: focus by mouse, scroll clamping, output diffing
//! and render determinism.

use pretty_assertions::assert_eq;
use quill_text::TextBuffer;
use quill_tui::{Content, Ctx, Point, Size};
use quill_vt::{InputEvent, MouseAction, MouseInput};

fn mouse(action: MouseAction, x: i32, y: i32, scroll: i32) -> InputEvent {
    InputEvent::Mouse(MouseInput {
        action,
        x,
        y,
        scroll,
        ..Default::default()
    })
}

fn build_two_buttons(ctx: &mut Ctx) -> (u64, bool, u64, bool) {
    ctx.container_begin("bar");
    ctx.attr_columns(&[0, 0]);
    let c1 = ctx.button("b1", "One");
    let id1 = ctx.last_id();
    let c2 = ctx.button("b2", "Two");
    let id2 = ctx.last_id();
    ctx.container_end();
    (id1, c1, id2, c2)
}

#[test]
fn mouse_press_focuses_and_release_clicks() {
    let mut ctx = Ctx::new(Size::new(20, 5));

    ctx.frame_begin(None);
    build_two_buttons(&mut ctx);
    ctx.render();

    // Button one occupies columns 0..5, button two 5..10; press inside two.
    let press = mouse(MouseAction::Left, 6, 0, 0);
    ctx.frame_begin(Some(&press));
    let (id1, c1, id2, c2) = build_two_buttons(&mut ctx);
    assert_eq!(ctx.focus(), id2);
    assert_ne!(ctx.focus(), id1);
    assert!(!c1 && !c2, "no click before the release");
    ctx.render();

    // Button-less mouse report synthesises the release.
    let release = mouse(MouseAction::None, 6, 0, 0);
    ctx.frame_begin(Some(&release));
    let (_, c1, _, c2) = build_two_buttons(&mut ctx);
    assert!(c2, "focused button sees the click");
    assert!(!c1);
}

fn build_scrollarea(ctx: &mut Ctx) -> u64 {
    let sid = ctx.scrollarea_begin("scroll");
    ctx.attr_intrinsic(Size::new(10, 10));
    ctx.container_begin("content");
    ctx.attr_intrinsic(Size::new(8, 100));
    ctx.container_end();
    ctx.scrollarea_end();
    sid
}

#[test]
fn scrollarea_offset_saturates() {
    let mut ctx = Ctx::new(Size::new(20, 12));
    ctx.frame_begin(None);
    let sid = build_scrollarea(&mut ctx);
    ctx.render();

    let wheel = mouse(MouseAction::Scroll, 2, 2, 3);
    for _ in 0..40 {
        ctx.frame_begin(Some(&wheel));
        build_scrollarea(&mut ctx);
        ctx.render();
    }
    ctx.frame_begin(None);
    build_scrollarea(&mut ctx);
    ctx.finalize();
    let node = ctx.prev_node(sid).expect("scrollarea in prev frame");
    match node.content {
        Content::Scrollarea(p) => assert_eq!(p.y, 90, "content 100, viewport 10"),
        ref other => panic!("unexpected content {other:?}"),
    }

    // Scrolling back up saturates at zero.
    let wheel_up = mouse(MouseAction::Scroll, 2, 2, -3);
    for _ in 0..40 {
        ctx.frame_begin(Some(&wheel_up));
        build_scrollarea(&mut ctx);
        ctx.render();
    }
    ctx.frame_begin(None);
    build_scrollarea(&mut ctx);
    ctx.finalize();
    let node = ctx.prev_node(sid).expect("scrollarea in prev frame");
    match node.content {
        Content::Scrollarea(p) => assert_eq!(p.y, 0),
        ref other => panic!("unexpected content {other:?}"),
    }
}

#[test]
fn single_cell_background_change_emits_one_sgr() {
    let mut ctx = Ctx::new(Size::new(8, 2));

    ctx.frame_begin(None);
    ctx.container_begin("body");
    ctx.container_end();
    let first = ctx.render();
    // Full repaint: home, one SGR for the default pair, two padded rows.
    assert_eq!(first, "\x1b[H\x1b[40;37m        \r\n        \x1b[?25l");

    ctx.frame_begin(None);
    ctx.container_begin("body");
    let red = ctx.indexed(1);
    ctx.label("cell", " ");
    ctx.attr_background(red);
    ctx.container_end();
    let second = ctx.render();
    // Diff: exactly one cell repainted with exactly one bg transition.
    assert_eq!(second, "\x1b[H\x1b[1;1H\x1b[41m \x1b[?25l");

    // An identical frame emits nothing but home and cursor hide.
    ctx.frame_begin(None);
    ctx.container_begin("body");
    let red = ctx.indexed(1);
    ctx.label("cell", " ");
    ctx.attr_background(red);
    ctx.container_end();
    let third = ctx.render();
    assert_eq!(third, "\x1b[H\x1b[?25l");
}

#[test]
fn rendering_is_deterministic() {
    let run = || {
        let mut ctx = Ctx::new(Size::new(30, 8));
        let mut out = Vec::new();
        ctx.frame_begin(None);
        build_two_buttons(&mut ctx);
        out.push(ctx.render());
        let press = mouse(MouseAction::Left, 2, 0, 0);
        ctx.frame_begin(Some(&press));
        build_two_buttons(&mut ctx);
        out.push(ctx.render());
        out
    };
    assert_eq!(run(), run());
}

#[test]
fn bordered_floater_paints_a_box() {
    let mut ctx = Ctx::new(Size::new(10, 5));
    ctx.frame_begin(None);
    ctx.container_begin("modal");
    ctx.attr_intrinsic(Size::new(2, 1));
    ctx.attr_border();
    ctx.attr_float(quill_tui::FloatSpec {
        gravity_x: 0.0,
        gravity_y: 0.0,
        offset_x: 1,
        offset_y: 1,
    });
    ctx.container_end();
    let out = ctx.render();
    assert!(out.contains("┌──┐"), "missing top border in {out:?}");
    assert!(out.contains("└──┘"), "missing bottom border in {out:?}");
    assert!(out.contains('│'), "missing side border in {out:?}");
}

#[test]
fn textarea_types_clicks_and_scrolls() {
    let mut tb = TextBuffer::from_str("alpha\nbeta\ngamma\ndelta\nepsilon");
    let mut ctx = Ctx::new(Size::new(12, 3));

    let build = |ctx: &mut Ctx, tb: &mut TextBuffer| {
        ctx.container_begin("body");
        let id = ctx.textarea("doc", tb);
        ctx.attr_intrinsic(Size::new(12, 3));
        ctx.container_end();
        id
    };

    ctx.frame_begin(None);
    let id = build(&mut ctx, &mut tb);
    ctx.set_focus(id);
    ctx.render();

    // Typed text lands at the cursor.
    ctx.frame_begin(Some(&InputEvent::Text("X".into())));
    build(&mut ctx, &mut tb);
    ctx.render();
    assert!(tb.contents().starts_with("Xalpha"));

    // A click moves the cursor to the pointed cell.
    ctx.frame_begin(Some(&mouse(MouseAction::Left, 2, 1, 0)));
    build(&mut ctx, &mut tb);
    ctx.render();
    assert_eq!(tb.cursor().logical, Point::new(2, 1));
    ctx.frame_begin(Some(&mouse(MouseAction::None, 2, 1, 0)));
    build(&mut ctx, &mut tb);
    ctx.render();

    // Moving the cursor below the viewport scrolls it into view.
    for _ in 0..4 {
        ctx.frame_begin(Some(&InputEvent::Key(quill_vt::KeyInput::plain(
            quill_vt::Key::Down,
        ))));
        build(&mut ctx, &mut tb);
        ctx.render();
    }
    ctx.frame_begin(None);
    build(&mut ctx, &mut tb);
    ctx.finalize();
    let node = ctx.prev_node(id).expect("textarea node");
    match &node.content {
        Content::Textarea(view) => {
            assert!(view.scroll.y >= 2, "cursor on line 4 forces scroll");
            assert!(view.rows.iter().any(|r| r.text.contains("epsilon")));
        }
        other => panic!("unexpected content {other:?}"),
    }
}

#[test]
fn menu_opens_and_item_clicks() {
    let mut ctx = Ctx::new(Size::new(24, 6));

    let build = |ctx: &mut Ctx| -> bool {
        let mut clicked = false;
        ctx.container_begin("app");
        ctx.menubar_begin();
        if ctx.menu_begin("file", "File") {
            clicked = ctx.menu_item("save", "Save");
            ctx.menu_end();
        }
        ctx.menubar_end();
        ctx.container_end();
        clicked
    };

    ctx.frame_begin(None);
    build(&mut ctx);
    ctx.render();

    // Click the File title: press then release.
    ctx.frame_begin(Some(&mouse(MouseAction::Left, 1, 0, 0)));
    build(&mut ctx);
    ctx.render();
    ctx.frame_begin(Some(&mouse(MouseAction::None, 1, 0, 0)));
    let opened = build(&mut ctx);
    assert!(!opened);
    ctx.render();

    // The drop-down exists now; click the Save item.
    ctx.frame_begin(None);
    build(&mut ctx);
    ctx.render();
    ctx.frame_begin(Some(&mouse(MouseAction::Left, 3, 2, 0)));
    build(&mut ctx);
    ctx.render();
    ctx.frame_begin(Some(&mouse(MouseAction::None, 3, 2, 0)));
    let saved = build(&mut ctx);
    assert!(saved, "menu item click must land");
}
