//! Input classification: VT tokens to high-level input events.

use crate::parser::{Csi, Parser, Token};
use bitflags::bitflags;
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mods: u8 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// A key with its modifier set; also serves as a shortcut descriptor for
/// the UI's consume-shortcut check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInput {
    pub key: Key,
    pub mods: Mods,
}

impl KeyInput {
    pub const fn plain(key: Key) -> Self {
        Self {
            key,
            mods: Mods::empty(),
        }
    }

    pub const fn ctrl(key: Key) -> Self {
        Self {
            key,
            mods: Mods::CTRL,
        }
    }

    pub const fn alt(key: Key) -> Self {
        Self {
            key,
            mods: Mods::ALT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseAction {
    /// No button: release payloads and plain motion.
    #[default]
    None,
    Left,
    Middle,
    Right,
    Scroll,
    /// Synthesised by the UI when a press is followed by no button.
    Release,
}

/// Mouse state in 0-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseInput {
    pub action: MouseAction,
    pub x: i32,
    pub y: i32,
    /// Vertical wheel delta in rows; ±3 per notch.
    pub scroll: i32,
    pub mods: Mods,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Committed text ready for insertion.
    Text(String),
    Key(KeyInput),
    Mouse(MouseInput),
    Resize { width: i32, height: i32 },
}

/// Pulls tokens from the wrapped parser and yields input events.
#[derive(Debug, Default)]
pub struct Classifier {
    parser: Parser,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next event from `input[*pos..]`, skipping tokens that do not map to
    /// one. `None` means the input is exhausted (possibly mid-sequence).
    pub fn next_event(&mut self, input: &[u8], pos: &mut usize) -> Option<InputEvent> {
        loop {
            let token = self.parser.parse_next(input, pos)?;
            if let Some(event) = classify_token(token) {
                trace!(target: "input.classify", kind = event_kind(&event), "event");
                return Some(event);
            }
        }
    }

    /// Turn a dangling lone ESC into an Escape keypress. Host policy calls
    /// this once a read batch drains without further bytes.
    pub fn flush_escape(&mut self) -> Option<InputEvent> {
        self.parser
            .flush_escape()
            .then_some(InputEvent::Key(KeyInput::plain(Key::Escape)))
    }

    pub fn in_sequence(&self) -> bool {
        self.parser.in_sequence()
    }
}

fn event_kind(event: &InputEvent) -> &'static str {
    match event {
        InputEvent::Text(_) => "text",
        InputEvent::Key(_) => "key",
        InputEvent::Mouse(_) => "mouse",
        InputEvent::Resize { .. } => "resize",
    }
}

fn classify_token(token: Token<'_>) -> Option<InputEvent> {
    match token {
        Token::Text(bytes) => Some(InputEvent::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        Token::Ctrl(b) => classify_ctrl(b),
        Token::Esc(Some(b)) if (0x20..0x7F).contains(&b) => Some(InputEvent::Key(KeyInput::alt(
            Key::Char(b as char),
        ))),
        Token::Esc(_) => Some(InputEvent::Key(KeyInput::plain(Key::Escape))),
        Token::Ss3(b) => match b {
            b'P'..=b'S' => Some(InputEvent::Key(KeyInput::plain(Key::F(1 + b - b'P')))),
            _ => None,
        },
        Token::Csi(csi) => classify_csi(&csi),
        Token::Osc(_) | Token::Dcs(_) => None,
    }
}

fn classify_ctrl(b: u8) -> Option<InputEvent> {
    // NUL, TAB and CR pass through as their own keys; every other byte in
    // the C0 letter range folds to `byte | 0x40` with CTRL held.
    let key = match b {
        0x00 => KeyInput::plain(Key::Char('\0')),
        0x09 => KeyInput::plain(Key::Tab),
        0x0D => KeyInput::plain(Key::Enter),
        0x7F => KeyInput::plain(Key::Backspace),
        0x01..=0x1A => KeyInput::ctrl(Key::Char((b | 0x40) as char)),
        _ => return None,
    };
    Some(InputEvent::Key(key))
}

/// Decode xterm-style modifiers: `param − 1` is a bit set of
/// shift / alt / ctrl.
fn mods_from_param(param: u16) -> Mods {
    let bits = param.saturating_sub(1);
    let mut mods = Mods::empty();
    if bits & 1 != 0 {
        mods |= Mods::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Mods::ALT;
    }
    if bits & 4 != 0 {
        mods |= Mods::CTRL;
    }
    mods
}

fn classify_csi(csi: &Csi) -> Option<InputEvent> {
    if csi.private == b'<' && matches!(csi.final_byte, b'M' | b'm') {
        return classify_mouse(csi);
    }
    let key = match csi.final_byte {
        b'A' => Key::Up,
        b'B' => Key::Down,
        b'C' => Key::Right,
        b'D' => Key::Left,
        b'F' => Key::End,
        b'H' => Key::Home,
        b'~' => match csi.param(0, 0) {
            1 | 7 => Key::Home,
            2 => Key::Insert,
            3 => Key::Delete,
            4 | 8 => Key::End,
            5 => Key::PageUp,
            6 => Key::PageDown,
            n @ 11..=15 => Key::F((n - 10) as u8),
            n @ 17..=21 => Key::F((n - 11) as u8),
            n @ 23..=26 => Key::F((n - 12) as u8),
            n @ 28..=29 => Key::F((n - 13) as u8),
            n @ 31..=34 => Key::F((n - 14) as u8),
            _ => return None,
        },
        b't' if csi.param(0, 0) == 8 => {
            let height = i32::from(csi.param(1, 0)).clamp(1, 32767);
            let width = i32::from(csi.param(2, 0)).clamp(1, 32767);
            return Some(InputEvent::Resize { width, height });
        }
        _ => return None,
    };
    Some(InputEvent::Key(KeyInput {
        key,
        mods: mods_from_param(csi.param(1, 1)),
    }))
}

fn classify_mouse(csi: &Csi) -> Option<InputEvent> {
    let button = csi.param(0, 0);
    let x = i32::from(csi.param(1, 1).max(1)) - 1;
    let y = i32::from(csi.param(2, 1).max(1)) - 1;
    let mut mods = Mods::empty();
    if button & 4 != 0 {
        mods |= Mods::SHIFT;
    }
    if button & 8 != 0 {
        mods |= Mods::ALT;
    }
    if button & 16 != 0 {
        mods |= Mods::CTRL;
    }
    let (action, scroll) = if button & 64 != 0 {
        (MouseAction::Scroll, if button & 1 != 0 { 3 } else { -3 })
    } else if csi.final_byte == b'm' {
        (MouseAction::None, 0)
    } else {
        let action = match button & 3 {
            0 => MouseAction::Left,
            1 => MouseAction::Middle,
            2 => MouseAction::Right,
            _ => MouseAction::None,
        };
        (action, 0)
    };
    Some(InputEvent::Mouse(MouseInput {
        action,
        x,
        y,
        scroll,
        mods,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &[u8]) -> Vec<InputEvent> {
        let mut classifier = Classifier::new();
        let mut pos = 0;
        let mut out = Vec::new();
        while let Some(ev) = classifier.next_event(input, &mut pos) {
            out.push(ev);
        }
        out
    }

    #[test]
    fn text_event() {
        assert_eq!(events(b"hi"), vec![InputEvent::Text("hi".into())]);
    }

    #[test]
    fn ctrl_letters_gain_ctrl_modifier() {
        assert_eq!(
            events(b"\x13"),
            vec![InputEvent::Key(KeyInput::ctrl(Key::Char('S')))]
        );
        assert_eq!(
            events(b"\x1a"),
            vec![InputEvent::Key(KeyInput::ctrl(Key::Char('Z')))]
        );
    }

    #[test]
    fn nul_tab_enter_backspace_stay_plain() {
        assert_eq!(
            events(b"\x00"),
            vec![InputEvent::Key(KeyInput::plain(Key::Char('\0')))]
        );
        assert_eq!(events(b"\t"), vec![InputEvent::Key(KeyInput::plain(Key::Tab))]);
        assert_eq!(
            events(b"\r"),
            vec![InputEvent::Key(KeyInput::plain(Key::Enter))]
        );
        assert_eq!(
            events(b"\x7f"),
            vec![InputEvent::Key(KeyInput::plain(Key::Backspace))]
        );
    }

    #[test]
    fn line_feed_is_ctrl_j() {
        assert_eq!(
            events(b"\n"),
            vec![InputEvent::Key(KeyInput::ctrl(Key::Char('J')))]
        );
    }

    #[test]
    fn alt_key() {
        assert_eq!(
            events(b"\x1bf"),
            vec![InputEvent::Key(KeyInput::alt(Key::Char('f')))]
        );
    }

    #[test]
    fn arrows_with_modifiers() {
        assert_eq!(events(b"\x1b[A"), vec![InputEvent::Key(KeyInput::plain(Key::Up))]);
        assert_eq!(
            events(b"\x1b[1;5C"),
            vec![InputEvent::Key(KeyInput::ctrl(Key::Right))]
        );
        assert_eq!(
            events(b"\x1b[1;2H"),
            vec![InputEvent::Key(KeyInput {
                key: Key::Home,
                mods: Mods::SHIFT
            })]
        );
    }

    #[test]
    fn tilde_table() {
        assert_eq!(
            events(b"\x1b[3~"),
            vec![InputEvent::Key(KeyInput::plain(Key::Delete))]
        );
        assert_eq!(
            events(b"\x1b[5~"),
            vec![InputEvent::Key(KeyInput::plain(Key::PageUp))]
        );
        assert_eq!(
            events(b"\x1b[15~"),
            vec![InputEvent::Key(KeyInput::plain(Key::F(5)))]
        );
        assert_eq!(
            events(b"\x1b[24~"),
            vec![InputEvent::Key(KeyInput::plain(Key::F(12)))]
        );
        assert_eq!(
            events(b"\x1b[34~"),
            vec![InputEvent::Key(KeyInput::plain(Key::F(20)))]
        );
    }

    #[test]
    fn ss3_function_keys() {
        assert_eq!(
            events(b"\x1bOQ"),
            vec![InputEvent::Key(KeyInput::plain(Key::F(2)))]
        );
    }

    #[test]
    fn sgr_mouse_press_is_zero_based() {
        assert_eq!(
            events(b"\x1b[<0;10;5M"),
            vec![InputEvent::Mouse(MouseInput {
                action: MouseAction::Left,
                x: 9,
                y: 4,
                scroll: 0,
                mods: Mods::empty(),
            })]
        );
    }

    #[test]
    fn sgr_mouse_release_encodes_none() {
        assert_eq!(
            events(b"\x1b[<0;1;1m"),
            vec![InputEvent::Mouse(MouseInput {
                action: MouseAction::None,
                x: 0,
                y: 0,
                scroll: 0,
                mods: Mods::empty(),
            })]
        );
    }

    #[test]
    fn sgr_mouse_wheel_scrolls_three_rows() {
        assert_eq!(
            events(b"\x1b[<64;1;1M"),
            vec![InputEvent::Mouse(MouseInput {
                action: MouseAction::Scroll,
                x: 0,
                y: 0,
                scroll: -3,
                mods: Mods::empty(),
            })]
        );
        assert_eq!(
            events(b"\x1b[<65;1;1M"),
            vec![InputEvent::Mouse(MouseInput {
                action: MouseAction::Scroll,
                x: 0,
                y: 0,
                scroll: 3,
                mods: Mods::empty(),
            })]
        );
    }

    #[test]
    fn mouse_modifier_bits() {
        assert_eq!(
            events(b"\x1b[<16;2;2M"),
            vec![InputEvent::Mouse(MouseInput {
                action: MouseAction::Left,
                x: 1,
                y: 1,
                scroll: 0,
                mods: Mods::CTRL,
            })]
        );
    }

    #[test]
    fn resize_report() {
        assert_eq!(
            events(b"\x1b[8;40;120t"),
            vec![InputEvent::Resize {
                width: 120,
                height: 40
            }]
        );
    }

    #[test]
    fn resize_clamps() {
        assert_eq!(
            events(b"\x1b[8;0;0t"),
            vec![InputEvent::Resize {
                width: 1,
                height: 1
            }]
        );
        assert_eq!(
            events(b"\x1b[8;65535;65535t"),
            vec![InputEvent::Resize {
                width: 32767,
                height: 32767
            }]
        );
    }

    #[test]
    fn unrecognised_sequences_are_dropped() {
        assert_eq!(events(b"\x1b[?1049h\x1b]0;x\x07a"), vec![InputEvent::Text("a".into())]);
    }

    #[test]
    fn flush_escape_yields_escape_key() {
        let mut classifier = Classifier::new();
        let mut pos = 0;
        assert!(classifier.next_event(b"\x1b", &mut pos).is_none());
        assert_eq!(
            classifier.flush_escape(),
            Some(InputEvent::Key(KeyInput::plain(Key::Escape)))
        );
        assert_eq!(classifier.flush_escape(), None);
    }
}
