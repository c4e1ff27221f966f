//! VT/ANSI input plumbing: a resumable byte-stream tokenizer and the
//! classifier that turns its tokens into keyboard, mouse, text and resize
//! events.

pub mod classify;
pub mod parser;

pub use classify::{Classifier, InputEvent, Key, KeyInput, Mods, MouseAction, MouseInput};
pub use parser::{Csi, MAX_CSI_PARAMS, Parser, Token};
