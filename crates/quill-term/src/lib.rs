//! Terminal session handling and raw byte I/O.
//!
//! Raw-mode switching goes through crossterm; everything else the editor
//! says to the terminal is plain escape bytes on stdout. Entering a session
//! switches to the alternate screen and enables cell-motion mouse tracking,
//! SGR mouse encoding and bracketed paste; leaving reverses the modes and
//! restores the cursor style.

use anyhow::Result;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{Read, Write};
use tracing::debug;

/// Mode switches emitted on session entry: alternate screen, cell-motion
/// mouse, SGR mouse encoding, bracketed paste.
pub const ENTER_MODES: &str = "\x1b[?1049h\x1b[?1002h\x1b[?1006h\x1b[?2004h";
/// Inverse switches plus cursor style/visibility restoration.
pub const LEAVE_MODES: &str = "\x1b[?2004l\x1b[?1006l\x1b[?1002l\x1b[?1049l\x1b[0 q\x1b[?25h";

pub trait TerminalBackend {
    fn enter(&mut self) -> Result<()>;
    fn leave(&mut self) -> Result<()>;
}

pub struct TermSession {
    entered: bool,
}

/// RAII guard restoring the terminal even if the caller early-returns or
/// panics.
pub struct TermGuard<'a> {
    session: &'a mut TermSession,
}

impl Default for TermSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TermSession {
    pub fn new() -> Self {
        Self { entered: false }
    }

    /// Enter and return a guard that leaves on drop.
    pub fn enter_guard(&mut self) -> Result<TermGuard<'_>> {
        self.enter()?;
        Ok(TermGuard { session: self })
    }
}

impl TerminalBackend for TermSession {
    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            write_stdout(ENTER_MODES.as_bytes())?;
            self.entered = true;
            debug!(target: "term.session", "entered");
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            write_stdout(LEAVE_MODES.as_bytes())?;
            disable_raw_mode()?;
            self.entered = false;
            debug!(target: "term.session", "left");
        }
        Ok(())
    }
}

impl Drop for TermSession {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

impl Drop for TermGuard<'_> {
    fn drop(&mut self) {
        let _ = self.session.leave();
    }
}

/// Blocking stdin read; 0 bytes means EOF or an exit signal.
pub fn read_stdin(buf: &mut [u8]) -> std::io::Result<usize> {
    std::io::stdin().lock().read(buf)
}

/// Blocking full write to stdout.
pub fn write_stdout(bytes: &[u8]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(bytes)?;
    out.flush()
}

/// Current terminal size in (columns, rows).
pub fn size() -> Result<(u16, u16)> {
    Ok(crossterm::terminal::size()?)
}
