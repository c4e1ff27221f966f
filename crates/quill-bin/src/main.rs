//! Quill entrypoint: the single-threaded frame loop.
//!
//! One iteration: block on stdin, drain the classifier into a batch of
//! input events, rebuild the UI once per event, and flush the renderer's
//! ANSI output only for the last event of the batch. Everything else —
//! editing, layout, diffing — lives in the library crates.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use unicode_normalization::UnicodeNormalization;

use quill_config::ConfigFile;
use quill_term::TermSession;
use quill_text::TextBuffer;
use quill_tui::{Ctx, FloatSpec, Size};
use quill_vt::{Classifier, InputEvent, Key, KeyInput};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Quill text editor")]
struct Args {
    /// Path to open at startup (UTF-8 text). Absent means an empty buffer.
    pub path: Option<PathBuf>,
    /// Configuration file path (overrides discovery of `quill.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Enable word wrap regardless of the config file.
    #[arg(long = "wrap")]
    pub wrap: bool,
}

struct App {
    tb: TextBuffer,
    path: Option<PathBuf>,
    wrap: bool,
    exit: bool,
    quit_modal: bool,
    status_msg: Option<String>,
}

impl App {
    fn new(args: &Args, cfg: &ConfigFile) -> Self {
        let mut tb = TextBuffer::new();
        if let Some(path) = &args.path {
            if !tb.read_file(path) {
                info!(target: "runtime.loop", path = %path.display(), "new file");
            }
        }
        tb.set_overtype(cfg.editor.overtype);
        Self {
            tb,
            path: args.path.clone(),
            wrap: cfg.editor.word_wrap || args.wrap,
            exit: false,
            quit_modal: false,
            status_msg: None,
        }
    }

    fn save(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            self.status_msg = Some("no file name".to_string());
            return false;
        };
        match self.tb.write_file(&path) {
            Ok(()) => {
                self.status_msg = Some(format!("saved {}", path.display()));
                true
            }
            Err(err) => {
                error!(target: "runtime.loop", %err, "save failed");
                self.status_msg = Some(err.to_string());
                false
            }
        }
    }

    fn request_quit(&mut self) {
        if self.tb.is_dirty() {
            self.quit_modal = true;
        } else {
            self.exit = true;
        }
    }

    fn toggle_wrap(&mut self, width: i32) {
        self.wrap = !self.wrap;
        if self.wrap {
            self.tb.set_wrap(Some(width.max(1) as u16));
        } else {
            self.tb.set_wrap(None);
        }
    }
}

fn init_tracing(cfg: &ConfigFile) -> Option<WorkerGuard> {
    let dir = quill_config::state_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let appender = tracing_appender::rolling::never(dir, "quill.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env("QUILL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(cfg.log.filter.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = match quill_config::load_from(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("quill: {err:#}");
            ConfigFile::default()
        }
    };
    let _log_guard = init_tracing(&cfg);
    let mut app = App::new(&args, &cfg);

    let mut session = TermSession::new();
    let _term = session.enter_guard()?;
    let (cols, rows) = quill_term::size()?;
    let mut ctx = Ctx::new(Size::new(i32::from(cols), i32::from(rows)));
    if app.wrap {
        app.tb.set_wrap(Some(cols.max(1)));
    }

    let mut classifier = Classifier::new();
    let mut buf = [0u8; 4096];

    // First frame establishes the retained rects.
    ctx.frame_begin(None);
    build_ui(&mut ctx, &mut app);
    quill_term::write_stdout(ctx.render().as_bytes())?;

    'frames: loop {
        let n = quill_term::read_stdin(&mut buf)?;
        if n == 0 {
            info!(target: "runtime.loop", "stdin closed");
            break;
        }
        let mut pos = 0usize;
        let mut events = Vec::new();
        while let Some(ev) = classifier.next_event(&buf[..n], &mut pos) {
            events.push(normalize_text(ev));
        }
        // A read that ends right after a bare ESC is an Escape keypress.
        if let Some(ev) = classifier.flush_escape() {
            events.push(ev);
        }
        if events.is_empty() {
            continue;
        }
        let last = events.len() - 1;
        for (i, ev) in events.iter().enumerate() {
            ctx.frame_begin(Some(ev));
            build_ui(&mut ctx, &mut app);
            if i == last {
                quill_term::write_stdout(ctx.render().as_bytes())?;
            } else {
                ctx.finalize();
            }
            if app.exit {
                break 'frames;
            }
        }
    }
    Ok(())
}

/// Committed text is NFC-normalized before it reaches the store.
fn normalize_text(ev: InputEvent) -> InputEvent {
    match ev {
        InputEvent::Text(t) => InputEvent::Text(t.nfc().collect()),
        other => other,
    }
}

fn build_ui(ctx: &mut Ctx, app: &mut App) {
    let size = ctx.size();
    ctx.container_begin("app");

    if ctx.consume_shortcut(KeyInput::ctrl(Key::Char('S'))) {
        app.save();
    }
    if ctx.consume_shortcut(KeyInput::ctrl(Key::Char('Q'))) {
        app.request_quit();
    }
    if ctx.consume_shortcut(KeyInput::ctrl(Key::Char('Z'))) {
        app.tb.undo();
    }
    if ctx.consume_shortcut(KeyInput::ctrl(Key::Char('Y'))) {
        app.tb.redo();
    }
    if ctx.consume_shortcut(KeyInput::ctrl(Key::Char('W'))) {
        app.toggle_wrap(size.width);
    }

    ctx.menubar_begin();
    if ctx.menu_begin("file", "File") {
        if ctx.menu_item("save", "Save    Ctrl+S") {
            app.save();
        }
        if ctx.menu_item("exit", "Exit    Ctrl+Q") {
            app.request_quit();
        }
        ctx.menu_end();
    }
    if ctx.menu_begin("edit", "Edit") {
        if ctx.menu_item("undo", "Undo    Ctrl+Z") {
            app.tb.undo();
        }
        if ctx.menu_item("redo", "Redo    Ctrl+Y") {
            app.tb.redo();
        }
        if ctx.menu_item("wrap", "Wrap    Ctrl+W") {
            app.toggle_wrap(size.width);
        }
        ctx.menu_end();
    }
    ctx.menubar_end();

    let doc_id = ctx.textarea("doc", &mut app.tb);
    ctx.attr_intrinsic(Size::new(size.width, (size.height - 2).max(0)));
    if ctx.focus() == 0 {
        ctx.set_focus(doc_id);
    }

    let status = status_line(app);
    ctx.label("status", &status);
    ctx.attr_intrinsic(Size::new(size.width, 1));
    let bar_bg = ctx.indexed(7);
    let bar_fg = ctx.indexed(0);
    ctx.attr_background(bar_bg);
    ctx.attr_foreground(bar_fg);

    if app.quit_modal {
        build_quit_modal(ctx, app, size);
    }

    ctx.container_end();
}

fn status_line(app: &App) -> String {
    let cursor = app.tb.cursor();
    let name = app
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "[untitled]".to_string());
    let dirty = if app.tb.is_dirty() { "*" } else { " " };
    let mode = if app.tb.overtype() { "OVR" } else { "INS" };
    let extra = app.status_msg.as_deref().unwrap_or("");
    format!(
        " {name}{dirty}  Ln {}, Col {}  {mode}  {extra}",
        cursor.logical.y + 1,
        cursor.logical.x + 1,
    )
}

fn build_quit_modal(ctx: &mut Ctx, app: &mut App, size: Size) {
    ctx.container_begin("quit-modal");
    ctx.attr_border();
    let bg = ctx.indexed(7);
    let fg = ctx.indexed(0);
    ctx.attr_background(bg);
    ctx.attr_foreground(fg);
    ctx.attr_float(FloatSpec {
        gravity_x: 0.5,
        gravity_y: 0.5,
        offset_x: size.width / 2,
        offset_y: size.height / 2,
    });
    ctx.label("prompt", "Unsaved changes. Save before exiting?");
    ctx.container_begin("choices");
    ctx.attr_columns(&[0, 0, 0]);
    if ctx.button("save-exit", "Save & Exit") {
        if app.save() {
            app.exit = true;
        }
        app.quit_modal = false;
    }
    if ctx.button("discard", "Discard") {
        app.exit = true;
    }
    if ctx.button("cancel", "Cancel") {
        app.quit_modal = false;
    }
    ctx.container_end();
    ctx.container_end();

    if ctx.consume_shortcut(KeyInput::plain(Key::Escape)) {
        app.quit_modal = false;
    }
}
