//! Configuration loading and parsing.
//!
//! `quill.toml` is looked up in the working directory first, then in the
//! platform config directory. Unknown fields are ignored so the format can
//! grow without breaking older files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct EditorConfig {
    /// Wrap long lines to the window width.
    #[serde(default)]
    pub word_wrap: bool,
    /// Start in overtype mode.
    #[serde(default)]
    pub overtype: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            word_wrap: false,
            overtype: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` filter when `QUILL_LOG` is unset.
    #[serde(default = "LogConfig::default_filter")]
    pub filter: String,
}

impl LogConfig {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Best-effort config path: working directory first, then the platform
/// config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("quill.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|d| d.join("quill").join("quill.toml"))
        .unwrap_or(local)
}

/// Directory for the log file.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|d| d.join("quill"))
        .unwrap_or_else(std::env::temp_dir)
}

/// Parse the file at `path` (or the discovered location). A missing file
/// yields defaults; a malformed one is an error the caller may downgrade.
pub fn load_from(path: Option<&Path>) -> Result<ConfigFile> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(discover);
    if !path.exists() {
        info!(target: "config", path = %path.display(), "no config file, using defaults");
        return Ok(ConfigFile::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: ConfigFile =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    info!(target: "config", path = %path.display(), "config loaded");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let cfg = load_from(Some(Path::new("/definitely/not/here/quill.toml"))).unwrap();
        assert!(!cfg.editor.word_wrap);
        assert_eq!(cfg.log.filter, "info");
    }

    #[test]
    fn parses_partial_file_and_ignores_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            "[editor]\nword_wrap = true\nfuture_knob = 3\n\n[log]\nfilter = \"debug\"\n",
        )
        .unwrap();
        let cfg = load_from(Some(&path)).unwrap();
        assert!(cfg.editor.word_wrap);
        assert!(!cfg.editor.overtype);
        assert_eq!(cfg.log.filter, "debug");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "editor = not toml").unwrap();
        assert!(load_from(Some(&path)).is_err());
    }
}
