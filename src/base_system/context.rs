//! Global `Config` with defaults, plus filesystem-name helpers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

pub const MAX_WORKERS_CAP: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Network
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Saving
    #[serde(default = "default_save_path")]
    pub save_path: String,
    #[serde(default = "default_name_suffixes")]
    pub name_suffixes: Vec<String>,

    // Display
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            save_path: default_save_path(),
            name_suffixes: default_name_suffixes(),
            show_progress: default_true(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 6] = [
            FieldMeta {
                name: "max_workers",
                description: "Episodes downloaded in parallel (1-8)",
            },
            FieldMeta {
                name: "request_timeout",
                description: "Seconds to wait on a connect or a silent server (downloads may run longer)",
            },
            FieldMeta {
                name: "user_agent",
                description: "User-Agent sent with every request",
            },
            FieldMeta {
                name: "save_path",
                description: "Download root; relative paths start at the working directory",
            },
            FieldMeta {
                name: "name_suffixes",
                description: "Trailing tags stripped from series names, checked in order\nat most one is removed",
            },
            FieldMeta {
                name: "show_progress",
                description: "Render progress bars in the terminal",
            },
        ];
        &FIELDS
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        self.max_workers = self.max_workers.clamp(1, MAX_WORKERS_CAP);
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        let raw = self.save_path.trim();
        if raw.is_empty() {
            return PathBuf::from(default_save_path());
        }
        PathBuf::from(raw)
    }
}

/// `<root>/<series>`, with the series name made filesystem-safe.
pub fn series_dir_under(root: &Path, series_name: &str) -> PathBuf {
    root.join(safe_fs_name(series_name, "_", 120))
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let repl = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => repl,
            c if (c as u32) < 32 => repl,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // never cut through a multi-byte char
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/117.0".to_string()
}

fn default_save_path() -> String {
    "Downloads".to_string()
}

fn default_name_suffixes() -> Vec<String> {
    vec!["Sub ITA".to_string(), "ITA".to_string()]
}
