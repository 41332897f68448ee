//! Series URL input: single argument or a batch file with one URL per line.

use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

static RE_URL: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://\S+").expect("compile RE_URL"))
}

/// Pull the series URL out of one line of user input.
///
/// Blank lines and `#` comments yield `None`; text pasted around the URL is dropped.
pub fn parse_series_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    re_url().find(trimmed).map(|m| m.as_str().to_string())
}

/// URLs in file order.
pub fn read_url_list(path: &Path) -> io::Result<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw.lines().filter_map(parse_series_url).collect())
}

/// Empty the batch file once every series in it has been handled.
pub fn clear_url_list(path: &Path) -> io::Result<()> {
    fs::write(path, "")
}
