//! Primary host: the media URL sits in an inline `file: "..."` player setup.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::html;
use crate::download::models::{HostKind, ResolvedTarget, Resolution};

static RE_FILE: OnceLock<Regex> = OnceLock::new();

fn re_file() -> &'static Regex {
    RE_FILE.get_or_init(|| Regex::new(r#"file:\s*"([^"]+)""#).expect("compile RE_FILE"))
}

/// Scan `<script>` bodies in document order; the first assignment wins.
pub fn find_file_url(page: &str) -> Option<String> {
    let doc = html::parse(page);
    html::all(&doc, "script").into_iter().find_map(|script| {
        let body = html::text_of(&script);
        re_file()
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|seg| !seg.is_empty())
        .map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned())
}

/// Resolve a player page already fetched from `page_url`.
///
/// No assignment, or one without a usable filename, is `NotFound` so the
/// caller can fall back to the alternate host.
pub fn resolve(page: &str, page_url: &str) -> Resolution {
    let Some(raw) = find_file_url(page) else {
        return Resolution::NotFound;
    };
    let binary_url = html::absolutize(page_url, &raw);
    match filename_from_url(&binary_url) {
        Some(filename) => Resolution::Found(ResolvedTarget {
            binary_url,
            filename,
            host_kind: HostKind::Primary,
        }),
        None => Resolution::NotFound,
    }
}
