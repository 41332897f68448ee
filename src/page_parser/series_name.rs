use std::fmt;

/// Series title with at most one trailing language tag removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesName(String);

impl SeriesName {
    /// `suffixes` are tried in priority order; the first one that ends the title
    /// on a word boundary is stripped and no further suffix is considered.
    ///
    /// Formatting twice is a no-op only for single-tagged titles: a stacked
    /// "Show ITA ITA" becomes "Show ITA", and a second pass gives "Show".
    pub fn format(raw: &str, suffixes: &[String]) -> Self {
        Self(strip_one_suffix(raw.trim(), suffixes).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn strip_one_suffix<'a>(name: &'a str, suffixes: &[String]) -> &'a str {
    for suffix in suffixes.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let Some(rest) = name.strip_suffix(suffix) else {
            continue;
        };
        let on_boundary = rest
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_alphanumeric());
        let rest = rest.trim_end();
        if on_boundary && !rest.is_empty() {
            return rest;
        }
    }
    name
}
