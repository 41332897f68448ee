//! Alternate host: two hops, link discovery then token reconstruction.
//!
//! The player page hides the real URL behind a token written by an inline
//! script and a path infix kept in a hidden `<div>`. Both fragments are
//! located with whole-document patterns anchored at the start of the text;
//! the leading greedy `.*` makes the last occurrence win, which skips the
//! decoy assignments these pages put before the real one.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::html;
use crate::download::error::DownloadError;
use crate::download::models::{HostKind, ResolvedTarget, Resolution};
use crate::network_parser::SiteClient;

/// Scheme prefix the host expects; the infix supplies the second slash.
pub const URL_PREFIX: &str = "https:/";

static RE_TOKEN: OnceLock<Regex> = OnceLock::new();
static RE_INFIX: OnceLock<Regex> = OnceLock::new();
static RE_TITLE: OnceLock<Regex> = OnceLock::new();

fn re_token() -> &'static Regex {
    RE_TOKEN.get_or_init(|| {
        Regex::new(r"(?ms)\A.*document.getElementById.*\('norobotlink'\).innerHTML =.*?token=(.*?)'.*?;")
            .expect("compile RE_TOKEN")
    })
}

fn re_infix() -> &'static Regex {
    RE_INFIX.get_or_init(|| {
        Regex::new(r#"(?ms)\A.*<div id="ideoooolink" style="display:none;">(.*?token=).*?<[/]div>"#)
            .expect("compile RE_INFIX")
    })
}

fn re_title() -> &'static Regex {
    RE_TITLE.get_or_init(|| {
        Regex::new(r#"(?ms)\A.*<meta name="og:title" content="(.*?)">"#).expect("compile RE_TITLE")
    })
}

const SERVER_PARAM: &str = "server=1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerFragments {
    pub token: String,
    pub infix: String,
    pub title: String,
}

impl PlayerFragments {
    /// Byte-exact `prefix + infix + token`; the live host needs [`URL_PREFIX`].
    pub fn binary_url(&self, prefix: &str) -> String {
        format!("{prefix}{}{}", self.infix, self.token)
    }
}

/// Player page URL with the alternate-embed selector appended.
pub fn alternate_page_url(player_url: &str) -> String {
    if player_url.contains('?') {
        format!("{player_url}&{SERVER_PARAM}")
    } else {
        format!("{player_url}?{SERVER_PARAM}")
    }
}

/// First `target="_blank"` anchor with an href.
pub fn find_alternate_link(page: &str, page_url: &str) -> Option<String> {
    let doc = html::parse(page);
    html::first(&doc, r#"a[target="_blank"][href]"#)
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .map(|href| html::absolutize(page_url, href))
}

fn capture(re: &Regex, page: &str, fragment: &'static str) -> Result<String, DownloadError> {
    re.captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(DownloadError::TokenPatternMismatch { fragment })
}

pub fn parse_player_page(page: &str) -> Result<PlayerFragments, DownloadError> {
    let token = capture(re_token(), page, "token")?;
    let infix = capture(re_infix(), page, "link infix")?;
    let title = capture(re_title(), page, "title")?;
    if title.trim().is_empty() {
        return Err(DownloadError::TokenPatternMismatch { fragment: "title" });
    }
    Ok(PlayerFragments {
        token,
        infix,
        title: title.trim().to_string(),
    })
}

/// Run both hops for `player_url`, building the media URL behind `prefix`
/// (normally [`URL_PREFIX`]). Never returns `NotFound`: once the alternate
/// host is tried, any miss is a failure of the episode.
pub fn resolve(client: &SiteClient, player_url: &str, prefix: &str) -> Resolution {
    match resolve_target(client, player_url, prefix) {
        Ok(target) => Resolution::Found(target),
        Err(err) => Resolution::Error(err),
    }
}

fn resolve_target(
    client: &SiteClient,
    player_url: &str,
    prefix: &str,
) -> Result<ResolvedTarget, DownloadError> {
    let discovery_url = alternate_page_url(player_url);
    let discovery_page = client.fetch_page(&discovery_url)?;
    let alt_url = find_alternate_link(&discovery_page, &discovery_url).ok_or_else(|| {
        DownloadError::AlternateLinkNotFound {
            url: discovery_url.clone(),
        }
    })?;
    debug!(target: "resolver", "alternate player: {}", alt_url);

    let player_page = client.fetch_page(&alt_url)?;
    let fragments = parse_player_page(&player_page)?;
    Ok(ResolvedTarget {
        binary_url: fragments.binary_url(prefix),
        filename: fragments.title,
        host_kind: HostKind::Alternate,
    })
}
