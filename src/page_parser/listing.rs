//! Series listing page: title and ordered episode links.

use tracing::{debug, info};

use super::html;
use super::series_name::SeriesName;
use crate::download::error::DownloadError;
use crate::download::models::EpisodeRef;
use crate::network_parser::SiteClient;

const TITLE_CONTAINER: &str = "div.container.hentai-title-as";
const EPISODE_ANCHOR: &str = r#"a.bottone-ep[target="_blank"][href]"#;

#[derive(Debug, Clone)]
pub struct Listing {
    /// `None` when the title container is missing.
    pub series_name: Option<SeriesName>,
    pub episodes: Vec<EpisodeRef>,
}

impl Listing {
    pub fn require_name(&self) -> Result<&SeriesName, DownloadError> {
        self.series_name.as_ref().ok_or(DownloadError::NameNotFound)
    }
}

/// Fetch and parse a listing page. Only a failed fetch is an error here;
/// a missing title is reported through [`Listing::require_name`].
pub fn fetch_listing(
    client: &SiteClient,
    url: &str,
    suffixes: &[String],
) -> Result<Listing, DownloadError> {
    let page = client.fetch_page(url)?;
    let listing = parse_listing(&page, url, suffixes);
    info!(
        target: "listing",
        "{}: {} episode(s)",
        listing
            .series_name
            .as_ref()
            .map(SeriesName::as_str)
            .unwrap_or("<untitled>"),
        listing.episodes.len()
    );
    Ok(listing)
}

pub fn parse_listing(page: &str, page_url: &str, suffixes: &[String]) -> Listing {
    let doc = html::parse(page);

    let series_name = html::first(&doc, TITLE_CONTAINER)
        .and_then(|container| {
            let sel = scraper::Selector::parse("b").ok()?;
            container.select(&sel).next().map(|b| html::text_of(&b))
        })
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| SeriesName::format(&raw, suffixes));

    let episodes: Vec<EpisodeRef> = html::all(&doc, EPISODE_ANCHOR)
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .enumerate()
        .map(|(ordinal, href)| EpisodeRef {
            ordinal,
            page_url: html::absolutize(page_url, href),
        })
        .collect();

    debug!(target: "listing", "parsed {} episode anchor(s)", episodes.len());
    Listing {
        series_name,
        episodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <div class="container hentai-title-as mb-3 w-100"><b>Kimi no Show Sub ITA</b></div>
  <a class="btn btn-dark mb-1 bottone-ep" target="_blank" href="https://site.test/ep/show-ep-1">1</a>
  <a class="btn btn-dark mb-1 bottone-ep" href="https://site.test/ep/not-blank">x</a>
  <a class="btn btn-dark mb-1" target="_blank" href="https://site.test/ep/no-marker">x</a>
  <a class="btn btn-dark mb-1 bottone-ep" target="_blank">no href</a>
  <a class="btn btn-dark mb-1 bottone-ep" target="_blank" href="/ep/show-ep-2">2</a>
</body></html>
"#;

    fn suffixes() -> Vec<String> {
        vec!["Sub ITA".to_string(), "ITA".to_string()]
    }

    #[test]
    fn extracts_name_and_ordered_episodes() {
        let listing = parse_listing(PAGE, "https://site.test/anime/show", &suffixes());
        assert_eq!(listing.require_name().unwrap().as_str(), "Kimi no Show");
        assert_eq!(
            listing.episodes,
            vec![
                EpisodeRef {
                    ordinal: 0,
                    page_url: "https://site.test/ep/show-ep-1".to_string(),
                },
                EpisodeRef {
                    ordinal: 1,
                    page_url: "https://site.test/ep/show-ep-2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn missing_title_still_yields_episodes() {
        let page = r#"<a class="bottone-ep" target="_blank" href="https://site.test/ep/1">1</a>"#;
        let listing = parse_listing(page, "https://site.test/anime/show", &suffixes());
        assert!(matches!(
            listing.require_name(),
            Err(DownloadError::NameNotFound)
        ));
        assert_eq!(listing.episodes.len(), 1);
    }

    #[test]
    fn empty_page_has_no_episodes() {
        let listing = parse_listing("<html></html>", "https://site.test/", &suffixes());
        assert!(listing.series_name.is_none());
        assert!(listing.episodes.is_empty());
    }
}
