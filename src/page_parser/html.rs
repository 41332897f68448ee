//! Small wrappers over `scraper` queries shared by the page parsers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

pub(crate) fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// First element matching `css`, in document order.
pub(crate) fn first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel).next()
}

/// All elements matching `css`, in document order.
pub(crate) fn all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

pub(crate) fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Resolve `href` against `base`; hrefs that cannot be joined are returned as written.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    let href = href.trim();
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}
