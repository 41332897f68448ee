use reqwest::blocking::{Client, Response};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue, USER_AGENT,
};
use std::time::Duration;
use tracing::debug;

use crate::base_system::context::Config;
use crate::download::error::DownloadError;

#[derive(Debug, Clone)]
pub(crate) struct SiteClientConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl SiteClientConfig {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout.max(1)),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Blocking HTTP client shared by every worker.
///
/// Both clients use `request_timeout` for connecting and for each wait on the
/// server (response head, then every body read). A download is only cut off
/// when the server goes quiet for that long, never for its total length.
#[derive(Clone)]
pub(crate) struct SiteClient {
    pages: Client,
    downloads: Client,
}

impl SiteClient {
    pub(crate) fn new(config: SiteClientConfig) -> anyhow::Result<Self> {
        let ua = HeaderValue::from_str(&config.user_agent)
            .unwrap_or(HeaderValue::from_static("Mozilla/5.0"));

        let mut page_headers = HeaderMap::new();
        page_headers.insert(USER_AGENT, ua.clone());
        page_headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        // reqwest is built without gzip; ask for plain bodies.
        page_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let pages = Client::builder()
            .default_headers(page_headers)
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;

        let mut download_headers = HeaderMap::new();
        download_headers.insert(USER_AGENT, ua);
        download_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        download_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        download_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let downloads = Client::builder()
            .default_headers(download_headers)
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { pages, downloads })
    }

    /// GET an HTML page. Any network error or non-2xx status is `PageUnavailable`.
    pub(crate) fn fetch_page(&self, url: &str) -> Result<String, DownloadError> {
        debug!(target: "network", "GET {}", url);
        let resp = self
            .pages
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| DownloadError::page_unavailable(url, &e))?;

        resp.text()
            .map_err(|e| DownloadError::page_unavailable(url, &e))
    }

    /// Open a streaming GET for a binary payload.
    pub(crate) fn open_stream(&self, url: &str) -> Result<Response, DownloadError> {
        debug!(target: "network", "GET (stream) {}", url);
        self.downloads
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| DownloadError::TransferError {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SiteClient {
        SiteClient::new(SiteClientConfig {
            request_timeout: Duration::from_secs(5),
            user_agent: "test-agent/1.0".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn fetch_page_sends_user_agent() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/series")
            .match_header("user-agent", "test-agent/1.0")
            .with_status(200)
            .with_body("<html></html>")
            .create();

        let body = client()
            .fetch_page(&format!("{}/series", server.url()))
            .unwrap();
        assert_eq!(body, "<html></html>");
        mock.assert();
    }

    #[test]
    fn non_success_status_is_page_unavailable() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/gone").with_status(404).create();

        let err = client()
            .fetch_page(&format!("{}/gone", server.url()))
            .unwrap_err();
        assert!(matches!(err, DownloadError::PageUnavailable { .. }));
    }

    #[test]
    fn open_stream_maps_failures_to_transfer_error() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/missing.mp4").with_status(500).create();
        let err = client()
            .open_stream(&format!("{}/missing.mp4", server.url()))
            .unwrap_err();
        assert!(matches!(err, DownloadError::TransferError { .. }));
    }

    #[test]
    fn open_stream_sends_user_agent() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/ep1.mp4")
            .match_header("user-agent", "test-agent/1.0")
            .with_status(200)
            .with_body("data")
            .create();

        let resp = client()
            .open_stream(&format!("{}/ep1.mp4", server.url()))
            .unwrap();
        assert!(resp.status().is_success());
        mock.assert();
    }
}
