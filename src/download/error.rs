//! Failure taxonomy for listing, resolution and transfer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network error or non-2xx status while fetching an HTML page.
    #[error("page unavailable: {url}: {reason}")]
    PageUnavailable { url: String, reason: String },

    /// Listing page lacks the series-title container.
    #[error("series name not found on listing page")]
    NameNotFound,

    #[error("no alternate player link on {url}")]
    AlternateLinkNotFound { url: String },

    /// One of the alternate player page fragments did not match.
    #[error("alternate player page did not match the {fragment} pattern")]
    TokenPatternMismatch { fragment: &'static str },

    #[error("transfer failed for {url}: {reason}")]
    TransferError { url: String, reason: String },

    #[error("cannot write {path}: {source}")]
    StorageError { path: PathBuf, source: io::Error },
}

impl DownloadError {
    pub(crate) fn page_unavailable(url: &str, err: &dyn std::fmt::Display) -> Self {
        Self::PageUnavailable {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageError {
            path: path.into(),
            source,
        }
    }

    /// Short stage label used in per-episode diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::PageUnavailable { .. } | Self::NameNotFound => "fetch",
            Self::AlternateLinkNotFound { .. } | Self::TokenPatternMismatch { .. } => "alternate",
            Self::TransferError { .. } => "transfer",
            Self::StorageError { .. } => "storage",
        }
    }
}
