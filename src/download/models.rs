//! Data types shared by resolvers, the episode pipeline and the orchestrator.

use std::fmt;
use std::path::PathBuf;

use super::error::DownloadError;

/// One entry of the listing page. `ordinal` is the 0-based listing position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub ordinal: usize,
    pub page_url: String,
}

impl EpisodeRef {
    /// 1-based "i/N" label used in progress rows and logs.
    pub fn label(&self, total: usize) -> String {
        format!("Episode {}/{}", self.ordinal + 1, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Primary,
    Alternate,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Primary => f.write_str("primary"),
            HostKind::Alternate => f.write_str("alternate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub binary_url: String,
    pub filename: String,
    pub host_kind: HostKind,
}

/// Outcome of one resolver. `NotFound` is the fallback trigger, not a failure.
#[derive(Debug)]
pub enum Resolution {
    Found(ResolvedTarget),
    NotFound,
    Error(DownloadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Queued,
    Resolving,
    ResolvedPrimary,
    ResolvedAlternate,
    Unresolved,
    Downloading,
    Done,
    Failed,
}

impl EpisodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EpisodeState::Done | EpisodeState::Failed)
    }

    pub(crate) fn resolved(kind: HostKind) -> Self {
        match kind {
            HostKind::Primary => EpisodeState::ResolvedPrimary,
            HostKind::Alternate => EpisodeState::ResolvedAlternate,
        }
    }
}

/// Final record for one episode after the run.
#[derive(Debug)]
pub struct EpisodeReport {
    pub episode: EpisodeRef,
    pub outcome: Result<PathBuf, DownloadError>,
}

impl EpisodeReport {
    pub fn state(&self) -> EpisodeState {
        if self.outcome.is_ok() {
            EpisodeState::Done
        } else {
            EpisodeState::Failed
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub success: u32,
    pub failed: u32,
}

impl DownloadResult {
    pub fn total(&self) -> u32 {
        self.success + self.failed
    }
}
