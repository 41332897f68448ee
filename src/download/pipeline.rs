//! Per-episode flow: entry page -> player page -> primary / alternate -> download.
//!
//! States: Queued -> Resolving -> {ResolvedPrimary | ResolvedAlternate | Unresolved}
//! -> Downloading -> {Done | Failed}. Every error is caught here; nothing
//! escapes to the orchestrator.

use std::path::PathBuf;

use tracing::{error, info, warn};

use super::error::DownloadError;
use super::models::{EpisodeRef, EpisodeState, ResolvedTarget, Resolution};
use super::progress::EpisodeProgress;
use super::stream::download_to_file;
use crate::base_system::context::safe_fs_name;
use crate::network_parser::SiteClient;
use crate::page_parser::{alternate, html, primary};

/// "Watch" button on an episode page that leads to the player page.
const WATCH_ANCHOR: &str = "a.btn-light.font-weight-bold[href]";

/// Work done for one episode by a pool worker.
pub trait EpisodeJob: Send + Sync {
    fn run(&self, episode: &EpisodeRef, progress: &EpisodeProgress) -> Result<PathBuf, DownloadError>;
}

pub struct EpisodePipeline {
    client: SiteClient,
    dest_dir: PathBuf,
    alternate_prefix: &'static str,
}

impl EpisodePipeline {
    pub fn new(client: SiteClient, dest_dir: PathBuf) -> Self {
        Self {
            client,
            dest_dir,
            alternate_prefix: alternate::URL_PREFIX,
        }
    }

    /// Mock servers speak plain http.
    #[cfg(test)]
    pub(crate) fn with_alternate_prefix(mut self, prefix: &'static str) -> Self {
        self.alternate_prefix = prefix;
        self
    }

    /// Fetch the episode page and follow its watch button when there is one.
    fn open_player(&self, episode: &EpisodeRef) -> Result<(String, String), DownloadError> {
        let page = self.client.fetch_page(&episode.page_url)?;
        let watch = {
            let doc = html::parse(&page);
            html::first(&doc, WATCH_ANCHOR)
                .and_then(|a| a.value().attr("href"))
                .filter(|href| !href.trim().is_empty())
                .map(|href| html::absolutize(&episode.page_url, href))
        };
        match watch {
            Some(player_url) if player_url != episode.page_url => {
                let player_page = self.client.fetch_page(&player_url)?;
                Ok((player_url, player_page))
            }
            _ => Ok((episode.page_url.clone(), page)),
        }
    }

    fn resolve(
        &self,
        episode: &EpisodeRef,
        progress: &EpisodeProgress,
    ) -> Result<ResolvedTarget, DownloadError> {
        progress.set_state(EpisodeState::Resolving);
        let (player_url, player_page) = self.open_player(episode)?;

        let resolution = match primary::resolve(&player_page, &player_url) {
            Resolution::NotFound => {
                info!(
                    target: "resolver",
                    "{}: no inline link, trying alternate host",
                    progress.label()
                );
                alternate::resolve(&self.client, &player_url, self.alternate_prefix)
            }
            found_or_error => found_or_error,
        };

        match resolution {
            Resolution::Found(target) => {
                progress.set_state(EpisodeState::resolved(target.host_kind));
                Ok(target)
            }
            Resolution::Error(err) => {
                progress.set_state(EpisodeState::Unresolved);
                Err(err)
            }
            Resolution::NotFound => {
                progress.set_state(EpisodeState::Unresolved);
                Err(DownloadError::AlternateLinkNotFound { url: player_url })
            }
        }
    }

    fn run_inner(
        &self,
        episode: &EpisodeRef,
        progress: &EpisodeProgress,
    ) -> Result<PathBuf, DownloadError> {
        let target = self.resolve(episode, progress)?;
        let dest = self.dest_dir.join(safe_fs_name(&target.filename, "_", 200));
        info!(
            target: "download",
            "{}: {} host -> {}",
            progress.label(),
            target.host_kind,
            dest.display()
        );
        if dest.exists() {
            warn!(target: "download", "{}: overwriting {}", progress.label(), dest.display());
        }

        progress.set_state(EpisodeState::Downloading);
        download_to_file(&self.client, &target.binary_url, &dest, progress)?;
        Ok(dest)
    }
}

impl EpisodeJob for EpisodePipeline {
    fn run(&self, episode: &EpisodeRef, progress: &EpisodeProgress) -> Result<PathBuf, DownloadError> {
        match self.run_inner(episode, progress) {
            Ok(path) => Ok(path),
            Err(err) => {
                error!(
                    target: "download",
                    "{} failed at {} stage ({}): {}",
                    progress.label(),
                    err.stage(),
                    episode.page_url,
                    err
                );
                progress.fail();
                Err(err)
            }
        }
    }
}
