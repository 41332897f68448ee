//! One series end to end: listing, destination directory, episode run.
//!
//! Listing and directory failures are fatal and come back as `Err`; episode
//! failures only show up in the returned report.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use super::orchestrator::{PoolOptions, RunReport, run_all};
use super::pipeline::EpisodePipeline;
use super::progress::ProgressObserver;
use crate::base_system::context::{Config, series_dir_under};
use crate::network_parser::SiteClient;
use crate::page_parser::listing::fetch_listing;
use crate::page_parser::series_name::SeriesName;

#[derive(Debug, Clone)]
pub struct SeriesOptions {
    pub root: PathBuf,
    pub workers: usize,
    pub render: bool,
    pub suffixes: Vec<String>,
}

impl SeriesOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.default_save_dir(),
            workers: config.max_workers,
            render: config.show_progress,
            suffixes: config.name_suffixes.clone(),
        }
    }
}

pub struct SeriesOutcome {
    pub name: SeriesName,
    pub dir: PathBuf,
    pub report: RunReport,
}

impl SeriesOutcome {
    pub fn tally_line(&self) -> String {
        let result = self.report.result;
        format!(
            "{}: {}/{} done, {} failed ({:.1}s) -> {}",
            self.name,
            result.success,
            result.total(),
            result.failed,
            self.report.elapsed.as_secs_f64(),
            self.dir.display()
        )
    }
}

pub fn download_series(
    client: &SiteClient,
    url: &str,
    opts: &SeriesOptions,
    observer: Option<ProgressObserver>,
) -> Result<SeriesOutcome> {
    download_series_with(client, url, opts, observer, |pipeline| pipeline)
}

fn download_series_with(
    client: &SiteClient,
    url: &str,
    opts: &SeriesOptions,
    observer: Option<ProgressObserver>,
    configure: impl FnOnce(EpisodePipeline) -> EpisodePipeline,
) -> Result<SeriesOutcome> {
    let listing = fetch_listing(client, url, &opts.suffixes)
        .with_context(|| format!("listing {url}"))?;
    let name = listing
        .require_name()
        .with_context(|| format!("listing {url}"))?
        .clone();

    let dir = series_dir_under(&opts.root, name.as_str());
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    info!(
        target: "download",
        "{}: {} episode(s) -> {}",
        name,
        listing.episodes.len(),
        dir.display()
    );

    let pipeline = configure(EpisodePipeline::new(client.clone(), dir.clone()));
    let report = run_all(
        &pipeline,
        name.as_str(),
        &listing.episodes,
        PoolOptions {
            workers: opts.workers,
            render: opts.render,
        },
        observer,
    );

    Ok(SeriesOutcome { name, dir, report })
}
