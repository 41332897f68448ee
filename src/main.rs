//! Episode downloader: resolves a series listing page into episode media files.
//!
//! Code layout:
//! - `base_system`: config, logging, input URLs, filesystem naming
//! - `network_parser`: shared blocking HTTP client
//! - `page_parser`: listing page and primary/alternate host extraction
//! - `download`: per-episode pipeline, worker pool, progress, streaming to disk

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

mod base_system;
mod download;
mod network_parser;
mod page_parser;

use base_system::config::load_or_create;
use base_system::context::{Config, MAX_WORKERS_CAP};
use base_system::logging::{LogOptions, LogSystem};
use base_system::series_url::{clear_url_list, parse_series_url, read_url_list};
use download::series::{SeriesOptions, download_series};
use network_parser::{SiteClient, SiteClientConfig};
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "episode-downloader", version)]
#[command(about = "Download every episode of a series listing page")]
struct Cli {
    /// Series listing page URL
    url: Option<String>,

    /// Batch file with one listing URL per line; emptied after a successful run
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,

    /// Parallel episode downloads (overrides max_workers)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Directory holding config.yml and logs/
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug output on the console
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Do not draw progress bars
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

enum Source {
    Single(String),
    Batch(PathBuf),
}

impl Cli {
    fn source(&self) -> Result<Source> {
        match (&self.url, &self.from_file) {
            (Some(_), Some(_)) => bail!("give either a URL or --from-file, not both"),
            (None, None) => bail!("missing series URL (or --from-file PATH)"),
            (Some(raw), None) => parse_series_url(raw)
                .map(Source::Single)
                .ok_or_else(|| anyhow!("not a URL: {raw}")),
            (None, Some(path)) => Ok(Source::Batch(path.clone())),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let source = cli.source()?;

    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "episode-downloader v{}", VERSION);

    let mut config =
        load_or_create::<Config>(data_dir).context("load config.yml")?;
    if let Some(workers) = cli.workers {
        config.max_workers = workers.clamp(1, MAX_WORKERS_CAP);
    }
    if cli.no_progress {
        config.show_progress = false;
    }

    let client = SiteClient::new(SiteClientConfig::from_config(&config))?;
    let opts = SeriesOptions::from_config(&config);

    match source {
        Source::Single(url) => run_series(&client, &url, &opts),
        Source::Batch(path) => run_batch(&client, &path, &opts),
    }
}

fn run_series(client: &SiteClient, url: &str, opts: &SeriesOptions) -> Result<()> {
    let outcome = download_series(client, url, opts, None)?;
    println!("{}", outcome.tally_line());
    let total = outcome.report.episodes.len();
    for report in &outcome.report.episodes {
        if let Err(err) = &report.outcome {
            println!("  {} failed: {}", report.episode.label(total), err);
        }
    }
    Ok(())
}

fn run_batch(client: &SiteClient, path: &Path, opts: &SeriesOptions) -> Result<()> {
    let urls = read_url_list(path).with_context(|| format!("read {}", path.display()))?;
    if urls.is_empty() {
        warn!(target: "startup", "{} has no series URLs", path.display());
        return Ok(());
    }

    for (idx, url) in urls.iter().enumerate() {
        info!(target: "startup", "series {}/{}: {}", idx + 1, urls.len(), url);
        run_series(client, url, opts)?;
    }

    clear_url_list(path).with_context(|| format!("clear {}", path.display()))?;
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        color: io::stdout().is_terminal(),
    };
    LogSystem::init(opts, base_dir).context("init logging")
}
