//! Bounded worker pool running one episode pipeline per job.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use tracing::{debug, info};

use super::models::{DownloadResult, EpisodeRef, EpisodeReport};
use super::pipeline::EpisodeJob;
use super::progress::{EpisodeProgress, ProgressBoard, ProgressObserver, ProgressSnapshot};

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub workers: usize,
    pub render: bool,
}

pub struct RunReport {
    pub result: DownloadResult,
    /// In listing order.
    pub episodes: Vec<EpisodeReport>,
    pub progress: ProgressSnapshot,
    pub elapsed: Duration,
}

/// Run `job` for every episode with at most `opts.workers` in flight.
///
/// Episodes are registered (hidden) on the board before dispatch and handed
/// to workers in listing order; completion order is whatever the network
/// makes it. Failed episodes are not retried.
pub fn run_all<J: EpisodeJob>(
    job: &J,
    title: &str,
    episodes: &[EpisodeRef],
    opts: PoolOptions,
    observer: Option<ProgressObserver>,
) -> RunReport {
    let start = Instant::now();
    let total = episodes.len();
    let mut board = ProgressBoard::new(title, total, opts.render);
    if let Some(cb) = observer {
        board = board.with_observer(cb);
    }
    let board = Arc::new(board);

    let workers = opts.workers.clamp(1, total.max(1));
    let (tx, rx) = channel::unbounded::<(&EpisodeRef, EpisodeProgress)>();
    let (tx_evt, rx_evt) = channel::unbounded::<EpisodeReport>();

    for episode in episodes {
        board.register(episode);
        let _ = tx.send((episode, EpisodeProgress::new(board.clone(), episode, total)));
    }
    drop(tx);

    let mut reports: Vec<EpisodeReport> = Vec::with_capacity(total);
    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let tx_evt = tx_evt.clone();
            scope.spawn(move || {
                for (episode, handle) in rx.iter() {
                    debug!(target: "download", "{} dispatched", handle.label());
                    let outcome = job.run(episode, &handle);
                    // Jobs normally settle the row themselves; make sure it is terminal.
                    match &outcome {
                        Ok(_) => handle.complete(),
                        Err(_) => handle.fail(),
                    }
                    let _ = tx_evt.send(EpisodeReport {
                        episode: episode.clone(),
                        outcome,
                    });
                }
            });
        }
        drop(tx_evt);

        for report in rx_evt.iter() {
            reports.push(report);
        }
    });

    reports.sort_by_key(|r| r.episode.ordinal);
    let mut result = DownloadResult::default();
    for report in &reports {
        match report.outcome {
            Ok(_) => result.success += 1,
            Err(_) => result.failed += 1,
        }
    }

    let progress = board.finalize();
    let elapsed = start.elapsed();
    info!(
        target: "download",
        "run finished: {} done, {} failed, {}/{} settled in {:.1}s",
        result.success,
        result.failed,
        progress.completed,
        progress.total,
        elapsed.as_secs_f64()
    );

    RunReport {
        result,
        episodes: reports,
        progress,
        elapsed,
    }
}
