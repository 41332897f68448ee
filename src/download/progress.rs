//! Shared run progress: overall counter plus one lazily shown row per episode.
//!
//! `ProgressBoard` is the single owner of progress state. Every mutation
//! (percent update, visibility flip, overall advance) happens under one mutex,
//! and the optional terminal bars are driven from inside that critical section.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;

use super::models::{EpisodeRef, EpisodeState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeEntry {
    /// 0..=100; stays 0 while the expected size is unknown.
    pub percent: u8,
    pub bytes_written: u64,
    /// -1 when the server sent no content length.
    pub bytes_expected: i64,
    pub visible: bool,
    pub state: EpisodeState,
}

impl EpisodeEntry {
    fn queued() -> Self {
        Self {
            percent: 0,
            bytes_written: 0,
            bytes_expected: -1,
            visible: false,
            state: EpisodeState::Queued,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.bytes_expected <= 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub visible: usize,
}

pub type ProgressObserver = Box<dyn FnMut(ProgressSnapshot) + Send>;

struct Bars {
    mp: MultiProgress,
    overall: ProgressBar,
    rows: HashMap<usize, ProgressBar>,
}

struct BoardState {
    completed: usize,
    total: usize,
    episodes: BTreeMap<usize, EpisodeEntry>,
    bars: Option<Bars>,
    observer: Option<ProgressObserver>,
}

impl BoardState {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            visible: self.episodes.values().filter(|e| e.visible).count(),
        }
    }

    fn emit(&mut self) {
        let snap = self.snapshot();
        if let Some(cb) = self.observer.as_mut() {
            cb(snap);
        }
    }
}

pub struct ProgressBoard {
    state: Mutex<BoardState>,
}

impl ProgressBoard {
    /// `render` draws bars on stderr; tests and embedders pass `false`.
    pub fn new(title: &str, total: usize, render: bool) -> Self {
        let bars = render.then(|| {
            let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            let overall = mp.add(ProgressBar::new(total as u64));
            overall.set_style(style);
            overall.set_prefix(title.to_string());
            Bars {
                mp,
                overall,
                rows: HashMap::new(),
            }
        });

        Self {
            state: Mutex::new(BoardState {
                completed: 0,
                total,
                episodes: BTreeMap::new(),
                bars,
                observer: None,
            }),
        }
    }

    /// The observer runs while the board is locked and must not call back into it.
    pub fn with_observer(self, observer: ProgressObserver) -> Self {
        self.lock().observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // A panicking worker must not freeze the whole board.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a hidden, queued row for `episode`.
    pub fn register(&self, episode: &EpisodeRef) {
        self.lock()
            .episodes
            .insert(episode.ordinal, EpisodeEntry::queued());
    }

    pub fn set_state(&self, ordinal: usize, state: EpisodeState) {
        let mut st = self.lock();
        if let Some(entry) = st.episodes.get_mut(&ordinal)
            && !entry.state.is_terminal()
        {
            entry.state = state;
        }
    }

    fn begin_transfer(&self, ordinal: usize, expected: i64) {
        let mut st = self.lock();
        if let Some(entry) = st.episodes.get_mut(&ordinal) {
            entry.state = EpisodeState::Downloading;
            entry.bytes_expected = expected;
            entry.bytes_written = 0;
            entry.percent = 0;
        }
    }

    fn record_bytes(&self, ordinal: usize, label: &str, written: u64) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let Some(entry) = st.episodes.get_mut(&ordinal) else {
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        entry.bytes_written = written;
        if entry.bytes_expected > 0 {
            let pct = (written as f64 / entry.bytes_expected as f64) * 100.0;
            entry.percent = pct.clamp(0.0, 100.0) as u8;
        }

        let became_visible = !entry.visible && written > 0;
        if became_visible {
            entry.visible = true;
        }
        let entry = *entry;

        if let Some(bars) = st.bars.as_mut() {
            if became_visible {
                let bar = bars.mp.add(new_row(label, &entry));
                bars.rows.insert(ordinal, bar);
            }
            if let Some(bar) = bars.rows.get(&ordinal) {
                if entry.is_indeterminate() {
                    bar.set_position(written);
                } else {
                    bar.set_position(entry.percent as u64);
                }
            }
        }

        if became_visible {
            st.emit();
        }
    }

    /// Move an episode to a terminal state; the overall counter advances once per episode.
    fn finish(&self, ordinal: usize, state: EpisodeState) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let Some(entry) = st.episodes.get_mut(&ordinal) else {
            warn!(target: "progress", "finish for unregistered episode {}", ordinal);
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        entry.state = state;
        entry.visible = false;
        if state == EpisodeState::Done {
            entry.percent = 100;
        }

        if let Some(bars) = st.bars.as_mut() {
            if let Some(bar) = bars.rows.remove(&ordinal) {
                bar.finish_and_clear();
            }
            bars.overall.inc(1);
        }
        st.completed = (st.completed + 1).min(st.total);
        st.emit();
    }

    pub fn entry(&self, ordinal: usize) -> Option<EpisodeEntry> {
        self.lock().episodes.get(&ordinal).copied()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    /// Tear down the bars and return the final tally.
    pub fn finalize(&self) -> ProgressSnapshot {
        let mut st = self.lock();
        if let Some(bars) = st.bars.take() {
            for (_, bar) in bars.rows {
                bar.finish_and_clear();
            }
            bars.overall.finish();
        }
        st.snapshot()
    }
}

fn new_row(label: &str, entry: &EpisodeEntry) -> ProgressBar {
    let bar = if entry.is_indeterminate() {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{prefix} {spinner} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar
    } else {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{prefix} {bar:40} {pos:>3}% ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar
    };
    bar.set_prefix(label.to_string());
    bar
}

/// One episode's view of the board, handed to the pipeline and downloader.
#[derive(Clone)]
pub struct EpisodeProgress {
    board: Arc<ProgressBoard>,
    ordinal: usize,
    label: String,
}

impl EpisodeProgress {
    pub fn new(board: Arc<ProgressBoard>, episode: &EpisodeRef, total: usize) -> Self {
        Self {
            board,
            ordinal: episode.ordinal,
            label: episode.label(total),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_state(&self, state: EpisodeState) {
        self.board.set_state(self.ordinal, state);
    }

    pub fn begin_transfer(&self, expected: i64) {
        self.board.begin_transfer(self.ordinal, expected);
    }

    /// Report the running byte total; the first non-zero report makes the row visible.
    pub fn update(&self, written: u64) {
        self.board.record_bytes(self.ordinal, &self.label, written);
    }

    pub fn complete(&self) {
        self.board.finish(self.ordinal, EpisodeState::Done);
    }

    pub fn fail(&self) {
        self.board.finish(self.ordinal, EpisodeState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(ordinal: usize) -> EpisodeRef {
        EpisodeRef {
            ordinal,
            page_url: format!("https://example.test/ep/{ordinal}"),
        }
    }

    #[test]
    fn row_stays_hidden_until_first_byte() {
        let board = Arc::new(ProgressBoard::new("Show", 1, false));
        board.register(&ep(0));
        let handle = EpisodeProgress::new(board.clone(), &ep(0), 1);

        assert!(!board.entry(0).unwrap().visible);
        handle.begin_transfer(1000);
        assert!(!board.entry(0).unwrap().visible);
        assert_eq!(board.entry(0).unwrap().state, EpisodeState::Downloading);

        handle.update(250);
        let entry = board.entry(0).unwrap();
        assert!(entry.visible);
        assert_eq!(entry.percent, 25);
    }

    #[test]
    fn complete_hides_row_and_advances_once() {
        let board = Arc::new(ProgressBoard::new("Show", 2, false));
        board.register(&ep(0));
        let handle = EpisodeProgress::new(board.clone(), &ep(0), 2);
        handle.begin_transfer(10);
        handle.update(10);
        handle.complete();
        handle.complete();
        handle.fail();

        let entry = board.entry(0).unwrap();
        assert_eq!(entry.state, EpisodeState::Done);
        assert_eq!(entry.percent, 100);
        assert!(!entry.visible);
        assert_eq!(board.snapshot().completed, 1);
    }

    #[test]
    fn unknown_length_keeps_percent_at_zero() {
        let board = Arc::new(ProgressBoard::new("Show", 1, false));
        board.register(&ep(0));
        let handle = EpisodeProgress::new(board.clone(), &ep(0), 1);
        handle.begin_transfer(-1);
        handle.update(4096);

        let entry = board.entry(0).unwrap();
        assert!(entry.is_indeterminate());
        assert_eq!(entry.percent, 0);
        assert_eq!(entry.bytes_written, 4096);
        assert!(entry.visible);
    }

    #[test]
    fn percent_is_capped_when_server_under_reports() {
        let board = Arc::new(ProgressBoard::new("Show", 1, false));
        board.register(&ep(0));
        let handle = EpisodeProgress::new(board.clone(), &ep(0), 1);
        handle.begin_transfer(100);
        handle.update(150);
        assert_eq!(board.entry(0).unwrap().percent, 100);
    }

    #[test]
    fn observer_sees_each_overall_step() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let board = Arc::new(
            ProgressBoard::new("Show", 2, false).with_observer(Box::new(move |snap| {
                sink.lock().unwrap().push(snap.completed);
            })),
        );
        for i in 0..2 {
            board.register(&ep(i));
        }
        EpisodeProgress::new(board.clone(), &ep(1), 2).fail();
        EpisodeProgress::new(board.clone(), &ep(0), 2).complete();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(board.finalize().completed, 2);
    }
}
