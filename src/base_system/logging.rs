//! Run log: console output plus `logs/latest.log`, zipped when the run ends.
//!
//! The file layer always records DEBUG so a failed episode can be traced
//! after the fact; the console follows `--debug`.

use std::fs::{self, File};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// A log left over from an earlier run is zipped before this one starts writing.
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const LATEST: &str = "latest.log";

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("cannot install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("log file: {0}")]
    Io(#[from] io::Error),
    #[error("log archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("log timestamp: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    /// ANSI colors on the console.
    pub color: bool,
}

/// `logs/` under the data dir and the live log inside it.
#[derive(Debug, Clone)]
struct LogFiles {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogFiles {
    fn under(base_dir: Option<&Path>) -> Self {
        let dir = base_dir.map_or_else(|| PathBuf::from("logs"), |b| b.join("logs"));
        let latest = dir.join(LATEST);
        Self { dir, latest }
    }

    /// Zip `latest.log` into `log_<timestamp>.zip` and remove it.
    /// Missing or empty logs are not archived.
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let len = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            fs::remove_file(&self.latest)?;
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let target = self.dir.join(format!("log_{stamp}.zip"));

        let mut zip = zip::ZipWriter::new(File::create(&target)?);
        zip.start_file(
            format!("{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(&self.latest)?, &mut zip)?;
        zip.finish()?;
        fs::remove_file(&self.latest)?;
        Ok(Some(target))
    }

    fn rotate_if_large(&self) -> Result<(), LogError> {
        if fs::metadata(&self.latest).is_ok_and(|m| m.len() >= ROTATE_AT_BYTES) {
            self.archive()?;
        }
        Ok(())
    }
}

/// Flushes the file writer once, then archives the log.
struct Shutdown {
    files: LogFiles,
    writer: Mutex<Option<WorkerGuard>>,
    done: AtomicBool,
}

impl Shutdown {
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the guard blocks until queued lines reach the file.
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        match self.files.archive() {
            Ok(Some(path)) => eprintln!("log saved to {}", path.display()),
            Ok(None) => {}
            Err(err) => eprintln!("could not archive log: {err}"),
        }
    }
}

/// Keeps the log alive for the run; dropping it flushes and archives.
pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let files = LogFiles::under(base_dir);
        fs::create_dir_all(&files.dir)?;
        files.rotate_if_large()?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&files.dir, LATEST));

        // stderr belongs to the progress bars.
        let console = fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(options.color)
            .with_writer(io::stdout)
            .with_filter(if options.debug {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            });
        let file = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()?;

        let shutdown = Arc::new(Shutdown {
            files,
            writer: Mutex::new(Some(guard)),
            done: AtomicBool::new(false),
        });
        on_interrupt(&shutdown);
        on_panic(&shutdown);
        info!(target: "startup", "logging to {}", shutdown.files.latest.display());
        Ok(Self { shutdown })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

fn on_interrupt(shutdown: &Arc<Shutdown>) {
    let shutdown = Arc::clone(shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        warn!(target: "startup", "interrupted, stopping");
        shutdown.run();
        // 128 + SIGINT
        std::process::exit(130);
    }) {
        warn!(target: "startup", "no Ctrl-C handler: {err}");
    }
}

fn on_panic(shutdown: &Arc<Shutdown>) {
    let shutdown = Arc::clone(shutdown);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        error!("{info}");
        shutdown.run();
        previous(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn files_in(dir: &Path) -> LogFiles {
        let files = LogFiles::under(Some(dir));
        fs::create_dir_all(&files.dir).unwrap();
        files
    }

    #[test]
    fn logs_live_under_data_dir() {
        let files = LogFiles::under(Some(Path::new("/data")));
        assert_eq!(files.latest, PathBuf::from("/data/logs/latest.log"));
        assert_eq!(LogFiles::under(None).dir, PathBuf::from("logs"));
    }

    #[test]
    fn missing_or_empty_log_is_not_archived() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path());
        assert!(files.archive().unwrap().is_none());

        fs::write(&files.latest, b"").unwrap();
        assert!(files.archive().unwrap().is_none());
        assert!(!files.latest.exists());
    }

    #[test]
    fn archive_zips_and_removes_latest_log() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path());
        fs::write(&files.latest, b"Episode 2/3 failed at fetch stage\n").unwrap();

        let archived = files.archive().unwrap().unwrap();
        assert!(!files.latest.exists());
        let name = archived.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("log_") && name.ends_with(".zip"), "{name}");

        let mut zip = zip::ZipArchive::new(File::open(&archived).unwrap()).unwrap();
        let mut text = String::new();
        zip.by_index(0).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "Episode 2/3 failed at fetch stage\n");
    }

    #[test]
    fn small_log_is_kept_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let files = files_in(dir.path());
        fs::write(&files.latest, b"previous run\n").unwrap();

        files.rotate_if_large().unwrap();
        assert!(files.latest.exists());
    }
}
