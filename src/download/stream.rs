//! Single-GET streaming download into a file.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use reqwest::blocking::Response;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use super::chunk::chunk_size;
use super::error::DownloadError;
use super::progress::EpisodeProgress;
use crate::network_parser::SiteClient;

/// Per-transfer bookkeeping; lives only for one download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub bytes_expected: i64,
    pub bytes_written: u64,
    pub chunk_size: usize,
}

impl TransferState {
    fn for_response(resp: &Response) -> Self {
        let bytes_expected = content_length(resp);
        Self {
            bytes_expected,
            bytes_written: 0,
            chunk_size: chunk_size(bytes_expected),
        }
    }
}

fn content_length(resp: &Response) -> i64 {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(-1)
}

/// Download `url` into `dest`, reporting progress after every chunk.
///
/// A mid-stream failure leaves the partial file in place.
pub fn download_to_file(
    client: &SiteClient,
    url: &str,
    dest: &Path,
    progress: &EpisodeProgress,
) -> Result<TransferState, DownloadError> {
    let resp = client.open_stream(url)?;
    let state = stream_response(resp, url, dest, progress)?;
    progress.complete();
    Ok(state)
}

fn stream_response(
    mut resp: Response,
    url: &str,
    dest: &Path,
    progress: &EpisodeProgress,
) -> Result<TransferState, DownloadError> {
    let mut state = TransferState::for_response(&resp);
    debug!(
        target: "download",
        "{}: expecting {} bytes, chunk {} -> {}",
        progress.label(),
        state.bytes_expected,
        state.chunk_size,
        dest.display()
    );

    let file = File::create(dest).map_err(|e| DownloadError::storage(dest, e))?;
    let mut out = BufWriter::with_capacity(state.chunk_size, file);
    progress.begin_transfer(state.bytes_expected);

    let mut buf = vec![0u8; state.chunk_size];
    loop {
        let (n, read_err) = read_chunk(&mut resp, &mut buf);
        if n > 0 {
            out.write_all(&buf[..n])
                .map_err(|e| DownloadError::storage(dest, e))?;
            state.bytes_written += n as u64;
            progress.update(state.bytes_written);
        }
        if let Some(e) = read_err {
            // Keep what arrived before the failure on disk.
            out.flush()
                .map_err(|flush_err| DownloadError::storage(dest, flush_err))?;
            return Err(DownloadError::TransferError {
                url: url.to_string(),
                reason: format!("{e} after {} bytes", state.bytes_written),
            });
        }
        if n == 0 {
            break;
        }
    }
    out.flush().map_err(|e| DownloadError::storage(dest, e))?;

    if state.bytes_expected >= 0 && state.bytes_written < state.bytes_expected as u64 {
        return Err(DownloadError::TransferError {
            url: url.to_string(),
            reason: format!(
                "connection closed after {} of {} bytes",
                state.bytes_written, state.bytes_expected
            ),
        });
    }

    Ok(state)
}

/// Fill `buf` as far as the body allows.
///
/// Returns the bytes filled together with the read error that stopped it, if
/// any; bytes read before an error are still counted. 0 with no error is end
/// of stream.
fn read_chunk(src: &mut impl Read, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::models::{EpisodeRef, EpisodeState};
    use crate::download::progress::ProgressBoard;
    use crate::network_parser::SiteClientConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn client() -> SiteClient {
        SiteClient::new(SiteClientConfig {
            request_timeout: Duration::from_secs(5),
            user_agent: "test-agent/1.0".to_string(),
        })
        .unwrap()
    }

    fn board_with_episode() -> (Arc<ProgressBoard>, EpisodeProgress) {
        let ep = EpisodeRef {
            ordinal: 0,
            page_url: "https://example.test/ep/0".to_string(),
        };
        let board = Arc::new(ProgressBoard::new("Show", 1, false));
        board.register(&ep);
        let handle = EpisodeProgress::new(board.clone(), &ep, 1);
        (board, handle)
    }

    #[test]
    fn writes_body_and_completes_progress() {
        let body = vec![7u8; 200_000];
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/video/ep1.mp4")
            .with_status(200)
            .with_body(body.clone())
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ep1.mp4");
        let (board, handle) = board_with_episode();

        let state = download_to_file(
            &client(),
            &format!("{}/video/ep1.mp4", server.url()),
            &dest,
            &handle,
        )
        .unwrap();

        assert!(state.bytes_expected == 200_000 || state.bytes_expected == -1);
        assert_eq!(state.bytes_written, 200_000);
        assert_eq!(state.chunk_size, 64 * 1024);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        let entry = board.entry(0).unwrap();
        assert_eq!(entry.state, EpisodeState::Done);
        assert_eq!(entry.percent, 100);
        assert!(!entry.visible);
        assert_eq!(board.snapshot().completed, 1);
    }

    #[test]
    fn read_chunk_fills_across_short_reads() {
        struct Dribble(Vec<u8>);
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut src = Dribble(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        assert_eq!(read_chunk(&mut src, &mut buf).0, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_chunk(&mut src, &mut buf).0, 1);
        let (n, err) = read_chunk(&mut src, &mut buf);
        assert_eq!(n, 0);
        assert!(err.is_none());
    }

    #[test]
    fn read_chunk_keeps_bytes_before_error() {
        struct Broken(usize);
        impl Read for Broken {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 == 0 {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
                }
                let n = self.0.min(buf.len()).min(3);
                buf[..n].fill(9);
                self.0 -= n;
                Ok(n)
            }
        }

        let mut buf = [0u8; 16];
        let (n, err) = read_chunk(&mut Broken(5), &mut buf);
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], &[9; 5]);
        assert_eq!(err.unwrap().kind(), io::ErrorKind::ConnectionReset);
    }

    /// Serve one response that announces `announced` bytes, sends `sent`,
    /// stays silent for `hold`, then hangs up.
    fn truncating_server(announced: usize, sent: usize, hold: Duration) -> String {
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut req = Vec::new();
            let mut byte = [0u8; 1];
            while !req.ends_with(b"\r\n\r\n") {
                if sock.read(&mut byte).unwrap_or(0) == 0 {
                    return;
                }
                req.push(byte[0]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\nConnection: close\r\n\r\n"
            );
            let _ = sock.write_all(head.as_bytes());
            let _ = sock.write_all(&vec![5u8; sent]);
            let _ = sock.flush();
            std::thread::sleep(hold);
        });
        format!("http://{addr}/ep.mp4")
    }

    #[test]
    fn cut_off_body_keeps_partial_file() {
        let url = truncating_server(100_000, 30_000, Duration::ZERO);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ep.mp4");
        let (board, handle) = board_with_episode();

        let err = download_to_file(&client(), &url, &dest, &handle).unwrap_err();

        assert!(matches!(err, DownloadError::TransferError { .. }));
        assert_eq!(std::fs::read(&dest).unwrap(), vec![5u8; 30_000]);
        let entry = board.entry(0).unwrap();
        assert_ne!(entry.state, EpisodeState::Done);
        assert_eq!(entry.bytes_written, 30_000);
        assert_eq!(board.snapshot().completed, 0);
    }

    #[test]
    fn silent_server_times_out_mid_body() {
        let url = truncating_server(100_000, 1_000, Duration::from_secs(5));
        let quick = SiteClient::new(SiteClientConfig {
            request_timeout: Duration::from_secs(1),
            user_agent: "test-agent/1.0".to_string(),
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ep.mp4");
        let (_board, handle) = board_with_episode();

        let started = std::time::Instant::now();
        let err = download_to_file(&quick, &url, &dest, &handle).unwrap_err();

        assert!(matches!(err, DownloadError::TransferError { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(std::fs::read(&dest).unwrap().len(), 1_000);
    }

    #[test]
    fn unwritable_destination_is_storage_error() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/ep.mp4")
            .with_status(200)
            .with_body("abc")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing-dir").join("ep.mp4");
        let (board, handle) = board_with_episode();

        let err = download_to_file(
            &client(),
            &format!("{}/ep.mp4", server.url()),
            &dest,
            &handle,
        )
        .unwrap_err();
        assert!(matches!(err, DownloadError::StorageError { .. }));
        assert_eq!(board.snapshot().completed, 0);
    }

    #[test]
    fn http_failure_is_transfer_error() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/ep.mp4").with_status(503).create();

        let dir = tempfile::tempdir().unwrap();
        let (_board, handle) = board_with_episode();
        let err = download_to_file(
            &client(),
            &format!("{}/ep.mp4", server.url()),
            &dir.path().join("ep.mp4"),
            &handle,
        )
        .unwrap_err();
        assert!(matches!(err, DownloadError::TransferError { .. }));
        assert!(!dir.path().join("ep.mp4").exists());
    }
}
