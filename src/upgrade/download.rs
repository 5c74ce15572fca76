use reqwest::blocking::Client;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

use super::error::UpgradeError;

/// Upper bound on the buffer reserved up front from the advertised size.
const PREALLOC_LIMIT: u64 = 64 << 20;

/// Capacity to reserve for a body of `size` bytes, capped by [`PREALLOC_LIMIT`].
pub(super) fn prealloc(size: u64) -> usize {
    usize::try_from(size.min(PREALLOC_LIMIT)).unwrap_or(0)
}

/// Byte counters for one download.
///
/// Written by the reading side only; the ticker thread just loads them.
#[derive(Debug)]
pub struct TransferProgress {
    transferred: AtomicU64,
    total: u64,
}

impl TransferProgress {
    pub fn new(total: u64) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total,
        }
    }

    fn add(&self, n: u64) {
        self.transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// What one progress line shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    pub total: u64,
    /// Bytes per second over the last interval; `None` before one has elapsed.
    pub speed: Option<u64>,
    /// Seconds left; `None` while speed or total is unknown.
    pub eta: Option<u64>,
    /// Set on the last snapshot of a download, success or not.
    pub finished: bool,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Progress: {}/{} KB  Speed: ",
            self.transferred / 1024,
            self.total / 1024
        )?;
        match self.speed {
            Some(bps) => write!(f, "{} KB/s", bps / 1024)?,
            None => f.write_str("unknown")?,
        }
        f.write_str("  Remain: ")?;
        match self.eta {
            Some(secs) => write!(f, "{} s", secs),
            None => f.write_str("unknown"),
        }
    }
}

/// Previous-tick sample, owned by the ticker thread.
struct Meter {
    last_count: u64,
    last_at: Instant,
}

impl Meter {
    fn new(progress: &TransferProgress) -> Self {
        Self {
            last_count: progress.transferred(),
            last_at: Instant::now(),
        }
    }

    fn initial(&self, progress: &TransferProgress) -> ProgressSnapshot {
        snapshot(progress.transferred(), progress.total(), None, false)
    }

    fn tick(&mut self, progress: &TransferProgress, finished: bool) -> ProgressSnapshot {
        let now = Instant::now();
        let count = progress.transferred();
        let elapsed = now.duration_since(self.last_at).as_secs_f64();
        let speed = if elapsed > 0.0 {
            Some((count.saturating_sub(self.last_count) as f64 / elapsed) as u64)
        } else {
            None
        };
        self.last_count = count;
        self.last_at = now;
        snapshot(count, progress.total(), speed, finished)
    }
}

fn snapshot(transferred: u64, total: u64, speed: Option<u64>, finished: bool) -> ProgressSnapshot {
    let eta = match speed {
        Some(bps) if bps > 0 && total > 0 => Some(total.saturating_sub(transferred) / bps),
        _ => None,
    };
    ProgressSnapshot {
        transferred,
        total,
        speed,
        eta,
        finished,
    }
}

/// Periodic reporter bound to a thread scope.
///
/// Dropping the guard stops the thread, which emits a final snapshot, and
/// joins it.
struct Ticker<'scope> {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope> Ticker<'scope> {
    fn start<'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        progress: &'env TransferProgress,
        interval: Duration,
        on_progress: &'env F,
    ) -> Self
    where
        F: Fn(&ProgressSnapshot) + Sync + ?Sized,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = scope.spawn(move || {
            let mut meter = Meter::new(progress);
            on_progress(&meter.initial(progress));
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => on_progress(&meter.tick(progress, false)),
                    _ => {
                        on_progress(&meter.tick(progress, true));
                        break;
                    }
                }
            }
        });
        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }
}

impl Drop for Ticker<'_> {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct CountingReader<'a, R> {
    inner: R,
    progress: &'a TransferProgress,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.add(n as u64);
        Ok(n)
    }
}

/// Streams release archives into memory.
pub struct Downloader<'a> {
    client: &'a Client,
    timeout: Duration,
    interval: Duration,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a Client, timeout: Duration, interval: Duration) -> Self {
        Self {
            client,
            timeout,
            interval,
        }
    }

    /// Fetch `url` fully into memory.
    ///
    /// `on_progress` runs on a helper thread: once at start, once per
    /// interval, and once more after the transfer ends either way.
    /// `expected_size` may be zero when the size is unknown.
    pub fn download<F>(
        &self,
        url: &str,
        expected_size: u64,
        on_progress: &F,
    ) -> Result<Vec<u8>, UpgradeError>
    where
        F: Fn(&ProgressSnapshot) + Sync + ?Sized,
    {
        let progress = TransferProgress::new(expected_size);
        thread::scope(|scope| {
            let ticker = Ticker::start(scope, &progress, self.interval, on_progress);
            let res = self.fetch(url, &progress);
            drop(ticker);
            res
        })
    }

    fn fetch(&self, url: &str, progress: &TransferProgress) -> Result<Vec<u8>, UpgradeError> {
        debug!(url, "downloading archive");
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|source| UpgradeError::Network {
                url: url.to_string(),
                source,
            })?;

        let mut buf = Vec::with_capacity(prealloc(progress.total()));
        let mut reader = CountingReader {
            inner: resp,
            progress,
        };
        reader
            .read_to_end(&mut buf)
            .map_err(|source| UpgradeError::Transfer {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = buf.len(), "download complete");
        Ok(buf)
    }
}
