use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Allows one event per interval; an event exactly one interval after the last is still
/// suppressed.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) <= self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u64>,
}

impl ProgressReporter {
    fn report(&self, bytes_read: u64) {
        // Nobody listening is fine; the transfer carries on.
        let _ = self.tx.send(bytes_read);
    }
}

#[derive(Debug)]
pub struct ProgressEvents {
    rx: mpsc::UnboundedReceiver<u64>,
}

impl ProgressEvents {
    pub async fn recv(&mut self) -> Option<u64> {
        self.rx.recv().await
    }

    /// Run `callback` for every event until the reporting side is dropped.
    pub async fn forward<F>(mut self, mut callback: F)
    where
        F: FnMut(u64),
    {
        while let Some(bytes_read) = self.recv().await {
            callback(bytes_read);
        }
    }
}

pub fn progress_channel() -> (ProgressReporter, ProgressEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressReporter { tx }, ProgressEvents { rx })
}

/// Counts bytes flowing through `inner` and posts the running total, throttled, to a
/// [`ProgressEvents`] consumer.
pub struct ProgressReader<R> {
    inner: R,
    bytes_read: u64,
    throttle: Throttle,
    reporter: ProgressReporter,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, reporter: ProgressReporter) -> Self {
        Self {
            inner,
            bytes_read: 0,
            throttle: Throttle::new(PROGRESS_INTERVAL),
            reporter,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = buf.filled().len() - before;
        if read > 0 {
            this.bytes_read += read as u64;
            if this.throttle.ready(Instant::now()) {
                this.reporter.report(this.bytes_read);
            }
        }
        Poll::Ready(Ok(()))
    }
}
