use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::error::DownloadError;

pub mod destination;
pub mod dispatch;
pub mod progress;
pub mod subject;

use dispatch::ActionDispatcher;
use progress::{ProgressReader, ProgressReporter};
use subject::DownloadSubject;

pub type ArtifactReader = Pin<Box<dyn AsyncRead + Send>>;

/// Opens the byte stream behind a download URL, with its length when known.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn open(&self, url: &str) -> io::Result<(ArtifactReader, Option<u64>)>;
}

pub struct DownloadService {
    source: Arc<dyn ArtifactSource>,
    cache_dir: PathBuf,
    dispatcher: ActionDispatcher,
}

/// Handle to a transfer running in the background.
pub struct DownloadTask {
    handle: JoinHandle<Result<PathBuf, DownloadError>>,
    partial: PathBuf,
}

impl DownloadTask {
    /// Drops the in-flight transfer; no terminal action runs afterwards.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub async fn wait(self) -> Result<PathBuf, DownloadError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => {
                remove_partial(&self.partial).await;
                Err(DownloadError::Transfer(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "download aborted",
                )))
            }
            Err(err) => Err(DownloadError::Transfer(io::Error::other(err))),
        }
    }
}

impl DownloadService {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        cache_dir: impl Into<PathBuf>,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            source,
            cache_dir: cache_dir.into(),
            dispatcher,
        }
    }

    /// Spawn the transfer on the runtime; the caller is not blocked.
    pub fn start(
        self: &Arc<Self>,
        subject: DownloadSubject,
        reporter: ProgressReporter,
    ) -> DownloadTask {
        let service = Arc::clone(self);
        let partial = self.cache_dir.join(subject.file_name());
        DownloadTask {
            handle: tokio::spawn(async move { service.run(subject, reporter).await }),
            partial,
        }
    }

    /// Download `subject` into the cache and run its terminal action once the file is
    /// completely written. Returns the cache path the bytes were written to.
    pub async fn run(
        &self,
        subject: DownloadSubject,
        reporter: ProgressReporter,
    ) -> Result<PathBuf, DownloadError> {
        let file = self.cache_dir.join(subject.file_name());
        info!("download: {} from {}", subject.file_name(), subject.url());

        match self.transfer(subject.url(), &file, reporter).await {
            Ok(bytes) => debug!("download: wrote {bytes} bytes to {}", file.display()),
            Err(err) => {
                error!("download: {} failed: {err}", subject.file_name());
                remove_partial(&file).await;
                return Err(DownloadError::Transfer(err));
            }
        }

        self.dispatcher
            .on_finished(&file, &subject)
            .await
            .map_err(DownloadError::Dispatch)?;
        self.dispatcher.notify(&file, &subject);
        Ok(file)
    }

    async fn transfer(
        &self,
        url: &str,
        dest: &Path,
        reporter: ProgressReporter,
    ) -> io::Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let (reader, total) = self.source.open(url).await?;
        let mut reader = ProgressReader::new(reader, reporter);
        let mut file = fs::File::create(dest).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        debug!("download: {} bytes passed through the progress reader", reader.bytes_read());

        if let Some(total) = total
            && written < total
        {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("download incomplete: received {written} of {total} bytes"),
            ));
        }
        Ok(written)
    }
}

async fn remove_partial(file: &Path) {
    if let Err(err) = fs::remove_file(file).await
        && err.kind() != io::ErrorKind::NotFound
    {
        debug!("download: could not remove partial file: {err}");
    }
}
