use std::io;

use thiserror::Error;

/// Failure reported by a manifest fetch client.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("manifest request failed: {0}")]
    Transport(String),
    #[error("manifest request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("manifest parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse preferences: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The custom channel is selected but no URL has been configured.
    #[error("custom update channel selected but no URL is configured")]
    ChannelConfiguration,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unable to persist channel preference: {0}")]
    Preferences(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no remote manifest has been resolved yet")]
    NoRemoteState,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("transfer failed: {0}")]
    Transfer(#[source] io::Error),
    #[error("post-download action failed: {0}")]
    Dispatch(#[source] io::Error),
}
