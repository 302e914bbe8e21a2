use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, warn};
use reqwest::Client;
use tokio_util::io::StreamReader;

use crate::channel::ManifestClient;
use crate::download::{ArtifactReader, ArtifactSource};
use crate::engine::models::RemoteManifest;
use crate::error::FetchError;

const RAW_HOST: &str = "https://raw.githubusercontent.com";
const MAIN_REPO: &str = "topjohnwu/magisk_files";
const ALTERNATE_REPO: &str = "ianmacd/MagiskBuilds";

#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("magisk-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    async fn fetch_manifest(&self, url: &str) -> Result<RemoteManifest, FetchError> {
        debug!("network: GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("GET {url} failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("manifest body error: {e}")))?;
        serde_json::from_str(&text).map_err(|e| FetchError::Parse(format!("{url}: {e}")))
    }
}

fn main_url(branch: &str, file: &str) -> String {
    format!("{RAW_HOST}/{MAIN_REPO}/{branch}/{file}")
}

fn alternate_url() -> String {
    format!("{RAW_HOST}/{ALTERNATE_REPO}/master/updates/stable.json")
}

#[async_trait]
impl ManifestClient for NetworkClient {
    async fn fetch_stable(&self) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(&main_url("master", "stable.json")).await
    }

    async fn fetch_beta(&self) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(&main_url("master", "beta.json")).await
    }

    async fn fetch_canary(&self) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(&main_url("canary", "release.json")).await
    }

    async fn fetch_canary_debug(&self) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(&main_url("canary", "debug.json")).await
    }

    async fn fetch_alternate(&self) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(&alternate_url()).await
    }

    async fn fetch_custom(&self, url: &str) -> Result<RemoteManifest, FetchError> {
        self.fetch_manifest(url).await
    }
}

#[async_trait]
impl ArtifactSource for NetworkClient {
    async fn open(&self, url: &str) -> io::Result<(ArtifactReader, Option<u64>)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| io::Error::other(format!("download request failed: {e}")))?;
        let total = resp.content_length();
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok((Box::pin(StreamReader::new(stream)), total))
    }
}
