use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::channel::{Channel, InstalledVersion, PreferenceStore};
use crate::env;
use crate::error::StorageError;

const LOCAL_STATE_FILE: &str = "version.txt";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default = "default_channel_id")]
    update_channel: i32,
    #[serde(default)]
    custom_channel: String,
}

fn default_channel_id() -> i32 {
    Channel::Default.id()
}

/// Channel preference persisted as JSON next to the rest of the app state.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    current: Mutex<PreferenceFile>,
}

impl Preferences {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let current = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("preferences: {} missing, using defaults", path.display());
                PreferenceFile {
                    update_channel: default_channel_id(),
                    custom_channel: String::new(),
                }
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub async fn open_default() -> Result<Self, StorageError> {
        Self::open(env::default_app_dir().join(PREFERENCES_FILE)).await
    }

    /// Explicit user choice; a custom channel also records its URL.
    pub async fn select_channel(
        &self,
        channel: Channel,
        custom_url: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut current = self.current.lock().await;
        current.update_channel = channel.id();
        if let Some(url) = custom_url {
            current.custom_channel = url.trim().to_owned();
        }
        save(&self.path, &current).await
    }
}

async fn save(path: &Path, prefs: &PreferenceFile) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(prefs)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, &bytes).await?;
    Ok(())
}

#[async_trait]
impl PreferenceStore for Preferences {
    async fn channel(&self) -> Channel {
        Channel::from_id(self.current.lock().await.update_channel)
    }

    async fn set_channel(&self, channel: Channel) -> Result<(), StorageError> {
        let mut current = self.current.lock().await;
        current.update_channel = channel.id();
        save(&self.path, &current).await
    }

    async fn custom_url(&self) -> String {
        self.current.lock().await.custom_channel.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalState {
    pub version_code: i64,
}

#[derive(Clone)]
pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    pub fn new() -> Self {
        let base_dir = env::default_app_dir();
        // Best-effort directory creation; failures are surfaced on write.
        let _ = env::ensure_base_dirs();
        Self { base_dir }
    }

    #[cfg(test)]
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub async fn read_local_state(&self) -> Option<LocalState> {
        let path = self.base_dir.join(LOCAL_STATE_FILE);
        let bytes = fs::read(&path).await.ok()?;
        let text = String::from_utf8_lossy(&bytes);
        match text.trim().parse::<i64>() {
            Ok(version_code) => Some(LocalState { version_code }),
            Err(err) => {
                warn!("storage: ignoring unreadable {}: {err}", path.display());
                None
            }
        }
    }

    pub async fn write_local_state(&self, state: &LocalState) -> Result<(), StorageError> {
        let path = self.base_dir.join(LOCAL_STATE_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, state.version_code.to_string()).await?;
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join("cache")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.base_dir.join("downloads")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl InstalledVersion for StorageManager {
    async fn version_code(&self) -> Option<i64> {
        self.read_local_state().await.map(|state| state.version_code)
    }
}
