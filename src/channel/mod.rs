use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::engine::models::RemoteManifest;
use crate::error::{FetchError, ResolveError, StorageError};

/// Release track an update manifest is fetched from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Channel {
    /// No explicit user choice; fetches stable and may fall back to [`Channel::Alternate`].
    #[default]
    Default,
    Stable,
    Beta,
    Custom,
    Canary,
    CanaryDebug,
    Alternate,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Default,
        Channel::Stable,
        Channel::Beta,
        Channel::Custom,
        Channel::Canary,
        Channel::CanaryDebug,
        Channel::Alternate,
    ];

    /// Stable id used when persisting the preference.
    pub fn id(self) -> i32 {
        match self {
            Channel::Default => -1,
            Channel::Stable => 0,
            Channel::Beta => 1,
            Channel::Custom => 2,
            Channel::Canary => 3,
            Channel::CanaryDebug => 4,
            Channel::Alternate => 5,
        }
    }

    /// Unknown ids map to [`Channel::Default`].
    pub fn from_id(id: i32) -> Self {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.id() == id)
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Default => "default",
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Custom => "custom",
            Channel::Canary => "canary",
            Channel::CanaryDebug => "canary-debug",
            Channel::Alternate => "alternate",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        Channel::ALL
            .into_iter()
            .find(|channel| channel.label() == value)
            .ok_or_else(|| format!("unknown update channel '{value}'"))
    }
}

/// One fetch operation per channel endpoint.
#[async_trait]
pub trait ManifestClient: Send + Sync {
    async fn fetch_stable(&self) -> Result<RemoteManifest, FetchError>;
    async fn fetch_beta(&self) -> Result<RemoteManifest, FetchError>;
    async fn fetch_canary(&self) -> Result<RemoteManifest, FetchError>;
    async fn fetch_canary_debug(&self) -> Result<RemoteManifest, FetchError>;
    async fn fetch_alternate(&self) -> Result<RemoteManifest, FetchError>;
    async fn fetch_custom(&self, url: &str) -> Result<RemoteManifest, FetchError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn channel(&self) -> Channel;
    async fn set_channel(&self, channel: Channel) -> Result<(), StorageError>;
    async fn custom_url(&self) -> String;
}

/// Version code of the Magisk build currently installed, if any.
#[async_trait]
pub trait InstalledVersion: Send + Sync {
    async fn version_code(&self) -> Option<i64>;
}

/// Latest manifest known to the process. Only [`ChannelResolver`] replaces it.
#[derive(Clone, Debug, Default)]
pub struct RemoteState {
    inner: Arc<RwLock<Option<Arc<RemoteManifest>>>>,
}

impl RemoteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<RemoteManifest>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, manifest: Arc<RemoteManifest>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = Some(manifest),
            Err(poisoned) => *poisoned.into_inner() = Some(manifest),
        }
    }
}

pub struct ChannelResolver {
    client: Arc<dyn ManifestClient>,
    preferences: Arc<dyn PreferenceStore>,
    installed: Arc<dyn InstalledVersion>,
    state: RemoteState,
}

impl ChannelResolver {
    pub fn new(
        client: Arc<dyn ManifestClient>,
        preferences: Arc<dyn PreferenceStore>,
        installed: Arc<dyn InstalledVersion>,
        state: RemoteState,
    ) -> Self {
        Self {
            client,
            preferences,
            installed,
            state,
        }
    }

    pub fn state(&self) -> &RemoteState {
        &self.state
    }

    /// Fetch the manifest for the stored channel and publish it as the latest remote state.
    ///
    /// When the user never picked a channel and the default track advertises a build older
    /// than the installed one, the stored preference is switched to [`Channel::Alternate`]
    /// (permanently) and the alternate manifest is returned instead.
    pub async fn resolve(&self) -> Result<Arc<RemoteManifest>, ResolveError> {
        let channel = self.preferences.channel().await;
        info!("resolve: fetching manifest from {channel} channel");
        let mut manifest = self.fetch(channel).await?;

        if channel == Channel::Default
            && let Some(installed) = self.installed.version_code().await
            && manifest.magisk.version_code < installed
        {
            warn!(
                "resolve: default channel offers {} but {} is installed, switching to alternate",
                manifest.magisk.version_code, installed
            );
            self.preferences.set_channel(Channel::Alternate).await?;
            manifest = self.client.fetch_alternate().await?;
        }

        debug!(
            "resolve: latest Magisk is {} ({})",
            manifest.magisk.version, manifest.magisk.version_code
        );
        let manifest = Arc::new(manifest);
        self.state.replace(manifest.clone());
        Ok(manifest)
    }

    async fn fetch(&self, channel: Channel) -> Result<RemoteManifest, ResolveError> {
        let manifest = match channel {
            Channel::Default | Channel::Stable => self.client.fetch_stable().await?,
            Channel::Beta => self.client.fetch_beta().await?,
            Channel::Canary => self.client.fetch_canary().await?,
            Channel::CanaryDebug => self.client.fetch_canary_debug().await?,
            Channel::Alternate => self.client.fetch_alternate().await?,
            Channel::Custom => {
                let url = self.preferences.custom_url().await;
                let url = url.trim();
                if url.is_empty() {
                    return Err(ResolveError::ChannelConfiguration);
                }
                self.client.fetch_custom(url).await?
            }
        };
        Ok(manifest)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::models::MagiskArtifact;
    use std::sync::Mutex;

    pub(crate) fn manifest(version: &str, code: i64, link: &str) -> RemoteManifest {
        RemoteManifest {
            magisk: MagiskArtifact {
                version: version.into(),
                version_code: code,
                link: link.into(),
                note: String::new(),
                md5: String::new(),
            },
            app: Default::default(),
            uninstaller: Default::default(),
            snet: Default::default(),
        }
    }

    #[derive(Default)]
    struct FakeClient {
        stable_code: i64,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn with_stable(code: i64) -> Self {
            Self {
                stable_code: code,
                ..Default::default()
            }
        }

        fn record(&self, name: &str) {
            self.calls.lock().unwrap().push(name.to_owned());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ManifestClient for FakeClient {
        async fn fetch_stable(&self) -> Result<RemoteManifest, FetchError> {
            self.record("stable");
            Ok(manifest("stable", self.stable_code, "https://example/stable.zip"))
        }
        async fn fetch_beta(&self) -> Result<RemoteManifest, FetchError> {
            self.record("beta");
            Ok(manifest("beta", 200, "https://example/beta.zip"))
        }
        async fn fetch_canary(&self) -> Result<RemoteManifest, FetchError> {
            self.record("canary");
            Err(FetchError::Transport("connection reset".into()))
        }
        async fn fetch_canary_debug(&self) -> Result<RemoteManifest, FetchError> {
            self.record("canary-debug");
            Ok(manifest("debug", 300, "https://example/debug.zip"))
        }
        async fn fetch_alternate(&self) -> Result<RemoteManifest, FetchError> {
            self.record("alternate");
            Ok(manifest("alternate", 95, "https://example/alternate.zip"))
        }
        async fn fetch_custom(&self, url: &str) -> Result<RemoteManifest, FetchError> {
            self.record(&format!("custom:{url}"));
            Ok(manifest("custom", 400, "https://example/custom.zip"))
        }
    }

    struct FakePreferences {
        channel: Mutex<Channel>,
        custom_url: String,
        writes: Mutex<usize>,
    }

    impl FakePreferences {
        fn new(channel: Channel, custom_url: &str) -> Self {
            Self {
                channel: Mutex::new(channel),
                custom_url: custom_url.into(),
                writes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PreferenceStore for FakePreferences {
        async fn channel(&self) -> Channel {
            *self.channel.lock().unwrap()
        }
        async fn set_channel(&self, channel: Channel) -> Result<(), StorageError> {
            *self.channel.lock().unwrap() = channel;
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }
        async fn custom_url(&self) -> String {
            self.custom_url.clone()
        }
    }

    pub(crate) struct Installed(pub Option<i64>);

    #[async_trait]
    impl InstalledVersion for Installed {
        async fn version_code(&self) -> Option<i64> {
            self.0
        }
    }

    fn resolver(
        client: Arc<FakeClient>,
        prefs: Arc<FakePreferences>,
        installed: Option<i64>,
    ) -> ChannelResolver {
        ChannelResolver::new(client, prefs, Arc::new(Installed(installed)), RemoteState::new())
    }

    #[test]
    fn channel_ids_round_trip_and_unknown_ids_fall_back_to_default() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_id(channel.id()), channel);
        }
        assert_eq!(Channel::from_id(42), Channel::Default);
        assert_eq!("Canary-Debug".parse::<Channel>(), Ok(Channel::CanaryDebug));
        assert!("nightly".parse::<Channel>().is_err());
    }

    #[tokio::test]
    async fn each_channel_issues_exactly_one_fetch() {
        let expectations = [
            (Channel::Stable, "stable"),
            (Channel::Beta, "beta"),
            (Channel::CanaryDebug, "canary-debug"),
            (Channel::Alternate, "alternate"),
            (Channel::Custom, "custom:https://example/custom.json"),
        ];
        for (channel, call) in expectations {
            let client = Arc::new(FakeClient::with_stable(100));
            let prefs = Arc::new(FakePreferences::new(channel, "https://example/custom.json"));
            resolver(client.clone(), prefs, Some(1_000)).resolve().await.unwrap();
            assert_eq!(client.calls(), vec![call.to_owned()]);
        }
    }

    #[tokio::test]
    async fn custom_channel_without_url_fails_before_any_fetch() {
        let client = Arc::new(FakeClient::with_stable(100));
        let prefs = Arc::new(FakePreferences::new(Channel::Custom, "   "));
        let resolver = resolver(client.clone(), prefs, Some(100));

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ResolveError::ChannelConfiguration));
        assert!(client.calls().is_empty());
        assert!(resolver.state().latest().is_none());
    }

    #[tokio::test]
    async fn default_channel_falls_back_to_alternate_on_downgrade() {
        let client = Arc::new(FakeClient::with_stable(90));
        let prefs = Arc::new(FakePreferences::new(Channel::Default, ""));
        let resolver = resolver(client.clone(), prefs.clone(), Some(100));

        let manifest = resolver.resolve().await.unwrap();
        assert_eq!(manifest.magisk.version, "alternate");
        assert_eq!(client.calls(), vec!["stable", "alternate"]);
        assert_eq!(prefs.channel().await, Channel::Alternate);
        assert_eq!(resolver.state().latest().unwrap().magisk.version, "alternate");
    }

    #[tokio::test]
    async fn fallback_happens_at_most_once_per_resolve() {
        // The alternate manifest (95) is still older than the install, no further fetch.
        let client = Arc::new(FakeClient::with_stable(90));
        let prefs = Arc::new(FakePreferences::new(Channel::Default, ""));
        resolver(client.clone(), prefs.clone(), Some(100))
            .resolve()
            .await
            .unwrap();
        assert_eq!(client.calls().len(), 2);
        assert_eq!(*prefs.writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn newer_default_manifest_keeps_preference() {
        let client = Arc::new(FakeClient::with_stable(110));
        let prefs = Arc::new(FakePreferences::new(Channel::Default, ""));
        let manifest = resolver(client.clone(), prefs.clone(), Some(100))
            .resolve()
            .await
            .unwrap();
        assert_eq!(manifest.magisk.version_code, 110);
        assert_eq!(prefs.channel().await, Channel::Default);
        assert_eq!(*prefs.writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn explicit_stable_choice_never_falls_back() {
        let client = Arc::new(FakeClient::with_stable(90));
        let prefs = Arc::new(FakePreferences::new(Channel::Stable, ""));
        let manifest = resolver(client.clone(), prefs.clone(), Some(100))
            .resolve()
            .await
            .unwrap();
        assert_eq!(manifest.magisk.version_code, 90);
        assert_eq!(prefs.channel().await, Channel::Stable);
    }

    #[tokio::test]
    async fn missing_install_skips_fallback() {
        let client = Arc::new(FakeClient::with_stable(90));
        let prefs = Arc::new(FakePreferences::new(Channel::Default, ""));
        resolver(client.clone(), prefs.clone(), None)
            .resolve()
            .await
            .unwrap();
        assert_eq!(client.calls(), vec!["stable"]);
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_leave_state_untouched() {
        let client = Arc::new(FakeClient::with_stable(100));
        let prefs = Arc::new(FakePreferences::new(Channel::Canary, ""));
        let resolver = resolver(client.clone(), prefs, Some(1));

        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(FetchError::Transport(_))));
        assert_eq!(client.calls(), vec!["canary"]);
        assert!(resolver.state().latest().is_none());
    }
}
