use log::info;

use crate::channel::{ChannelResolver, InstalledVersion};
use crate::engine::models::RemoteManifest;
use crate::error::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    ManagerUpdate { latest_version: String, url: String },
    MagiskUpdate { latest_version: String, url: String },
}

/// A manager update wins over a Magisk update; an unknown manager code skips that check.
pub fn classify(
    manifest: &RemoteManifest,
    manager_version_code: Option<i64>,
    installed_magisk: Option<i64>,
) -> UpdateStatus {
    if let Some(current) = manager_version_code
        && current < manifest.app.version_code
    {
        return UpdateStatus::ManagerUpdate {
            latest_version: manifest.app.version.clone(),
            url: manifest.app.link.clone(),
        };
    }
    if installed_magisk.unwrap_or(-1) < manifest.magisk.version_code {
        return UpdateStatus::MagiskUpdate {
            latest_version: manifest.magisk.version.clone(),
            url: manifest.magisk.link.clone(),
        };
    }
    UpdateStatus::UpToDate
}

/// Resolve the configured channel and report whether anything newer is available.
///
/// # Errors
/// Returns the resolver's error unchanged when the manifest cannot be fetched.
pub async fn check_for_updates(
    resolver: &ChannelResolver,
    installed: &dyn InstalledVersion,
    manager_version_code: Option<i64>,
) -> Result<UpdateStatus, ResolveError> {
    let manifest = resolver.resolve().await?;
    let status = classify(&manifest, manager_version_code, installed.version_code().await);
    info!("updater: {status:?}");
    Ok(status)
}
