use std::env;
use std::fs;
use std::path::PathBuf;

/// Returns the root directory used for preferences, cache and downloads.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("magisk-dl")
}

pub fn cache_dir() -> PathBuf {
    default_app_dir().join("cache")
}

pub fn downloads_dir() -> PathBuf {
    default_app_dir().join("downloads")
}

/// Create the on-disk folder layout.
pub fn ensure_base_dirs() -> std::io::Result<()> {
    for dir in [default_app_dir(), cache_dir(), downloads_dir()] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
