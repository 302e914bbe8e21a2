use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs;

/// User-visible downloads folder.
#[derive(Clone, Debug)]
pub struct Downloads {
    dir: PathBuf,
    display_root: PathBuf,
}

impl Downloads {
    /// `display_root` is the prefix stripped when showing paths to the user.
    pub fn new(dir: impl Into<PathBuf>, display_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            display_root: display_root.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Move `file` into the folder under its own name, replacing whatever was there.
    pub async fn move_into(&self, file: &Path) -> io::Result<PathBuf> {
        let name = file
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file has no name"))?;
        let destination = self.dir.join(name);
        if destination == file {
            return Ok(destination);
        }

        match fs::metadata(&destination).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&destination).await?,
            Ok(_) => fs::remove_file(&destination).await?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        fs::create_dir_all(&self.dir).await?;

        if let Err(err) = fs::rename(file, &destination).await {
            // Cache and downloads may live on different filesystems.
            debug!("downloads: rename failed ({err}), copying instead");
            fs::copy(file, &destination).await?;
            fs::remove_file(file).await?;
        }
        Ok(destination)
    }

    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.display_root) {
            Ok(relative) => format!("/{}", relative.display()),
            Err(_) => path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replaces_same_named_file() {
        let root = tempdir().unwrap();
        let cache = root.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let downloads = Downloads::new(root.path().join("downloads"), root.path());
        std::fs::create_dir_all(downloads.dir()).unwrap();
        std::fs::write(downloads.path_for("magisk.zip"), b"old").unwrap();

        let source = cache.join("magisk.zip");
        std::fs::write(&source, b"new").unwrap();
        let dest = downloads.move_into(&source).await.unwrap();

        assert_eq!(dest, downloads.path_for("magisk.zip"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(!source.exists());
        assert_eq!(downloads.display_path(&dest), "/downloads/magisk.zip");
    }

    #[tokio::test]
    async fn replaces_same_named_directory() {
        let root = tempdir().unwrap();
        let downloads = Downloads::new(root.path().join("downloads"), root.path());
        std::fs::create_dir_all(downloads.path_for("mod.zip").join("nested")).unwrap();
        let source = root.path().join("mod.zip");
        std::fs::write(&source, b"zip").unwrap();

        let dest = downloads.move_into(&source).await.unwrap();
        assert!(dest.is_file());
    }

    #[tokio::test]
    async fn file_already_in_place_is_left_alone() {
        let root = tempdir().unwrap();
        let downloads = Downloads::new(root.path(), root.path());
        let source = root.path().join("magisk.zip");
        std::fs::write(&source, b"zip").unwrap();

        let dest = downloads.move_into(&source).await.unwrap();
        assert_eq!(dest, source);
        assert_eq!(std::fs::read(&dest).unwrap(), b"zip");
    }

    #[test]
    fn paths_outside_root_display_absolute() {
        let downloads = Downloads::new("/data/downloads", "/data");
        assert_eq!(
            downloads.display_path(Path::new("/tmp/x.zip")),
            "/tmp/x.zip"
        );
    }
}
