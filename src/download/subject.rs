use serde::{Deserialize, Serialize};

use crate::channel::RemoteState;
use crate::engine::models::{MagiskArtifact, ModuleDescriptor};
use crate::error::DownloadError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashSlot {
    Primary,
    /// Install into the inactive slot of an A/B device.
    Secondary,
}

/// Opaque handle to the boot image a patch run starts from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef(pub String);

/// What should happen once the download has landed on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Configuration {
    Download,
    Uninstall,
    Flash(FlashSlot),
    Patch(SourceRef),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadSubject {
    Magisk {
        configuration: Configuration,
        artifact: MagiskArtifact,
    },
    Module {
        configuration: Configuration,
        module: ModuleDescriptor,
    },
}

impl DownloadSubject {
    /// Magisk build from the most recently resolved manifest.
    pub fn magisk(
        configuration: Configuration,
        state: &RemoteState,
    ) -> Result<Self, DownloadError> {
        let latest = state.latest().ok_or(DownloadError::NoRemoteState)?;
        Ok(Self::magisk_with(configuration, latest.magisk.clone()))
    }

    pub fn magisk_with(configuration: Configuration, artifact: MagiskArtifact) -> Self {
        Self::Magisk {
            configuration,
            artifact,
        }
    }

    pub fn module(configuration: Configuration, module: ModuleDescriptor) -> Self {
        Self::Module {
            configuration,
            module,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        match self {
            Self::Magisk { configuration, .. } | Self::Module { configuration, .. } => {
                configuration
            }
        }
    }

    /// Name used in both the cache and the downloads folder. Always a single path
    /// component, whatever the manifest or module author put in the name and version.
    pub fn file_name(&self) -> String {
        let name = match self {
            Self::Magisk {
                configuration: Configuration::Flash(_),
                ..
            } => "magisk.zip".to_owned(),
            Self::Magisk { artifact, .. } => {
                format!("Magisk-v{}({}).zip", artifact.version, artifact.version_code)
            }
            Self::Module { module, .. } => {
                format!("{}-v{}({}).zip", module.name, module.version, module.version_code)
            }
        };
        flatten_separators(&name)
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Magisk { artifact, .. } => &artifact.link,
            Self::Module { module, .. } => &module.zip_url,
        }
    }
}

// The ".zip" suffix keeps the result from ever being "." or "..".
fn flatten_separators(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> MagiskArtifact {
        MagiskArtifact {
            version: "25.2".into(),
            version_code: 25200,
            link: "https://example/magisk.zip".into(),
            note: String::new(),
            md5: String::new(),
        }
    }

    fn module() -> ModuleDescriptor {
        ModuleDescriptor {
            name: "busybox-ndk".into(),
            version: "1.36.1".into(),
            version_code: 13610,
            zip_url: "https://example/busybox.zip".into(),
        }
    }

    #[test]
    fn magisk_file_name_carries_version_identity() {
        let subject = DownloadSubject::magisk_with(Configuration::Download, artifact());
        assert_eq!(subject.file_name(), "Magisk-v25.2(25200).zip");
        assert_eq!(subject.url(), "https://example/magisk.zip");

        let patch = DownloadSubject::magisk_with(
            Configuration::Patch(SourceRef("content://boot.img".into())),
            artifact(),
        );
        assert_eq!(patch.file_name(), "Magisk-v25.2(25200).zip");
    }

    #[test]
    fn flash_configurations_use_fixed_file_name() {
        for slot in [FlashSlot::Primary, FlashSlot::Secondary] {
            let subject = DownloadSubject::magisk_with(Configuration::Flash(slot), artifact());
            assert_eq!(subject.file_name(), "magisk.zip");
        }
    }

    #[test]
    fn module_file_name_ignores_configuration() {
        for configuration in [
            Configuration::Download,
            Configuration::Flash(FlashSlot::Primary),
            Configuration::Uninstall,
        ] {
            let subject = DownloadSubject::module(configuration, module());
            assert_eq!(subject.file_name(), "busybox-ndk-v1.36.1(13610).zip");
            assert_eq!(subject.url(), "https://example/busybox.zip");
        }
    }

    #[test]
    fn module_names_cannot_leave_the_folder() {
        for (name, expected) in [
            ("../escaped", ".._escaped-v1(1).zip"),
            ("a/b", "a_b-v1(1).zip"),
            ("..\\win", ".._win-v1(1).zip"),
        ] {
            let subject = DownloadSubject::module(
                Configuration::Download,
                ModuleDescriptor {
                    name: name.into(),
                    version: "1".into(),
                    version_code: 1,
                    zip_url: "https://example/m.zip".into(),
                },
            );
            let file_name = subject.file_name();
            assert_eq!(file_name, expected);
            let mut components = std::path::Path::new(&file_name).components();
            assert!(matches!(
                components.next(),
                Some(std::path::Component::Normal(_))
            ));
            assert!(components.next().is_none());
        }
    }

    #[test]
    fn magisk_version_separators_are_flattened() {
        let mut artifact = artifact();
        artifact.version = "25.2/../x".into();
        let subject = DownloadSubject::magisk_with(Configuration::Download, artifact);
        assert_eq!(subject.file_name(), "Magisk-v25.2_.._x(25200).zip");
    }

    #[test]
    fn derivation_depends_only_on_fields() {
        let a = DownloadSubject::magisk_with(Configuration::Uninstall, artifact());
        let b = DownloadSubject::magisk_with(Configuration::Uninstall, artifact());
        assert_eq!(a, b);
        assert_eq!(a.file_name(), b.file_name());
        assert_eq!(a.url(), b.url());
    }

    #[test]
    fn default_artifact_comes_from_remote_state() {
        let state = RemoteState::new();
        assert!(matches!(
            DownloadSubject::magisk(Configuration::Download, &state),
            Err(DownloadError::NoRemoteState)
        ));
    }

    #[test]
    fn subjects_survive_serialization() {
        let subject = DownloadSubject::magisk_with(
            Configuration::Patch(SourceRef("content://boot.img".into())),
            artifact(),
        );
        let json = serde_json::to_string(&subject).unwrap();
        let back: DownloadSubject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, subject);
    }
}
