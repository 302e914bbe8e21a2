use serde::{Deserialize, Serialize};

/// Magisk build advertised by an update channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagiskArtifact {
    pub version: String,
    pub version_code: i64,
    pub link: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub md5: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerArtifact {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub version_code: i64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallerArtifact {
    #[serde(default)]
    pub link: String,
}

/// Attestation helper payload shipped next to the Magisk build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetArtifact {
    #[serde(default)]
    pub version_code: i64,
    #[serde(default)]
    pub link: String,
}

/// Parsed update manifest for one channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub magisk: MagiskArtifact,
    #[serde(default)]
    pub app: ManagerArtifact,
    #[serde(default)]
    pub uninstaller: UninstallerArtifact,
    #[serde(default)]
    pub snet: SafetyNetArtifact,
}

/// Add-on module as listed by a module repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub version_code: i64,
    pub zip_url: String,
}
