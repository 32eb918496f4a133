// ─── Version File ───
// Typed model of a version descriptor JSON (base game or loader profile).
// Duck-typed parts of the document (argument entries, rules) are resolved
// into enums once, at load time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{MavenArtifact, MOJANG_LIBRARIES};
use crate::core::platform::Platform;

use super::rules::{self, Rule};

/// A parsed version descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub main_class: String,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Legacy whitespace-joined game arguments (pre-1.13).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ArtifactRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// A downloadable file: client jar, library artifact or native classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

// ─── Arguments ───

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// One entry of an argument template list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Literal(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    One(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    pub fn values(&self) -> &[String] {
        match self {
            ArgumentValue::One(v) => std::slice::from_ref(v),
            ArgumentValue::Many(vs) => vs,
        }
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Literal(value.to_string())
    }
}

// ─── Library Entry ───

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// OS name → classifier key (may contain `${arch}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,
    /// Repository base for coordinate-only entries (loader profiles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, ArtifactRef>>,
}

impl LibraryEntry {
    pub fn from_coordinate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_allowed(&self, platform: &Platform) -> bool {
        rules::evaluate(&self.rules, platform)
    }

    /// Whether this entry contributes anything on `platform`.
    ///
    /// A library with a `natives` map but no key for the platform is
    /// skipped entirely, even if it also declares a primary artifact.
    pub fn contributes(&self, platform: &Platform) -> bool {
        if !self.is_allowed(platform) {
            return false;
        }
        match &self.natives {
            Some(_) => self.native_classifier(platform).is_some(),
            None => true,
        }
    }

    /// Classifier key for this platform with `${arch}` substituted.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        let key = self.natives.as_ref()?.get(platform.os.as_str())?;
        Some(key.replace("${arch}", platform.arch_bits()))
    }

    /// The native classifier artifact for this platform, if declared.
    pub fn native_artifact(&self, platform: &Platform) -> Option<&ArtifactRef> {
        let classifier = self.native_classifier(platform)?;
        self.downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)
    }

    fn primary_artifact(&self) -> Option<&ArtifactRef> {
        self.downloads.as_ref()?.artifact.as_ref()
    }

    /// Whether the entry names a primary (non-native) jar.
    ///
    /// Old-style natives entries carry only classifiers.
    pub fn has_primary_artifact(&self) -> bool {
        match self.primary_artifact() {
            Some(_) => true,
            None => self.natives.is_none(),
        }
    }

    /// Primary jar path relative to the libraries directory.
    ///
    /// Uses the explicit `downloads.artifact.path` when present, otherwise
    /// derives it from the Maven coordinate.
    pub fn artifact_path(&self) -> LauncherResult<PathBuf> {
        if let Some(path) = self.primary_artifact().and_then(|a| a.path.as_deref()) {
            return Ok(PathBuf::from(path));
        }
        Ok(MavenArtifact::parse(&self.name)?.local_path())
    }

    /// Download URL of the primary jar.
    pub fn artifact_url(&self) -> LauncherResult<String> {
        if let Some(artifact) = self.primary_artifact() {
            if !artifact.url.is_empty() {
                return Ok(artifact.url.clone());
            }
        }
        let repo = self.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
        Ok(MavenArtifact::parse(&self.name)?.url(repo))
    }

    pub fn artifact_sha1(&self) -> Option<&str> {
        self.primary_artifact()?.sha1.as_deref()
    }

    /// Native classifier path relative to the libraries directory.
    pub fn native_path(&self, platform: &Platform) -> LauncherResult<Option<PathBuf>> {
        let Some(classifier) = self.native_classifier(platform) else {
            return Ok(None);
        };
        if let Some(path) = self.native_artifact(platform).and_then(|a| a.path.as_deref()) {
            return Ok(Some(PathBuf::from(path)));
        }
        let mut artifact = MavenArtifact::parse(&self.name)?;
        artifact.classifier = Some(classifier);
        Ok(Some(artifact.local_path()))
    }
}

impl VersionDescriptor {
    /// Read and parse a descriptor from disk.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        let raw = std::fs::read(path).map_err(|e| LauncherError::io(path, e))?;
        Self::from_slice(&raw)
    }

    pub fn from_slice(raw: &[u8]) -> LauncherResult<Self> {
        let raw = raw.strip_prefix("\u{feff}".as_bytes()).unwrap_or(raw);
        Ok(serde_json::from_slice(raw)?)
    }

    /// Serialize and write the descriptor to `path`.
    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let payload = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, payload).map_err(|e| LauncherError::io(path, e))
    }

    /// Required Java major version. Defaults to 17 when undeclared.
    pub fn required_java_major(&self) -> u32 {
        self.java_version
            .as_ref()
            .map(|j| j.major_version)
            .unwrap_or(17)
    }

    pub fn client_artifact(&self) -> Option<&ArtifactRef> {
        self.downloads.as_ref()?.client.as_ref()
    }

    pub fn has_argument_templates(&self) -> bool {
        self.arguments.is_some() || self.minecraft_arguments.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsName;

    #[test]
    fn arguments_resolve_into_literal_and_conditional_entries() {
        let parsed: VersionDescriptor = serde_json::from_value(serde_json::json!({
            "id": "test",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": [
                    "--username",
                    "${auth_player_name}",
                    {
                        "rules": [{"action": "allow", "os": {"name": "linux"}}],
                        "value": ["--demo", "--x"]
                    },
                    {
                        "rules": [{"action": "allow", "os": {"name": "windows"}}],
                        "value": "--single"
                    }
                ]
            }
        }))
        .unwrap();

        let game = &parsed.arguments.as_ref().unwrap().game;
        assert_eq!(game[0], Argument::Literal("--username".into()));
        match &game[2] {
            Argument::Conditional { rules, value } => {
                assert_eq!(rules.len(), 1);
                assert_eq!(value.values(), ["--demo".to_string(), "--x".to_string()]);
            }
            other => panic!("expected conditional, got {other:?}"),
        }
        match &game[3] {
            Argument::Conditional { value, .. } => assert_eq!(value.values(), ["--single"]),
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn artifact_path_prefers_explicit_path_over_coordinate() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18",
            "downloads": {"artifact": {
                "path": "custom/brigadier.jar",
                "url": "https://libraries.minecraft.net/custom/brigadier.jar",
                "sha1": "abc",
                "size": 10
            }}
        }))
        .unwrap();
        assert_eq!(lib.artifact_path().unwrap(), PathBuf::from("custom/brigadier.jar"));

        let bare = LibraryEntry::from_coordinate("com.mojang:brigadier:1.0.18");
        assert_eq!(
            bare.artifact_path().unwrap(),
            PathBuf::from("com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar")
        );
    }

    #[test]
    fn coordinate_only_entries_download_from_their_repository() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "net.fabricmc:intermediary:1.20.1",
            "url": "https://maven.fabricmc.net/"
        }))
        .unwrap();
        assert_eq!(
            lib.artifact_url().unwrap(),
            "https://maven.fabricmc.net/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar"
        );
    }

    #[test]
    fn natives_without_platform_key_contribute_nothing() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
            "natives": {"windows": "natives-windows-${arch}"},
            "downloads": {"classifiers": {
                "natives-windows-64": {"path": "lwjgl-platform-natives-windows-64.jar", "url": "u"}
            }}
        }))
        .unwrap();

        let windows = Platform::new(OsName::Windows, "x86_64");
        let linux = Platform::new(OsName::Linux, "x86_64");

        assert!(lib.contributes(&windows));
        assert_eq!(lib.native_classifier(&windows).as_deref(), Some("natives-windows-64"));
        assert!(lib.native_artifact(&windows).is_some());
        assert!(!lib.contributes(&linux));
        assert!(!lib.has_primary_artifact());
    }

    #[test]
    fn load_strips_byte_order_mark() {
        let mut raw = "\u{feff}".as_bytes().to_vec();
        raw.extend_from_slice(br#"{"id":"1.20.1","mainClass":"a.B"}"#);
        let parsed = VersionDescriptor::from_slice(&raw).unwrap();
        assert_eq!(parsed.id, "1.20.1");
        assert_eq!(parsed.required_java_major(), 17);
    }
}
