// ─── Library Entries ───
// One `libraries[]` element of a version descriptor: a Maven coordinate,
// optional explicit downloads, OS rules and native classifiers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::is_store_relative;
use crate::core::downloader::{Artifact, ContentHash};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenCoordinate;
use crate::core::platform::PlatformInfo;
use crate::core::rules::{library_allowed, Rule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    /// Repository base for entries that only give a coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// OS name → classifier, possibly containing `${arch}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, DownloadInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Empty for files an installer places locally.
    #[serde(default)]
    pub url: String,
}

/// Which archive entries to unpack from a native jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    /// When non-empty, only entries under one of these prefixes are kept.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl ExtractRules {
    pub fn permits(&self, entry_name: &str) -> bool {
        if self.exclude.iter().any(|prefix| entry_name.starts_with(prefix.as_str())) {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|prefix| entry_name.starts_with(prefix.as_str()))
    }
}

/// Where a library's main jar comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    /// Explicit download block with its own checksum.
    Declared(Artifact),
    /// Coordinate only; the checksum comes from the repository's `.sha1` file.
    Repository { url: String, path: PathBuf },
}

impl LibraryEntry {
    pub fn from_coordinate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            downloads: None,
            url: None,
            natives: None,
            extract: None,
            rules: None,
        }
    }

    pub fn coordinate(&self) -> LauncherResult<MavenCoordinate> {
        MavenCoordinate::parse(&self.name)
    }

    pub fn is_allowed(&self, platform: &PlatformInfo) -> bool {
        library_allowed(self.rules.as_deref(), platform)
    }

    /// Classifier of the native jar for `platform`, with `${arch}` expanded.
    pub fn native_classifier(&self, platform: &PlatformInfo) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let raw = natives.get(platform.os.as_str())?;
        Some(raw.replace("${arch}", &platform.pointer_width))
    }

    /// True for legacy entries that carry only native classifiers.
    pub fn is_natives_only(&self) -> bool {
        self.natives.is_some()
            && self
                .downloads
                .as_ref()
                .map_or(false, |d| d.artifact.is_none() && d.classifiers.is_some())
    }

    /// Main jar source, or `None` when the entry has no classpath jar.
    pub fn main_source(&self, default_repository: &str) -> LauncherResult<Option<LibrarySource>> {
        let coordinate = self.coordinate()?;

        if let Some(downloads) = &self.downloads {
            match &downloads.artifact {
                Some(info) => {
                    let path = info
                        .path
                        .as_ref()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| coordinate.local_path());
                    let path = store_relative(&self.name, path)?;
                    return Ok(Some(LibrarySource::Declared(declared_artifact(
                        &self.name, info, path,
                    )?)));
                }
                None if downloads.classifiers.is_some() => return Ok(None),
                None => {}
            }
        }

        let repository = self.url.as_deref().unwrap_or(default_repository);
        Ok(Some(LibrarySource::Repository {
            url: coordinate.url(repository),
            path: store_relative(&self.name, coordinate.local_path())?,
        }))
    }

    /// Native jar for `platform`, if the entry declares one for this OS.
    ///
    /// A classifier named in `natives` but absent from `downloads.classifiers`
    /// means the library ships no natives here.
    pub fn native_artifact(&self, platform: &PlatformInfo) -> LauncherResult<Option<Artifact>> {
        let Some(classifier) = self.native_classifier(platform) else {
            return Ok(None);
        };
        let info = self
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(&classifier));
        let Some(info) = info else {
            debug!(
                "{} names native classifier {} but provides no download for it",
                self.name, classifier
            );
            return Ok(None);
        };

        let path = match &info.path {
            Some(path) => PathBuf::from(path),
            None => self.coordinate()?.with_classifier(&classifier).local_path(),
        };
        let path = store_relative(&self.name, path)?;
        declared_artifact(&format!("{}:{}", self.name, classifier), info, path).map(Some)
    }

    pub fn extract_rules(&self) -> ExtractRules {
        let mut rules = self.extract.clone().unwrap_or_default();
        if rules.exclude.is_empty() {
            rules.exclude.push("META-INF/".to_string());
        }
        rules
    }
}

/// Library paths come from descriptors and must stay under the library store.
fn store_relative(id: &str, path: PathBuf) -> LauncherResult<PathBuf> {
    if is_store_relative(&path) {
        Ok(path)
    } else {
        Err(LauncherError::InvalidDescriptor {
            id: id.to_string(),
            reason: format!("library path {} escapes the library store", path.display()),
        })
    }
}

fn declared_artifact(id: &str, info: &DownloadInfo, path: PathBuf) -> LauncherResult<Artifact> {
    let hash = ContentHash::sha1(info.sha1.clone());
    if !hash.is_well_formed() {
        return Err(LauncherError::InvalidDescriptor {
            id: id.to_string(),
            reason: format!("malformed sha1 {:?}", info.sha1),
        });
    }
    Ok(Artifact {
        id: id.to_string(),
        url: if info.url.is_empty() {
            None
        } else {
            Some(info.url.clone())
        },
        hash,
        size: info.size,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsName;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    fn linux() -> PlatformInfo {
        PlatformInfo::new(OsName::Linux, "6.1", "x86_64", "64")
    }

    fn lwjgl_natives() -> LibraryEntry {
        serde_json::from_value(serde_json::json!({
            "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
            "downloads": {
                "classifiers": {
                    "natives-linux": {
                        "path": "org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar",
                        "sha1": SHA,
                        "size": 10,
                        "url": "https://libraries.minecraft.net/lwjgl-natives-linux.jar"
                    },
                    "natives-windows-64": {
                        "sha1": SHA,
                        "url": "https://libraries.minecraft.net/lwjgl-natives-windows-64.jar"
                    }
                }
            },
            "natives": {
                "linux": "natives-linux",
                "windows": "natives-windows-${arch}",
                "osx": "natives-osx"
            },
            "extract": { "exclude": ["META-INF/"] }
        }))
        .unwrap()
    }

    #[test]
    fn declared_artifact_uses_download_block() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18",
            "downloads": {
                "artifact": {
                    "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                    "sha1": SHA,
                    "size": 77392,
                    "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"
                }
            }
        }))
        .unwrap();

        match lib.main_source("https://unused").unwrap() {
            Some(LibrarySource::Declared(artifact)) => {
                assert_eq!(artifact.size, Some(77392));
                assert_eq!(artifact.hash.hex, SHA);
                assert_eq!(
                    artifact.path,
                    PathBuf::from("com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn coordinate_only_entries_resolve_against_their_repository() {
        let mut lib = LibraryEntry::from_coordinate("net.fabricmc:fabric-loader:0.15.7");
        lib.url = Some("https://maven.fabricmc.net/".into());

        match lib.main_source("https://libraries.minecraft.net").unwrap() {
            Some(LibrarySource::Repository { url, path }) => {
                assert_eq!(
                    url,
                    "https://maven.fabricmc.net/net/fabricmc/fabric-loader/0.15.7/fabric-loader-0.15.7.jar"
                );
                assert_eq!(
                    path,
                    PathBuf::from("net/fabricmc/fabric-loader/0.15.7/fabric-loader-0.15.7.jar")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn natives_only_entries_have_no_main_jar() {
        let lib = lwjgl_natives();
        assert!(lib.is_natives_only());
        assert_eq!(lib.main_source("https://unused").unwrap(), None);
    }

    #[test]
    fn native_classifier_expands_arch() {
        let lib = lwjgl_natives();
        let windows = PlatformInfo::new(OsName::Windows, "10.0", "x86_64", "64");
        assert_eq!(
            lib.native_classifier(&windows).as_deref(),
            Some("natives-windows-64")
        );
        let native = lib.native_artifact(&windows).unwrap().unwrap();
        assert_eq!(
            native.path,
            PathBuf::from("org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-windows-64.jar")
        );

        let linux_native = lib.native_artifact(&linux()).unwrap().unwrap();
        assert!(linux_native.url.unwrap().ends_with("natives-linux.jar"));
    }

    #[test]
    fn missing_classifier_download_means_no_natives() {
        let lib = lwjgl_natives();
        let mac = PlatformInfo::new(OsName::Osx, "14.0", "arm64", "64");
        assert_eq!(lib.native_artifact(&mac).unwrap(), None);
    }

    #[test]
    fn extract_rules_default_to_skipping_meta_inf() {
        let rules = LibraryEntry::from_coordinate("a:b:1").extract_rules();
        assert!(!rules.permits("META-INF/MANIFEST.MF"));
        assert!(rules.permits("liblwjgl.so"));

        let narrowed = ExtractRules {
            include: vec!["linux/".into()],
            exclude: vec!["linux/debug/".into()],
        };
        assert!(narrowed.permits("linux/libglfw.so"));
        assert!(!narrowed.permits("linux/debug/libglfw.so"));
        assert!(!narrowed.permits("windows/glfw.dll"));
    }

    #[test]
    fn malformed_checksum_is_a_descriptor_error() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "a:b:1.0",
            "downloads": { "artifact": { "sha1": "nothex", "url": "https://x/a.jar" } }
        }))
        .unwrap();
        assert!(matches!(
            lib.main_source("https://unused"),
            Err(LauncherError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn paths_leaving_the_library_store_are_rejected() {
        let absolute: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "evil:abs:1.0",
            "downloads": { "artifact": { "path": "/etc/cron.d/evil.jar", "sha1": SHA, "url": "https://x/a.jar" } }
        }))
        .unwrap();
        assert!(matches!(
            absolute.main_source("https://unused"),
            Err(LauncherError::InvalidDescriptor { .. })
        ));

        let mut natives = lwjgl_natives();
        if let Some(info) = natives
            .downloads
            .as_mut()
            .and_then(|d| d.classifiers.as_mut())
            .and_then(|c| c.get_mut("natives-linux"))
        {
            info.path = Some("../../outside/natives.jar".into());
        }
        assert!(matches!(
            natives.native_artifact(&linux()),
            Err(LauncherError::InvalidDescriptor { .. })
        ));

        let dotted = LibraryEntry::from_coordinate("com.example:../../escape:1.0");
        assert!(matches!(
            dotted.main_source("https://libraries.minecraft.net"),
            Err(LauncherError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn empty_url_marks_locally_provided_files() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "net.minecraftforge:forge:1.20.1-47.2.0:client",
            "downloads": { "artifact": { "path": "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar", "sha1": SHA, "url": "" } }
        }))
        .unwrap();
        match lib.main_source("https://unused").unwrap() {
            Some(LibrarySource::Declared(artifact)) => assert_eq!(artifact.url, None),
            other => panic!("unexpected {other:?}"),
        }
    }
}
