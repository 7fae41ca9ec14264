// ─── Version File ───
// Typed version descriptor plus the append-only parent/child merge.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::downloader::{Artifact, ContentHash};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::PlatformInfo;
use crate::core::rules::{FeatureSet, OsCondition, Rule};

use super::arguments::{ArgumentElement, ArgumentTemplate, ArgumentValue};
use super::library::{DownloadInfo, LibraryEntry};

/// Java major assumed for descriptors that predate `javaVersion`.
const LEGACY_JAVA_MAJOR: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub arguments: Arguments,
    /// Pre-1.13 single-string game arguments. A child's value replaces the parent's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    /// Version whose client jar this descriptor runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub major_version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: ArgumentTemplate,
    #[serde(default)]
    pub jvm: ArgumentTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<DownloadInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

impl VersionDescriptor {
    /// Parse raw descriptor JSON, attributing failures to `id`.
    pub fn parse(id: &str, raw: &str) -> LauncherResult<Self> {
        serde_json::from_str(raw).map_err(|e| LauncherError::InvalidDescriptor {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn required_java_major(&self) -> u32 {
        self.java_version
            .as_ref()
            .map(|j| j.major_version)
            .unwrap_or(LEGACY_JAVA_MAJOR)
    }

    /// Id of the version directory holding the client jar.
    pub fn client_jar_id(&self) -> &str {
        self.jar.as_deref().unwrap_or(&self.id)
    }

    /// Client jar, relative to the versions directory.
    pub fn client_artifact(&self) -> LauncherResult<Option<Artifact>> {
        let Some(info) = self.downloads.as_ref().and_then(|d| d.client.as_ref()) else {
            return Ok(None);
        };
        let hash = ContentHash::sha1(info.sha1.clone());
        if !hash.is_well_formed() {
            return Err(LauncherError::InvalidDescriptor {
                id: self.id.clone(),
                reason: format!("malformed client sha1 {:?}", info.sha1),
            });
        }
        let jar_id = self.client_jar_id();
        Ok(Some(Artifact {
            id: format!("{jar_id} client"),
            url: Some(info.url.clone()),
            hash,
            size: info.size,
            path: PathBuf::from(jar_id).join(format!("{jar_id}.jar")),
        }))
    }

    /// Asset index id; very old descriptors only name it in `assets`.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }

    /// Game arguments, folding the legacy string in front of any structured ones.
    pub fn game_template(&self) -> ArgumentTemplate {
        match &self.minecraft_arguments {
            Some(legacy) => ArgumentTemplate::from_legacy(legacy).concat(&self.arguments.game),
            None => self.arguments.game.clone(),
        }
    }

    /// JVM arguments; legacy descriptors get the classic natives/classpath set.
    pub fn jvm_template(&self) -> ArgumentTemplate {
        if self.arguments.jvm.is_empty() {
            legacy_jvm_template()
        } else {
            self.arguments.jvm.clone()
        }
    }

    pub fn game_arguments(&self, platform: &PlatformInfo, features: &FeatureSet) -> Vec<String> {
        self.game_template().resolve(platform, features)
    }

    pub fn jvm_arguments(&self, platform: &PlatformInfo, features: &FeatureSet) -> Vec<String> {
        self.jvm_template().resolve(platform, features)
    }

    pub fn merge_onto(&self, base: &VersionDescriptor) -> VersionDescriptor {
        merge(base, self)
    }
}

/// Combine a parent (`base`) with a child (`overlay`).
///
/// Libraries and argument templates append in order, parent first. Scalar
/// fields take the child's value when it has one. Nothing is deduplicated, so
/// merging the result again with a further child behaves the same way.
pub fn merge(base: &VersionDescriptor, overlay: &VersionDescriptor) -> VersionDescriptor {
    let mut libraries = Vec::with_capacity(base.libraries.len() + overlay.libraries.len());
    libraries.extend(base.libraries.iter().cloned());
    libraries.extend(overlay.libraries.iter().cloned());

    // A legacy parent's implicit JVM set has to survive a child that brings
    // its own structured JVM arguments.
    let base_jvm = if base.arguments.jvm.is_empty() && base.minecraft_arguments.is_some() {
        legacy_jvm_template()
    } else {
        base.arguments.jvm.clone()
    };

    // A child without its own downloads runs the parent's client jar.
    let jar = match (&overlay.jar, &overlay.downloads) {
        (Some(jar), _) => Some(jar.clone()),
        (None, Some(_)) => None,
        (None, None) => Some(base.client_jar_id().to_string()),
    };

    VersionDescriptor {
        id: overlay.id.clone(),
        version_type: overlay
            .version_type
            .clone()
            .or_else(|| base.version_type.clone()),
        main_class: overlay.main_class.clone().or_else(|| base.main_class.clone()),
        inherits_from: base.inherits_from.clone(),
        java_version: overlay
            .java_version
            .clone()
            .or_else(|| base.java_version.clone()),
        libraries,
        arguments: Arguments {
            game: base.arguments.game.concat(&overlay.arguments.game),
            jvm: base_jvm.concat(&overlay.arguments.jvm),
        },
        minecraft_arguments: overlay
            .minecraft_arguments
            .clone()
            .or_else(|| base.minecraft_arguments.clone()),
        downloads: overlay.downloads.clone().or_else(|| base.downloads.clone()),
        asset_index: overlay
            .asset_index
            .clone()
            .or_else(|| base.asset_index.clone()),
        assets: overlay.assets.clone().or_else(|| base.assets.clone()),
        jar,
        release_time: overlay
            .release_time
            .clone()
            .or_else(|| base.release_time.clone()),
    }
}

fn legacy_jvm_template() -> ArgumentTemplate {
    let mut elements = vec![ArgumentElement::Conditional {
        rules: vec![Rule::allow().with_os(OsCondition {
            name: Some("osx".into()),
            ..Default::default()
        })],
        value: ArgumentValue::Single("-XstartOnFirstThread".into()),
    }];
    elements.extend(
        [
            "-Djava.library.path=${natives_directory}",
            "-Dminecraft.launcher.brand=${launcher_name}",
            "-Dminecraft.launcher.version=${launcher_version}",
            "-cp",
            "${classpath}",
        ]
        .into_iter()
        .map(|s| ArgumentElement::Literal(s.to_string())),
    );
    ArgumentTemplate::new(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsName;

    fn linux() -> PlatformInfo {
        PlatformInfo::new(OsName::Linux, "6.1", "x86_64", "64")
    }

    fn descriptor(value: serde_json::Value) -> VersionDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merge_appends_libraries_and_arguments_parent_first() {
        let a = descriptor(serde_json::json!({
            "id": "1.20.4",
            "mainClass": "net.minecraft.client.main.Main",
            "libraries": [{"name": "a:one:1"}, {"name": "a:two:1"}],
            "arguments": {"game": ["a", "b"]}
        }));
        let b = descriptor(serde_json::json!({
            "id": "fabric-loader-0.15.7-1.20.4",
            "inheritsFrom": "1.20.4",
            "libraries": [{"name": "b:three:1"}],
            "arguments": {"game": ["c"]}
        }));

        let merged = merge(&a, &b);
        assert_eq!(merged.libraries.len(), 3);
        assert_eq!(merged.libraries[0].name, "a:one:1");
        assert_eq!(merged.libraries[2].name, "b:three:1");
        assert_eq!(
            merged.arguments.game.render(&linux(), &FeatureSet::default()),
            "a b c"
        );
        assert_eq!(merged.id, "fabric-loader-0.15.7-1.20.4");
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.minecraft.client.main.Main")
        );
        assert_eq!(merged.inherits_from, None);
    }

    #[test]
    fn merging_twice_keeps_appending() {
        let a = descriptor(serde_json::json!({"id": "a", "arguments": {"jvm": ["-Da"]}}));
        let b = descriptor(serde_json::json!({"id": "b", "arguments": {"jvm": ["-Db"]}}));
        let c = descriptor(serde_json::json!({"id": "c", "mainClass": "C", "arguments": {"jvm": ["-Dc"]}}));

        let merged = merge(&merge(&a, &b), &c);
        assert_eq!(
            merged.arguments.jvm.resolve(&linux(), &FeatureSet::default()),
            vec!["-Da", "-Db", "-Dc"]
        );
        assert_eq!(merged.main_class.as_deref(), Some("C"));
    }

    #[test]
    fn duplicate_libraries_are_kept() {
        let a = descriptor(serde_json::json!({"id": "a", "libraries": [{"name": "x:y:1"}]}));
        let b = descriptor(serde_json::json!({"id": "b", "libraries": [{"name": "x:y:1"}]}));
        assert_eq!(merge(&a, &b).libraries.len(), 2);
    }

    #[test]
    fn child_scalars_override_parent() {
        let parent = descriptor(serde_json::json!({
            "id": "1.12.2",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--username ${auth_player_name}",
            "javaVersion": {"component": "jre-legacy", "majorVersion": 8},
            "assetIndex": {"id": "1.12", "url": "https://x/1.12.json", "sha1": "0000000000000000000000000000000000000000"},
            "downloads": {"client": {"sha1": "1111111111111111111111111111111111111111", "size": 5, "url": "https://x/client.jar"}}
        }));
        let child = descriptor(serde_json::json!({
            "id": "1.12.2-forge",
            "inheritsFrom": "1.12.2",
            "mainClass": "net.minecraft.launchwrapper.Launch",
            "minecraftArguments": "--username ${auth_player_name} --tweakClass Forge"
        }));

        let merged = child.merge_onto(&parent);
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.minecraft.launchwrapper.Launch")
        );
        assert_eq!(merged.required_java_major(), 8);
        assert_eq!(merged.asset_index_id(), Some("1.12"));
        assert_eq!(
            merged.game_arguments(&linux(), &FeatureSet::default()),
            vec!["--username", "${auth_player_name}", "--tweakClass", "Forge"]
        );

        let client = merged.client_artifact().unwrap().unwrap();
        assert_eq!(merged.client_jar_id(), "1.12.2");
        assert_eq!(client.path, PathBuf::from("1.12.2/1.12.2.jar"));
    }

    #[test]
    fn legacy_descriptors_get_default_jvm_arguments() {
        let legacy = descriptor(serde_json::json!({"id": "1.8.9", "minecraftArguments": "--version ${version_name}"}));
        let jvm = legacy.jvm_arguments(&linux(), &FeatureSet::default());
        assert_eq!(jvm[0], "-Djava.library.path=${natives_directory}");
        assert!(jvm.ends_with(&["-cp".to_string(), "${classpath}".to_string()]));

        let mac = PlatformInfo::new(OsName::Osx, "14.0", "arm64", "64");
        assert_eq!(
            legacy.jvm_arguments(&mac, &FeatureSet::default())[0],
            "-XstartOnFirstThread"
        );
    }

    #[test]
    fn modern_child_on_legacy_parent_keeps_classpath() {
        let parent = descriptor(serde_json::json!({
            "id": "1.8.9",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--version ${version_name}"
        }));
        let child = descriptor(serde_json::json!({
            "id": "fabric-loader-1.8.9",
            "inheritsFrom": "1.8.9",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": {"jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]}
        }));

        let merged = child.merge_onto(&parent);
        let jvm = merged.jvm_arguments(&linux(), &FeatureSet::default());
        assert_eq!(jvm[0], "-Djava.library.path=${natives_directory}");
        let cp = jvm.iter().position(|a| a == "-cp").unwrap();
        assert_eq!(jvm[cp + 1], "${classpath}");
        assert_eq!(jvm.last().unwrap(), "-DFabricMcEmu= net.minecraft.client.main.Main ");
        assert_eq!(
            merged.game_arguments(&linux(), &FeatureSet::default()),
            vec!["--version", "${version_name}"]
        );
    }

    #[test]
    fn parse_errors_name_the_version() {
        let err = VersionDescriptor::parse("broken", "{\"libraries\": 3}").unwrap_err();
        match err {
            LauncherError::InvalidDescriptor { id, .. } => assert_eq!(id, "broken"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_java_version_defaults_to_legacy_runtime() {
        let d = descriptor(serde_json::json!({"id": "1.7.10"}));
        assert_eq!(d.required_java_major(), 8);
        assert_eq!(d.client_artifact().unwrap(), None);
    }
}
