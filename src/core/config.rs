// ─── Configuration ───
// Knobs the core reads. Persisting them is the settings layer's job; the core
// only loads an optional JSON override and falls back to defaults.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "InterfaceLauncher";
const MAX_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources_base: String,
    pub libraries_base: String,
    pub legacy_auth_base: String,
    pub oauth_authorize: String,
    pub oauth_token: String,
    pub oauth_client_id: String,
    pub oauth_redirect_uri: String,
    pub oauth_scope: String,
    pub xbl_authenticate: String,
    pub xsts_authorize: String,
    pub game_login: String,
    pub entitlements: String,
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
            resources_base: "https://resources.download.minecraft.net".into(),
            libraries_base: "https://libraries.minecraft.net".into(),
            legacy_auth_base: "https://authserver.mojang.com".into(),
            oauth_authorize: "https://login.live.com/oauth20_authorize.srf".into(),
            oauth_token: "https://login.live.com/oauth20_token.srf".into(),
            oauth_client_id: "00000000402B5328".into(),
            oauth_redirect_uri: "https://login.live.com/oauth20_desktop.srf".into(),
            oauth_scope: "service::user.auth.xboxlive.com::MBI_SSL".into(),
            xbl_authenticate: "https://user.auth.xboxlive.com/user/authenticate".into(),
            xsts_authorize: "https://xsts.auth.xboxlive.com/xsts/authorize".into(),
            game_login: "https://api.minecraftservices.com/authentication/login_with_xbox"
                .into(),
            entitlements: "https://api.minecraftservices.com/entitlements/mcstore".into(),
            profile: "https://api.minecraftservices.com/minecraft/profile".into(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at `base` (used by local fixtures and mirrors).
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{base}/mc/game/version_manifest_v2.json"),
            resources_base: format!("{base}/resources"),
            libraries_base: format!("{base}/libraries"),
            legacy_auth_base: format!("{base}/authserver"),
            oauth_authorize: format!("{base}/oauth20_authorize.srf"),
            oauth_token: format!("{base}/oauth20_token.srf"),
            xbl_authenticate: format!("{base}/user/authenticate"),
            xsts_authorize: format!("{base}/xsts/authorize"),
            game_login: format!("{base}/authentication/login_with_xbox"),
            entitlements: format!("{base}/entitlements/mcstore"),
            profile: format!("{base}/minecraft/profile"),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub data_dir: PathBuf,
    /// Parallel transfers per batch.
    pub concurrency: usize,
    /// When false, existing files are trusted without re-hashing.
    pub validate_downloads: bool,
    pub manifest_max_age_secs: u64,
    pub download_retries: u32,
    pub retry_backoff_ms: u64,
    pub endpoints: Endpoints,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            concurrency: 8,
            validate_downloads: true,
            manifest_max_age_secs: 12 * 60 * 60,
            download_retries: 3,
            retry_backoff_ms: 250,
            endpoints: Endpoints::default(),
        }
    }
}

impl LauncherConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read a JSON override if one exists at `path`, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> LauncherResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No launcher config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(LauncherError::io(path, e)),
        };

        let config: LauncherConfig = serde_json::from_str(&raw)?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            warn!(
                "Concurrency {} out of range, clamping to 1..={}",
                self.concurrency, MAX_CONCURRENCY
            );
            self.concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        }
        self
    }

    pub fn manifest_max_age(&self) -> Duration {
        Duration::from_secs(self.manifest_max_age_secs)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn paths(&self) -> LauncherPaths {
        LauncherPaths::new(self.data_dir.clone())
    }
}

/// On-disk layout shared by every launch attempt.
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    root: PathBuf,
}

impl LauncherPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join("version_manifest_v2.json")
    }

    pub fn manifest_meta_file(&self) -> PathBuf {
        self.root.join("version_manifest_v2.meta.json")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_json(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id).join(format!("{id}.json"))
    }

    pub fn version_jar(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id).join(format!("{id}.jar"))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index_file(&self, index_id: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{index_id}.json"))
    }

    /// Content-addressed object path, sharded by the first two hex digits.
    pub fn asset_object(&self, hash: &str) -> PathBuf {
        let shard = hash.get(..2).unwrap_or(hash);
        self.assets_dir().join("objects").join(shard).join(hash)
    }

    pub fn virtual_assets_dir(&self, index_id: &str) -> PathBuf {
        self.assets_dir().join("virtual").join(index_id)
    }

    /// Per-attempt natives directory.
    pub fn natives_dir(&self, attempt_id: &str) -> PathBuf {
        self.root.join("natives").join(attempt_id)
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.root.join("runtimes")
    }
}

/// True for a non-empty relative path that stays inside whatever directory
/// it is joined onto: no root, drive prefix, `.` or `..`.
pub fn is_store_relative(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load_or_default(&temp.path().join("nope.json")).unwrap();
        assert_eq!(config.concurrency, 8);
        assert!(config.validate_downloads);
        assert_eq!(config.manifest_max_age(), Duration::from_secs(43_200));
    }

    #[test]
    fn partial_override_keeps_other_defaults_and_clamps() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("launcher.json");
        std::fs::write(
            &path,
            r#"{ "concurrency": 64, "validate_downloads": false, "data_dir": "/srv/launcher" }"#,
        )
        .unwrap();

        let config = LauncherConfig::load_or_default(&path).unwrap();
        assert_eq!(config.concurrency, 16);
        assert!(!config.validate_downloads);
        assert_eq!(config.data_dir, PathBuf::from("/srv/launcher"));
        assert_eq!(config.download_retries, 3);
        assert!(config.endpoints.xsts_authorize.contains("xsts"));
    }

    #[test]
    fn store_relative_paths_stay_inside() {
        assert!(is_store_relative(Path::new("org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1.jar")));
        assert!(!is_store_relative(Path::new("")));
        assert!(!is_store_relative(Path::new("/etc/passwd")));
        assert!(!is_store_relative(Path::new("a/../../escape.jar")));
        assert!(!is_store_relative(Path::new("./a.jar")));
    }

    #[test]
    fn asset_objects_are_sharded_by_hash_prefix() {
        let paths = LauncherPaths::new(PathBuf::from("/data"));
        assert_eq!(
            paths.asset_object("abcdef0123"),
            PathBuf::from("/data/assets/objects/ab/abcdef0123")
        );
        assert_eq!(
            paths.version_jar("1.20.4"),
            PathBuf::from("/data/versions/1.20.4/1.20.4.jar")
        );
    }
}
