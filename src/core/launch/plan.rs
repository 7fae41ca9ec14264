// ─── Launch Plan ───
// Everything needed to start the game, assembled from the resolved
// version, libraries, assets and credential. Built fresh per attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::assets::ResolvedAssets;
use crate::core::auth::Credential;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::libraries::{NativesDir, ResolvedLibraries};
use crate::core::platform::PlatformInfo;
use crate::core::rules::FeatureSet;
use crate::core::version::VersionDescriptor;

use super::classpath::{join_classpath, safe_path_str};
use super::substitute::{Substitutions, LAUNCHER_NAME, LAUNCHER_VERSION};
use super::task::append_env_path;

const MIN_EMBEDDED_SECRET_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Per-profile settings supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOverrides {
    /// Java binary to try before any discovered runtime.
    pub runtime: Option<PathBuf>,
    pub min_memory_mb: Option<u32>,
    pub max_memory_mb: Option<u32>,
    pub extra_jvm_args: Vec<String>,
    pub extra_game_args: Vec<String>,
    pub window: Option<WindowSize>,
    pub demo: bool,
}

impl LaunchOverrides {
    pub fn features(&self) -> FeatureSet {
        FeatureSet {
            is_demo_user: self.demo,
            has_custom_resolution: self.window.is_some(),
            ..FeatureSet::default()
        }
    }
}

#[derive(Clone, Serialize)]
pub struct LaunchPlan {
    pub runtime: PathBuf,
    pub jvm_args: Vec<String>,
    pub main_class: String,
    pub game_args: Vec<String>,
    pub classpath: Vec<PathBuf>,
    pub working_dir: PathBuf,
    pub natives_dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Values blanked out whenever the command line is logged.
    #[serde(skip)]
    pub(crate) secrets: Vec<String>,
    /// Keeps `natives_dir` on disk while this plan or its game is alive.
    #[serde(skip)]
    pub(crate) natives_lease: Option<Arc<NativesDir>>,
}

impl std::fmt::Debug for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchPlan")
            .field("runtime", &self.runtime)
            .field("main_class", &self.main_class)
            .field("arguments", &self.redacted_arguments())
            .field("working_dir", &self.working_dir)
            .field("natives_dir", &self.natives_dir)
            .field("env", &self.env)
            .finish()
    }
}

impl LaunchPlan {
    /// Full argument list after the runtime binary.
    pub fn to_arguments(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.jvm_args.len() + 1 + self.game_args.len());
        args.extend(self.jvm_args.iter().cloned());
        args.push(self.main_class.clone());
        args.extend(self.game_args.iter().cloned());
        args
    }

    /// Arguments with secrets blanked. A secret is replaced wherever it
    /// appears only when it is long enough not to collide with ordinary
    /// text; shorter ones (the offline token `0`) only as a whole argument.
    pub fn redacted_arguments(&self) -> Vec<String> {
        self.to_arguments()
            .into_iter()
            .map(|arg| {
                if self.secrets.iter().any(|s| !s.is_empty() && *s == arg) {
                    return "***".to_string();
                }
                self.secrets
                    .iter()
                    .filter(|s| s.len() >= MIN_EMBEDDED_SECRET_LEN)
                    .fold(arg, |acc, secret| acc.replace(secret.as_str(), "***"))
            })
            .collect()
    }

    /// Tie the attempt's natives directory to this plan.
    pub(crate) fn with_natives_lease(mut self, lease: Arc<NativesDir>) -> Self {
        self.natives_lease = Some(lease);
        self
    }
}

/// Resolved inputs of one launch attempt.
pub struct LaunchInputs<'a> {
    pub descriptor: &'a VersionDescriptor,
    pub libraries: &'a ResolvedLibraries,
    pub assets: &'a ResolvedAssets,
    pub credential: &'a Credential,
    pub runtime: &'a Path,
    pub game_dir: &'a Path,
    pub libraries_dir: &'a Path,
    pub platform: &'a PlatformInfo,
    pub overrides: &'a LaunchOverrides,
}

pub fn assemble(inputs: &LaunchInputs<'_>) -> LauncherResult<LaunchPlan> {
    let descriptor = inputs.descriptor;
    let main_class = descriptor
        .main_class
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| missing("main class"))?
        .to_string();
    if inputs.credential.username.trim().is_empty() {
        return Err(missing("credential username"));
    }
    if !inputs.libraries.client_jar.is_file() {
        return Err(missing(&format!(
            "client jar {}",
            inputs.libraries.client_jar.display()
        )));
    }

    let platform = inputs.platform;
    let overrides = inputs.overrides;
    let features = overrides.features();
    let classpath = inputs.libraries.classpath.clone();
    let vars = substitutions(inputs, &classpath);

    let mut jvm_args = Vec::new();
    if let Some(min) = overrides.min_memory_mb {
        jvm_args.push(format!("-Xms{min}M"));
    }
    if let Some(max) = overrides.max_memory_mb {
        jvm_args.push(format!("-Xmx{max}M"));
    }
    jvm_args.extend(vars.apply_all(&descriptor.jvm_arguments(platform, &features)));
    jvm_args.extend(vars.apply_all(&overrides.extra_jvm_args));

    let mut game_args = vars.apply_all(&descriptor.game_arguments(platform, &features));
    game_args.extend(vars.apply_all(&overrides.extra_game_args));

    let natives_dir = inputs.libraries.natives_dir.clone();
    let env_var = platform.library_path_env();
    let env = vec![(
        env_var.to_string(),
        append_env_path(env_var, &safe_path_str(&natives_dir), platform),
    )];

    info!(
        "Assembled launch of {} with {} classpath entries",
        descriptor.id,
        classpath.len()
    );
    let plan = LaunchPlan {
        runtime: inputs.runtime.to_path_buf(),
        jvm_args,
        main_class,
        game_args,
        classpath,
        working_dir: inputs.game_dir.to_path_buf(),
        natives_dir,
        env,
        secrets: vec![
            inputs.credential.access_token.clone(),
            vars.get("auth_session").unwrap_or_default().to_string(),
        ],
        natives_lease: None,
    };
    debug!("{:?}", plan);
    Ok(plan)
}

fn missing(what: &str) -> LauncherError {
    LauncherError::LaunchAssembly {
        missing_input: what.to_string(),
    }
}

fn substitutions(inputs: &LaunchInputs<'_>, classpath: &[PathBuf]) -> Substitutions {
    let credential = inputs.credential;
    let descriptor = inputs.descriptor;
    let assets = inputs.assets;
    let platform = inputs.platform;
    let overrides = inputs.overrides;

    let mut vars = Substitutions::new();
    vars.set("auth_player_name", credential.username.clone())
        .set("auth_uuid", credential.identity_id.clone())
        .set("auth_access_token", credential.access_token.clone())
        .set(
            "auth_session",
            format!("token:{}:{}", credential.access_token, credential.identity_id),
        )
        .set("auth_xuid", credential.xuid.clone().unwrap_or_default())
        .set("clientid", credential.client_id.clone().unwrap_or_default())
        .set("user_type", credential.user_type.clone())
        .set("user_properties", "{}")
        .set("version_name", descriptor.id.clone())
        .set(
            "version_type",
            descriptor.version_type.clone().unwrap_or_else(|| "release".into()),
        )
        .set("game_directory", safe_path_str(inputs.game_dir))
        .set("assets_root", safe_path_str(&assets.assets_root))
        .set("game_assets", safe_path_str(assets.game_assets()))
        .set("assets_index_name", assets.index_id.clone())
        .set("classpath", join_classpath(classpath, platform))
        .set("classpath_separator", platform.classpath_separator())
        .set("natives_directory", safe_path_str(&inputs.libraries.natives_dir))
        .set("library_directory", safe_path_str(inputs.libraries_dir))
        .set("launcher_name", LAUNCHER_NAME)
        .set("launcher_version", LAUNCHER_VERSION);

    if let Some(window) = overrides.window {
        vars.set("resolution_width", window.width.to_string())
            .set("resolution_height", window.height.to_string());
    }
    if let Some(min) = overrides.min_memory_mb {
        vars.set("min_memory", format!("{min}M"));
    }
    if let Some(max) = overrides.max_memory_mb {
        vars.set("max_memory", format!("{max}M"));
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthProvider;
    use crate::core::launch::substitute::KNOWN_PLACEHOLDERS;
    use crate::core::platform::OsName;

    struct Fixture {
        temp: tempfile::TempDir,
        descriptor: VersionDescriptor,
        libraries: ResolvedLibraries,
        assets: ResolvedAssets,
        credential: Credential,
        platform: PlatformInfo,
    }

    fn fixture(descriptor: serde_json::Value) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let client_jar = root.join("versions/1.20.1/1.20.1.jar");
        std::fs::create_dir_all(client_jar.parent().unwrap()).unwrap();
        std::fs::write(&client_jar, b"jar").unwrap();

        let mut credential = Credential::offline("Steve");
        credential.provider = AuthProvider::Microsoft;
        credential.access_token = "secret-token".into();
        credential.user_type = "msa".into();

        Fixture {
            descriptor: serde_json::from_value(descriptor).unwrap(),
            libraries: ResolvedLibraries {
                classpath: vec![root.join("libraries/a.jar"), client_jar.clone()],
                client_jar,
                natives: Vec::new(),
                natives_dir: root.join("natives/attempt"),
            },
            assets: ResolvedAssets {
                index_id: "5".into(),
                assets_root: root.join("assets"),
                legacy_root: None,
                object_count: 0,
            },
            credential,
            platform: PlatformInfo::new(OsName::Linux, "6.1", "x86_64", "64"),
            temp,
        }
    }

    fn modern() -> serde_json::Value {
        serde_json::json!({
            "id": "1.20.1",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": [
                    "--username", "${auth_player_name}",
                    "--accessToken", "${auth_access_token}",
                    "--assetIndex", "${assets_index_name}",
                    "--mystery", "${not_a_placeholder}",
                    { "rules": [{ "action": "allow", "features": { "has_custom_resolution": true } }],
                      "value": ["--width", "${resolution_width}", "--height", "${resolution_height}"] }
                ],
                "jvm": [
                    "-Djava.library.path=${natives_directory}",
                    "-cp", "${classpath}"
                ]
            }
        })
    }

    fn plan_with(fx: &Fixture, overrides: &LaunchOverrides) -> LauncherResult<LaunchPlan> {
        let game_dir = fx.temp.path().join("game");
        let libraries_dir = fx.temp.path().join("libraries");
        assemble(&LaunchInputs {
            descriptor: &fx.descriptor,
            libraries: &fx.libraries,
            assets: &fx.assets,
            credential: &fx.credential,
            runtime: Path::new("/usr/bin/java"),
            game_dir: &game_dir,
            libraries_dir: &libraries_dir,
            platform: &fx.platform,
            overrides,
        })
    }

    #[test]
    fn unknown_placeholder_renders_empty() {
        let fx = fixture(modern());
        let plan = plan_with(&fx, &LaunchOverrides::default()).unwrap();

        let pos = plan.game_args.iter().position(|a| a == "--mystery").unwrap();
        assert_eq!(plan.game_args[pos + 1], "");
        assert!(!plan.game_args.contains(&"--width".to_string()));
        assert_eq!(plan.main_class, "net.minecraft.client.main.Main");
        assert_eq!(plan.game_args[1], "Steve");
        assert_eq!(plan.game_args[5], "5");
    }

    #[test]
    fn classpath_joins_libraries_then_client_jar() {
        let fx = fixture(modern());
        let plan = plan_with(&fx, &LaunchOverrides::default()).unwrap();
        let cp = &plan.jvm_args[plan.jvm_args.iter().position(|a| a == "-cp").unwrap() + 1];
        let parts: Vec<&str> = cp.split(':').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("a.jar"));
        assert!(parts[1].ends_with("1.20.1.jar"));
    }

    #[test]
    fn overrides_shape_the_command() {
        let fx = fixture(modern());
        let overrides = LaunchOverrides {
            min_memory_mb: Some(512),
            max_memory_mb: Some(4096),
            extra_jvm_args: vec!["-XX:+UseG1GC".into()],
            extra_game_args: vec!["--demo-off".into()],
            window: Some(WindowSize {
                width: 1280,
                height: 720,
            }),
            ..LaunchOverrides::default()
        };
        let plan = plan_with(&fx, &overrides).unwrap();

        assert_eq!(&plan.jvm_args[..2], ["-Xms512M", "-Xmx4096M"]);
        assert_eq!(plan.jvm_args.last().unwrap(), "-XX:+UseG1GC");
        assert_eq!(plan.game_args.last().unwrap(), "--demo-off");
        let w = plan.game_args.iter().position(|a| a == "--width").unwrap();
        assert_eq!(plan.game_args[w + 1], "1280");
        assert_eq!(plan.game_args[w + 3], "720");

        let args = plan.to_arguments();
        let main = args.iter().position(|a| a == &plan.main_class).unwrap();
        assert_eq!(main, plan.jvm_args.len());
    }

    #[test]
    fn every_known_placeholder_is_filled_when_overrides_are_complete() {
        let fx = fixture(modern());
        let overrides = LaunchOverrides {
            min_memory_mb: Some(512),
            max_memory_mb: Some(2048),
            window: Some(WindowSize {
                width: 854,
                height: 480,
            }),
            ..LaunchOverrides::default()
        };
        let game_dir = fx.temp.path().join("game");
        let libraries_dir = fx.temp.path().join("libraries");
        let inputs = LaunchInputs {
            descriptor: &fx.descriptor,
            libraries: &fx.libraries,
            assets: &fx.assets,
            credential: &fx.credential,
            runtime: Path::new("/usr/bin/java"),
            game_dir: &game_dir,
            libraries_dir: &libraries_dir,
            platform: &fx.platform,
            overrides: &overrides,
        };
        let vars = substitutions(&inputs, &fx.libraries.classpath);
        for name in KNOWN_PLACEHOLDERS {
            assert!(vars.get(name).is_some(), "{name} has no value");
        }
    }

    #[test]
    fn tokens_are_redacted_from_debug_output() {
        let fx = fixture(modern());
        let plan = plan_with(&fx, &LaunchOverrides::default()).unwrap();
        assert!(plan.to_arguments().contains(&"secret-token".to_string()));
        assert!(!format!("{plan:?}").contains("secret-token"));
    }

    #[test]
    fn offline_token_only_redacts_whole_arguments() {
        let mut fx = fixture(modern());
        fx.credential = Credential::offline("Steve");
        let overrides = LaunchOverrides {
            max_memory_mb: Some(2048),
            ..LaunchOverrides::default()
        };
        let plan = plan_with(&fx, &overrides).unwrap();
        let redacted = plan.redacted_arguments();

        assert_eq!(redacted[0], "-Xmx2048M");
        let pos = redacted.iter().position(|a| a == "--accessToken").unwrap();
        assert_eq!(redacted[pos + 1], "***");
    }

    #[test]
    fn legacy_descriptor_gets_default_jvm_arguments() {
        let fx = fixture(serde_json::json!({
            "id": "1.7.10",
            "mainClass": "net.minecraft.client.main.Main",
            "minecraftArguments": "--username ${auth_player_name} --session ${auth_session}"
        }));
        let plan = plan_with(&fx, &LaunchOverrides::default()).unwrap();
        assert!(plan
            .jvm_args
            .iter()
            .any(|a| a.starts_with("-Djava.library.path=") && a.ends_with("attempt")));
        assert!(plan.jvm_args.contains(&"-cp".to_string()));
        assert_eq!(plan.game_args[3], format!("token:secret-token:{}", fx.credential.identity_id));
    }

    #[test]
    fn library_path_env_points_at_natives() {
        let fx = fixture(modern());
        let plan = plan_with(&fx, &LaunchOverrides::default()).unwrap();
        assert_eq!(plan.env[0].0, "LD_LIBRARY_PATH");
        assert!(plan.env[0].1.starts_with(&safe_path_str(&fx.libraries.natives_dir)));
    }

    #[test]
    fn missing_inputs_are_reported() {
        let mut fx = fixture(modern());
        fx.descriptor.main_class = None;
        let err = plan_with(&fx, &LaunchOverrides::default()).unwrap_err();
        assert!(matches!(err, LauncherError::LaunchAssembly { ref missing_input } if missing_input == "main class"));

        let mut fx = fixture(modern());
        fx.credential.username = "  ".into();
        let err = plan_with(&fx, &LaunchOverrides::default()).unwrap_err();
        assert!(matches!(err, LauncherError::LaunchAssembly { .. }));

        let fx = fixture(modern());
        std::fs::remove_file(&fx.libraries.client_jar).unwrap();
        let err = plan_with(&fx, &LaunchOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("client jar"));
    }
}
