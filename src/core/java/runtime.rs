use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::core::config::LauncherPaths;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::PlatformInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// Where a candidate binary came from, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaSource {
    Override,
    Managed,
    JavaHome,
    SystemPath,
}

/// Finds a Java binary able to run a given version.
#[derive(Debug, Clone)]
pub struct JavaLocator {
    runtimes_dir: PathBuf,
    executable: &'static str,
    override_path: Option<PathBuf>,
    java_home: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl JavaLocator {
    pub fn new(paths: &LauncherPaths, platform: &PlatformInfo) -> Self {
        Self {
            runtimes_dir: paths.runtimes_dir(),
            executable: platform.java_executable(),
            override_path: None,
            java_home: std::env::var_os("JAVA_HOME").map(PathBuf::from),
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path;
        self
    }

    /// Replace the captured `JAVA_HOME` and `PATH`.
    pub fn with_environment(mut self, java_home: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        self.java_home = java_home;
        self.search_path = search_path;
        self
    }

    pub fn candidates(&self, required_major: u32) -> Vec<(JavaSource, PathBuf)> {
        let mut out = Vec::new();
        if let Some(path) = &self.override_path {
            out.push((JavaSource::Override, path.clone()));
        }

        let managed_root = managed_runtime_dir(&self.runtimes_dir, required_major);
        if let Some(bin) = locate_java_binary(&managed_root, self.executable) {
            out.push((JavaSource::Managed, bin));
        }

        if let Some(home) = &self.java_home {
            out.push((JavaSource::JavaHome, home.join("bin").join(self.executable)));
        }

        if let Some(search) = &self.search_path {
            if let Some(bin) = std::env::split_paths(search)
                .map(|dir| dir.join(self.executable))
                .find(|p| p.is_file())
            {
                out.push((JavaSource::SystemPath, bin));
            }
        }

        out.dedup_by(|a, b| a.1 == b.1);
        out
    }

    /// First candidate whose probed major satisfies `required_major`.
    #[instrument(skip(self))]
    pub async fn locate(&self, required_major: u32) -> LauncherResult<JavaInstallation> {
        for (source, path) in self.candidates(required_major) {
            let Some(found) = probe_java(&path).await else {
                debug!("{:?} candidate {:?} is not a usable Java binary", source, path);
                continue;
            };
            if is_java_compatible_major(found.major, required_major) {
                info!(
                    "Using Java {} ({}) from {:?}: {:?}",
                    found.version, found.vendor, source, found.path
                );
                return Ok(found);
            }
            if source == JavaSource::Override {
                warn!(
                    "Configured Java {:?} is version {}, Java {} required; ignoring it",
                    path, found.major, required_major
                );
            } else {
                debug!(
                    "{:?} candidate {:?} is Java {}, need {}",
                    source, path, found.major, required_major
                );
            }
        }
        Err(LauncherError::JavaNotFound(required_major))
    }
}

pub fn managed_runtime_dir(runtimes_dir: &Path, major: u32) -> PathBuf {
    runtimes_dir.join(format!("java-{major}"))
}

/// Java major a game version runs on when its descriptor does not say.
pub fn required_java_for_game_version(game_version: &str) -> u32 {
    let lower = game_version.to_ascii_lowercase();
    // Weekly snapshots look like `24w14a`.
    if let Some(week_pos) = lower.find('w') {
        let year_hint = &lower[..week_pos];
        if year_hint.len() == 2 {
            if let Ok(snapshot_year) = year_hint.parse::<u32>() {
                return if snapshot_year >= 24 { 21 } else { 17 };
            }
        }
    }

    let mut parts = game_version.split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(1);
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    let patch = parts
        .next()
        .and_then(|p| p.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(0);

    if major > 1 || minor >= 21 || (minor == 20 && patch >= 5) {
        21
    } else if minor >= 18 {
        17
    } else if minor == 17 {
        16
    } else {
        8
    }
}

fn runtime_track(major: u32) -> u32 {
    if major <= 8 {
        8
    } else if major >= 21 {
        21
    } else {
        17
    }
}

/// Old versions break on newer Java, so 8 only accepts 8. Newer
/// requirements accept anything at or above them within the same track.
pub fn is_java_compatible_major(installed_major: u32, required_major: u32) -> bool {
    if required_major <= 8 {
        return installed_major == 8;
    }
    installed_major >= required_major
        && runtime_track(installed_major) >= runtime_track(required_major)
}

fn locate_java_binary(runtime_root: &Path, executable: &str) -> Option<PathBuf> {
    let primary = runtime_root.join("bin").join(executable);
    if primary.is_file() {
        return Some(primary);
    }
    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(executable);
    mac_layout.is_file().then_some(mac_layout)
}

/// Run `<path> -XshowSettings:properties -version` and parse what it prints.
pub async fn probe_java(path: &Path) -> Option<JavaInstallation> {
    let output = Command::new(path)
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .await
        .ok()?;
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!("Probing {:?}: {}", path, text.lines().next().unwrap_or(""));
    parse_probe_output(path, &text)
}

fn parse_probe_output(path: &Path, text: &str) -> Option<JavaInstallation> {
    let version = parse_version_string(text)?;
    let major = parse_major_version(&version);
    if major == 0 {
        return None;
    }
    let lower = text.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64")
        || lower.contains("64-bit");

    Some(JavaInstallation {
        path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        version,
        major,
        is_64bit,
        vendor: parse_vendor(text),
    })
}

fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        if !line.contains("version") {
            return None;
        }
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_392` → 8, `17.0.9` → 17, `21` → 21.
fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if first == 1 {
        parts.next().and_then(|p| p.parse().ok()).unwrap_or(first)
    } else {
        first
    }
}

fn parse_vendor(output: &str) -> String {
    for (needle, vendor) in [
        ("Temurin", "Temurin"),
        ("Adoptium", "Adoptium"),
        ("Zulu", "Zulu"),
        ("GraalVM", "GraalVM"),
        ("OpenJDK", "OpenJDK"),
        ("Java(TM)", "Oracle"),
    ] {
        if output.contains(needle) {
            return vendor.to_string();
        }
    }
    "unknown".to_string()
}
