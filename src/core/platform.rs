// ─── Platform ───
// Facts about the host that rules and native classifiers are evaluated against.
// Detected once at startup and passed explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OS names as they appear in version descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsName {
    Windows,
    Osx,
    Linux,
}

impl OsName {
    pub fn as_str(self) -> &'static str {
        match self {
            OsName::Windows => "windows",
            OsName::Osx => "osx",
            OsName::Linux => "linux",
        }
    }

    fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsName::Windows
        } else if cfg!(target_os = "macos") {
            OsName::Osx
        } else {
            OsName::Linux
        }
    }
}

impl fmt::Display for OsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: OsName,
    pub os_version: String,
    /// Architecture name used by `os.arch` rule conditions (`x86`, `x86_64`, `arm64`, `arm32`).
    pub arch: String,
    /// Substituted for `${arch}` in native classifiers.
    pub pointer_width: String,
}

impl PlatformInfo {
    pub fn new(
        os: OsName,
        os_version: impl Into<String>,
        arch: impl Into<String>,
        pointer_width: impl Into<String>,
    ) -> Self {
        Self {
            os,
            os_version: os_version.into(),
            arch: arch.into(),
            pointer_width: pointer_width.into(),
        }
    }

    /// Probe the running host.
    pub fn detect() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86" => "x86",
            "x86_64" => "x86_64",
            "aarch64" => "arm64",
            "arm" => "arm32",
            other => other,
        };
        let pointer_width = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        let os_version = sysinfo::System::os_version().unwrap_or_default();

        let info = Self::new(OsName::current(), os_version, arch, pointer_width);
        tracing::debug!(
            "Detected platform: os={} version={} arch={}",
            info.os,
            info.os_version,
            info.arch
        );
        info
    }

    /// Separator Java expects between classpath entries.
    pub fn classpath_separator(&self) -> &'static str {
        match self.os {
            OsName::Windows => ";",
            OsName::Osx | OsName::Linux => ":",
        }
    }

    /// Environment variable the dynamic loader searches for native libraries.
    pub fn library_path_env(&self) -> &'static str {
        match self.os {
            OsName::Windows => "PATH",
            OsName::Osx => "DYLD_LIBRARY_PATH",
            OsName::Linux => "LD_LIBRARY_PATH",
        }
    }

    pub fn java_executable(&self) -> &'static str {
        match self.os {
            OsName::Windows => "java.exe",
            OsName::Osx | OsName::Linux => "java",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_matches_compile_target() {
        let platform = PlatformInfo::detect();
        if cfg!(target_os = "linux") {
            assert_eq!(platform.os, OsName::Linux);
            assert_eq!(platform.classpath_separator(), ":");
            assert_eq!(platform.library_path_env(), "LD_LIBRARY_PATH");
        }
        assert!(platform.pointer_width == "64" || platform.pointer_width == "32");
    }

    #[test]
    fn os_names_serialize_like_descriptors() {
        assert_eq!(serde_json::to_string(&OsName::Osx).unwrap(), "\"osx\"");
        let parsed: OsName = serde_json::from_str("\"windows\"").unwrap();
        assert_eq!(parsed, OsName::Windows);
        assert_eq!(
            PlatformInfo::new(OsName::Windows, "10.0", "x86_64", "64").classpath_separator(),
            ";"
        );
    }
}
