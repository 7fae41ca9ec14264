use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::error::{LauncherError, LauncherResult};

/// A library coordinate as written in version descriptors.
///
/// Supported formats:
///   `group:artifact:version`
///   `group:artifact:version:classifier`
///   either of the above with an `@extension` suffix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MavenCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension. Defaults to `"jar"`.
    pub extension: String,
}

impl MavenCoordinate {
    pub fn parse(coord: &str) -> LauncherResult<Self> {
        let (coord_part, extension) = match coord.rsplit_once('@') {
            Some((head, ext)) => (head, ext),
            None => (coord, "jar"),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty()) || extension.is_empty() {
            return Err(LauncherError::InvalidMavenCoordinate(coord.to_string()));
        }

        let classifier = match parts.len() {
            3 => None,
            4 => Some(parts[3].to_string()),
            _ => return Err(LauncherError::InvalidMavenCoordinate(coord.to_string())),
        };

        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// Same coordinate with a different classifier (used for native jars).
    pub fn with_classifier(&self, classifier: &str) -> Self {
        let mut clone = self.clone();
        clone.classifier = Some(classifier.to_string());
        clone
    }

    /// `org.lwjgl` → `org/lwjgl`
    pub fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }

    /// `artifact-version[-classifier].extension`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        }
    }

    /// Path relative to a repository root, using `/` separators.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_path(),
            self.artifact,
            self.version,
            self.filename()
        )
    }

    /// `<repo>/<group_path>/<artifact>/<version>/<filename>`
    pub fn url(&self, repo_base: &str) -> String {
        format!(
            "{}/{}",
            repo_base.trim_end_matches('/'),
            self.repository_path()
        )
    }

    /// Location inside the libraries directory.
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.group_path())
            .join(&self.artifact)
            .join(&self.version)
            .join(self.filename())
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_coordinate() {
        let c = MavenCoordinate::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        assert_eq!(c.group, "net.sf.jopt-simple");
        assert_eq!(c.artifact, "jopt-simple");
        assert_eq!(c.version, "5.0.4");
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "jar");
    }

    #[test]
    fn parse_with_classifier_and_extension() {
        let c = MavenCoordinate::parse("org.lwjgl:lwjgl:3.3.3:natives-windows").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("natives-windows"));

        let zip = MavenCoordinate::parse("com.example:data:1.0@zip").unwrap();
        assert_eq!(zip.extension, "zip");
        assert_eq!(zip.to_string(), "com.example:data:1.0@zip");
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(MavenCoordinate::parse("only:two").is_err());
        assert!(MavenCoordinate::parse("a::1.0").is_err());
        assert!(MavenCoordinate::parse("a:b:c:d:e").is_err());
    }

    #[test]
    fn url_and_local_path() {
        let c = MavenCoordinate::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        assert_eq!(
            c.url("https://libraries.minecraft.net/"),
            "https://libraries.minecraft.net/net/sf/jopt-simple/jopt-simple/5.0.4/jopt-simple-5.0.4.jar"
        );

        let native = MavenCoordinate::parse("org.lwjgl:lwjgl:3.3.3")
            .unwrap()
            .with_classifier("natives-linux");
        assert_eq!(
            native.local_path(),
            PathBuf::from("org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3-natives-linux.jar")
        );
    }
}
