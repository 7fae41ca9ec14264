// ─── Version Manifest ───
// Remote catalogue of published versions, cached on disk with a sidecar
// recording when it was last fetched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: LatestVersions,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersions {
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(default)]
    pub release_time: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

/// Sidecar stored next to the cached manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    pub last_update: DateTime<Utc>,
}

impl VersionManifest {
    /// Case-insensitive lookup; the returned entry carries the canonical id.
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions
            .iter()
            .find(|v| v.id.eq_ignore_ascii_case(id))
    }

    /// Official stable versions, newest first as published.
    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }

    pub fn latest_release(&self) -> Option<&VersionEntry> {
        self.latest
            .release
            .as_deref()
            .and_then(|id| self.find_version(id))
    }
}

/// Whether a cache written at `last_update` must be refreshed at `now`.
/// A missing or future timestamp counts as stale.
pub fn is_stale(last_update: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Some(last_update) = last_update else {
        return true;
    };
    match (now - last_update).to_std() {
        Ok(elapsed) => elapsed >= max_age,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> VersionManifest {
        serde_json::from_value(serde_json::json!({
            "latest": {"release": "1.20.4", "snapshot": "24w07a"},
            "versions": [
                {"id": "24w07a", "type": "snapshot", "url": "https://x/24w07a.json", "releaseTime": "2024-02-14T12:00:00+00:00"},
                {"id": "1.20.4", "type": "release", "url": "https://x/1.20.4.json", "sha1": "abc"},
                {"id": "1.20.4-rc1", "type": "snapshot", "url": "https://x/rc1.json"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let m = manifest();
        assert_eq!(m.find_version("24W07A").unwrap().id, "24w07a");
        assert!(m.find_version("1.99").is_none());
    }

    #[test]
    fn releases_and_latest() {
        let m = manifest();
        let releases: Vec<_> = m.releases().into_iter().map(|v| v.id.as_str()).collect();
        assert_eq!(releases, vec!["1.20.4"]);
        assert_eq!(m.latest_release().unwrap().sha1.as_deref(), Some("abc"));
    }

    #[test]
    fn staleness_follows_max_age() {
        let now = Utc::now();
        let twelve_hours = Duration::from_secs(12 * 60 * 60);
        assert!(is_stale(Some(now - chrono::Duration::hours(13)), now, twelve_hours));
        assert!(!is_stale(Some(now - chrono::Duration::hours(1)), now, twelve_hours));
        assert!(is_stale(None, now, twelve_hours));
        assert!(is_stale(Some(now + chrono::Duration::hours(1)), now, twelve_hours));
    }
}
