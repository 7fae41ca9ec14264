// ─── Version Directory ───
// Resolves version ids to typed descriptors: manifest lookup, local descriptor
// cache with integrity checks, and `inheritsFrom` chains.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::config::{LauncherConfig, LauncherPaths};
use crate::core::downloader::hash::validate_file;
use crate::core::downloader::{write_atomic, ArtifactFetcher, ContentHash};
use crate::core::error::{LauncherError, LauncherResult};

use super::manifest::{is_stale, ManifestMeta, VersionEntry, VersionManifest};
use super::version_file::{merge, VersionDescriptor};

pub struct VersionDirectory {
    fetcher: ArtifactFetcher,
    paths: LauncherPaths,
    manifest_url: String,
    max_age: Duration,
    manifest: Option<(VersionManifest, DateTime<Utc>)>,
    descriptors: HashMap<String, VersionDescriptor>,
}

impl VersionDirectory {
    pub fn new(fetcher: ArtifactFetcher, config: &LauncherConfig) -> Self {
        Self {
            fetcher,
            paths: config.paths(),
            manifest_url: config.endpoints.version_manifest.clone(),
            max_age: config.manifest_max_age(),
            manifest: None,
            descriptors: HashMap::new(),
        }
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    // ── Manifest ────────────────────────────────────────

    /// Manifest no older than `max_age`, from memory, disk or network.
    ///
    /// When the network is unreachable an on-disk copy is used even if stale.
    pub async fn load_manifest(&mut self, max_age: Duration) -> LauncherResult<&VersionManifest> {
        let now = Utc::now();
        let fresh_in_memory = match &self.manifest {
            Some((_, loaded_at)) => !is_stale(Some(*loaded_at), now, max_age),
            None => false,
        };

        if !fresh_in_memory {
            let loaded = self.read_or_fetch_manifest(now, max_age).await?;
            self.manifest = Some(loaded);
        }

        self.manifest
            .as_ref()
            .map(|(manifest, _)| manifest)
            .ok_or_else(|| LauncherError::Other("Version manifest unavailable".into()))
    }

    /// Manifest using the configured maximum age.
    pub async fn manifest(&mut self) -> LauncherResult<&VersionManifest> {
        let max_age = self.max_age;
        self.load_manifest(max_age).await
    }

    async fn read_or_fetch_manifest(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> LauncherResult<(VersionManifest, DateTime<Utc>)> {
        let manifest_path = self.paths.manifest_file();
        let last_update = read_meta(&self.paths.manifest_meta_file()).await;

        if !is_stale(last_update, now, max_age) {
            match read_manifest(&manifest_path).await {
                Some(manifest) => {
                    debug!("Using cached version manifest");
                    return Ok((manifest, last_update.unwrap_or(now)));
                }
                None => debug!("Cached manifest unreadable, fetching"),
            }
        }

        info!("Fetching version manifest from {}", self.manifest_url);
        let raw = match self.fetcher.fetch_text(&self.manifest_url).await {
            Ok(raw) => raw,
            Err(err) => {
                if let Some(manifest) = read_manifest(&manifest_path).await {
                    warn!("Manifest refresh failed ({}), using stale copy", err);
                    return Ok((manifest, now));
                }
                return Err(err);
            }
        };

        let manifest: VersionManifest = serde_json::from_str(&raw)?;
        write_atomic(&manifest_path, raw.into_bytes()).await?;
        let meta = serde_json::to_vec_pretty(&ManifestMeta { last_update: now })?;
        write_atomic(&self.paths.manifest_meta_file(), meta).await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok((manifest, now))
    }

    // ── Descriptors ─────────────────────────────────────

    /// Typed descriptor for `id` (case-insensitive).
    ///
    /// The cached copy is used when its digest matches the manifest; otherwise
    /// it is refetched. Versions absent from the manifest are read from the
    /// local versions directory (installed mod loaders).
    pub async fn resolve_version(&mut self, id: &str) -> LauncherResult<VersionDescriptor> {
        let lookup = self
            .manifest()
            .await
            .map(|manifest| manifest.find_version(id).cloned());
        let entry = match lookup {
            Ok(entry) => entry,
            Err(err) => {
                if tokio::fs::try_exists(self.paths.version_json(id))
                    .await
                    .unwrap_or(false)
                {
                    warn!("Manifest unavailable ({}), using local descriptor for {}", err, id);
                    None
                } else {
                    return Err(err);
                }
            }
        };

        let Some(entry) = entry else {
            return self.resolve_local(id).await;
        };

        if let Some(cached) = self.descriptors.get(&entry.id) {
            return Ok(cached.clone());
        }

        let path = self.paths.version_json(&entry.id);
        let expected = entry.sha1.as_deref().and_then(ContentHash::parse);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let trusted = match (&expected, self.fetcher.validation_enabled()) {
                (Some(hash), true) => validate_file(&path, hash).await?,
                _ => true,
            };
            if trusted {
                match read_descriptor(&entry.id, &path).await {
                    Ok(descriptor) => return Ok(self.remember(descriptor)),
                    Err(err) => warn!("Discarding unreadable descriptor {:?}: {}", path, err),
                }
            } else {
                warn!("Cached descriptor for {} is stale, refetching", entry.id);
            }
        }

        let descriptor = self.download_descriptor(&entry, expected.as_ref()).await?;
        Ok(self.remember(descriptor))
    }

    /// Drop the cached descriptor so the next resolve downloads it again.
    pub async fn invalidate(&mut self, id: &str) -> LauncherResult<()> {
        self.descriptors
            .retain(|known, _| !known.eq_ignore_ascii_case(id));
        let path = self.paths.version_json(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    /// Descriptor for `id` with every ancestor merged in, root first.
    pub async fn resolve_version_chain(&mut self, id: &str) -> LauncherResult<VersionDescriptor> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            if !seen.insert(current.to_ascii_lowercase()) {
                return Err(LauncherError::InvalidDescriptor {
                    id: current,
                    reason: "inheritsFrom forms a cycle".into(),
                });
            }
            let descriptor = self.resolve_version(&current).await?;
            next = descriptor.inherits_from.clone();
            chain.push(descriptor);
        }

        let mut ancestors = chain.into_iter().rev();
        let Some(mut merged) = ancestors.next() else {
            return Err(LauncherError::VersionNotFound(id.to_string()));
        };
        for child in ancestors {
            debug!("Merging {} onto {}", child.id, merged.id);
            merged = merge(&merged, &child);
        }
        Ok(merged)
    }

    async fn resolve_local(&mut self, id: &str) -> LauncherResult<VersionDescriptor> {
        let path = self.paths.version_json(id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LauncherError::VersionNotFound(id.to_string()));
        }
        let descriptor = read_descriptor(id, &path).await?;
        Ok(self.remember(descriptor))
    }

    async fn download_descriptor(
        &self,
        entry: &VersionEntry,
        expected: Option<&ContentHash>,
    ) -> LauncherResult<VersionDescriptor> {
        let mut attempts_left = 2;
        let raw = loop {
            attempts_left -= 1;
            let raw = self.fetcher.fetch_text(&entry.url).await?;
            let Some(expected) = expected else { break raw };

            let mut hasher = expected.hasher();
            hasher.update(raw.as_bytes());
            let actual = hasher.finalize_hex();
            if expected.matches(&actual) {
                break raw;
            }

            let err = LauncherError::Integrity {
                artifact: format!("version {}", entry.id),
                expected: expected.hex.clone(),
                actual,
            };
            if attempts_left == 0 {
                return Err(err);
            }
            warn!("{}; fetching again", err);
        };

        let descriptor = VersionDescriptor::parse(&entry.id, &raw)?;
        write_atomic(&self.paths.version_json(&entry.id), raw.into_bytes()).await?;
        info!("Fetched descriptor for {}", entry.id);
        Ok(descriptor)
    }

    fn remember(&mut self, descriptor: VersionDescriptor) -> VersionDescriptor {
        self.descriptors
            .insert(descriptor.id.clone(), descriptor.clone());
        descriptor
    }
}

async fn read_meta(path: &Path) -> Option<DateTime<Utc>> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str::<ManifestMeta>(&raw)
        .ok()
        .map(|meta| meta.last_update)
}

async fn read_manifest(path: &Path) -> Option<VersionManifest> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&raw).ok()
}

async fn read_descriptor(id: &str, path: &Path) -> LauncherResult<VersionDescriptor> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    VersionDescriptor::parse(id, &raw)
}
