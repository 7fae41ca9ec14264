// ─── Asset Index ───
// Asset index JSON plus the content-addressed object store under
// `assets/objects/<first two hex digits>/<hash>`. Old indexes additionally
// want the objects laid out under their logical names.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::{is_store_relative, LauncherConfig, LauncherPaths};
use crate::core::downloader::hash::hash_file_blocking;
use crate::core::downloader::{Artifact, ArtifactFetcher, ByteCounter, ContentHash, FetchJob};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::VersionDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
    /// Objects must also be mirrored under `assets/virtual/<index id>/`.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    /// Objects must also be mirrored under `<game dir>/resources/`.
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssets {
    pub index_id: String,
    pub assets_root: PathBuf,
    /// Name-addressed copy for indexes that need one.
    pub legacy_root: Option<PathBuf>,
    pub object_count: usize,
}

impl ResolvedAssets {
    /// Directory passed to the game as `${game_assets}`.
    pub fn game_assets(&self) -> &Path {
        self.legacy_root.as_deref().unwrap_or(&self.assets_root)
    }
}

pub struct AssetResolver {
    fetcher: ArtifactFetcher,
    paths: LauncherPaths,
    resources_base: String,
}

impl AssetResolver {
    pub fn new(fetcher: ArtifactFetcher, config: &LauncherConfig) -> Self {
        Self {
            fetcher,
            paths: config.paths(),
            resources_base: config.endpoints.resources_base.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the index named by `descriptor` and every object it lists.
    pub async fn resolve(
        &self,
        descriptor: &VersionDescriptor,
        game_dir: &Path,
        progress: &ByteCounter,
    ) -> LauncherResult<ResolvedAssets> {
        let index_id = descriptor
            .asset_index_id()
            .ok_or_else(|| LauncherError::InvalidDescriptor {
                id: descriptor.id.clone(),
                reason: "no asset index".into(),
            })?
            .to_string();
        let index_path = self.paths.asset_index_file(&index_id);

        match &descriptor.asset_index {
            Some(info) => {
                let artifact = Artifact {
                    id: format!("asset index {}", info.id),
                    url: Some(info.url.clone()),
                    hash: ContentHash::sha1(info.sha1.clone()),
                    size: info.size,
                    path: PathBuf::from("indexes").join(format!("{}.json", info.id)),
                };
                self.fetcher.fetch(&artifact, &index_path, progress).await?;
            }
            None if tokio::fs::try_exists(&index_path).await.unwrap_or(false) => {
                debug!("Using locally provided asset index {}", index_id);
            }
            None => {
                return Err(LauncherError::InvalidDescriptor {
                    id: descriptor.id.clone(),
                    reason: format!("asset index {index_id} has no download and is not installed"),
                })
            }
        }

        let index = read_index(&index_path).await?;
        let jobs = self.object_jobs(&index)?;
        info!(
            "Asset index {}: {} objects ({} unique)",
            index_id,
            index.objects.len(),
            jobs.len()
        );
        self.fetcher.fetch_batch(jobs, progress).await?;

        let legacy_root = if index.is_virtual {
            Some(self.paths.virtual_assets_dir(&index_id))
        } else if index.map_to_resources {
            Some(game_dir.join("resources"))
        } else {
            None
        };
        if let Some(root) = &legacy_root {
            mirror_objects(&self.paths, &index, root).await?;
        }

        Ok(ResolvedAssets {
            index_id,
            assets_root: self.paths.assets_dir(),
            legacy_root,
            object_count: index.objects.len(),
        })
    }

    fn object_jobs(&self, index: &AssetIndex) -> LauncherResult<Vec<FetchJob>> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for (name, object) in &index.objects {
            if !seen.insert(object.hash.as_str()) {
                continue;
            }
            let hash = ContentHash::sha1(object.hash.clone());
            if !hash.is_well_formed() {
                return Err(LauncherError::InvalidDescriptor {
                    id: name.clone(),
                    reason: format!("malformed asset hash {:?}", object.hash),
                });
            }
            let shard = &hash.hex[..2];
            let artifact = Artifact {
                id: name.clone(),
                url: Some(format!("{}/{}/{}", self.resources_base, shard, hash.hex)),
                size: Some(object.size),
                path: PathBuf::from("objects").join(shard).join(&hash.hex),
                hash,
            };
            let dest = self.paths.asset_object(&artifact.hash.hex);
            jobs.push(FetchJob::new(artifact, dest));
        }
        Ok(jobs)
    }
}

async fn read_index(path: &Path) -> LauncherResult<AssetIndex> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Lay objects out under their logical names: hard link, or copy where
/// linking is not possible (different volume, unsupported filesystem).
/// Every name is swapped in with a rename so readers never see a partial file.
async fn mirror_objects(paths: &LauncherPaths, index: &AssetIndex, root: &Path) -> LauncherResult<()> {
    let pairs: Vec<(PathBuf, PathBuf, ContentHash)> = index
        .objects
        .iter()
        .filter(|(name, _)| is_store_relative(Path::new(name.as_str())))
        .map(|(name, object)| {
            let hash = ContentHash::sha1(object.hash.clone());
            (paths.asset_object(&hash.hex), root.join(name), hash)
        })
        .collect();
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut placed = 0;
        for (source, dest, hash) in &pairs {
            let current = dest.is_file()
                && hash_file_blocking(dest, hash.algorithm)
                    .map(|actual| hash.matches(&actual))
                    .unwrap_or(false);
            if current {
                continue;
            }
            mirror_one(source, dest)?;
            placed += 1;
        }
        debug!("Mirrored {} assets into {:?} ({} updated)", pairs.len(), root, placed);
        Ok::<(), LauncherError>(())
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

fn mirror_one(source: &Path, dest: &Path) -> LauncherResult<()> {
    let parent = dest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent).map_err(|e| LauncherError::io(&parent, e))?;

    let link = parent.join(format!(".mirror-{}", Uuid::new_v4().simple()));
    if std::fs::hard_link(source, &link).is_ok() {
        return std::fs::rename(&link, dest).map_err(|e| {
            let _ = std::fs::remove_file(&link);
            LauncherError::io(dest, e)
        });
    }

    let mut temp =
        tempfile::NamedTempFile::new_in(&parent).map_err(|e| LauncherError::io(&parent, e))?;
    let mut input = std::fs::File::open(source).map_err(|e| LauncherError::io(source, e))?;
    std::io::copy(&mut input, &mut temp).map_err(|e| LauncherError::io(temp.path(), e))?;
    temp.persist(dest)
        .map_err(|e| LauncherError::io(dest, e.error))?;
    Ok(())
}
