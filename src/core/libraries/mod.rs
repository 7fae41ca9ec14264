// ─── Library Resolution ───
// Turns a descriptor's library list into validated jars on disk: rule
// filtering, classpath jars, per-OS native jars, the client jar, and native
// extraction into a per-attempt directory.

mod natives;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::core::config::{LauncherConfig, LauncherPaths};
use crate::core::downloader::{Artifact, ArtifactFetcher, ByteCounter, ContentHash, FetchJob};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::PlatformInfo;
use crate::core::version::{ExtractRules, LibraryEntry, LibrarySource, VersionDescriptor};

pub use natives::{extract_natives, NativesDir};

/// Everything the launch step needs from the library stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibraries {
    /// Library jars in descriptor order, client jar last.
    pub classpath: Vec<PathBuf>,
    pub client_jar: PathBuf,
    /// Native jars that were unpacked into `natives_dir`.
    pub natives: Vec<PathBuf>,
    pub natives_dir: PathBuf,
}

pub struct LibraryResolver {
    fetcher: ArtifactFetcher,
    paths: LauncherPaths,
    libraries_base: String,
}

/// Where one classpath jar lives and, if it can be fetched, how.
struct PlannedJar {
    dest: PathBuf,
    artifact: Option<Artifact>,
}

impl LibraryResolver {
    pub fn new(fetcher: ArtifactFetcher, config: &LauncherConfig) -> Self {
        Self {
            fetcher,
            paths: config.paths(),
            libraries_base: config.endpoints.libraries_base.clone(),
        }
    }

    /// Fetch and validate every library `descriptor` needs on `platform`,
    /// then unpack natives into `natives_dir`.
    pub async fn resolve(
        &self,
        descriptor: &VersionDescriptor,
        platform: &PlatformInfo,
        natives_dir: &Path,
        progress: &ByteCounter,
    ) -> LauncherResult<ResolvedLibraries> {
        let allowed: Vec<&LibraryEntry> = descriptor
            .libraries
            .iter()
            .filter(|lib| {
                let ok = lib.is_allowed(platform);
                if !ok {
                    debug!("Skipping library (rules): {}", lib.name);
                }
                ok
            })
            .collect();

        let planned: Vec<Option<PlannedJar>> = stream::iter(allowed.iter().copied())
            .map(|lib| self.plan_main_jar(lib))
            .buffered(self.fetcher.concurrency())
            .try_collect()
            .await?;

        let mut jobs = Vec::new();
        let mut classpath = Vec::new();
        let mut seen = HashSet::new();
        for jar in planned.into_iter().flatten() {
            if let Some(artifact) = jar.artifact {
                jobs.push(FetchJob::new(artifact, jar.dest.clone()));
            }
            if seen.insert(jar.dest.clone()) {
                classpath.push(jar.dest);
            }
        }

        let mut native_jars: Vec<(PathBuf, ExtractRules)> = Vec::new();
        for lib in &allowed {
            if let Some(artifact) = lib.native_artifact(platform)? {
                let dest = self.paths.libraries_dir().join(&artifact.path);
                native_jars.push((dest.clone(), lib.extract_rules()));
                jobs.push(FetchJob::new(artifact, dest));
            }
        }

        let client_jar = self.plan_client_jar(descriptor, &mut jobs).await?;

        info!(
            "Resolving {} libraries ({} allowed, {} native jars)",
            descriptor.libraries.len(),
            allowed.len(),
            native_jars.len()
        );
        self.fetcher.fetch_batch(jobs, progress).await?;

        reset_dir(natives_dir).await?;
        for (jar, rules) in &native_jars {
            extract_natives(jar, natives_dir, rules).await?;
        }

        classpath.push(client_jar.clone());
        Ok(ResolvedLibraries {
            classpath,
            client_jar,
            natives: native_jars.into_iter().map(|(jar, _)| jar).collect(),
            natives_dir: natives_dir.to_path_buf(),
        })
    }

    async fn plan_main_jar(&self, lib: &LibraryEntry) -> LauncherResult<Option<PlannedJar>> {
        let libraries_dir = self.paths.libraries_dir();
        match lib.main_source(&self.libraries_base)? {
            None => Ok(None),
            Some(LibrarySource::Declared(artifact)) => Ok(Some(PlannedJar {
                dest: libraries_dir.join(&artifact.path),
                artifact: Some(artifact),
            })),
            Some(LibrarySource::Repository { url, path }) => {
                let dest = libraries_dir.join(&path);
                let artifact = self.repository_artifact(lib, &url, path).await?;
                if artifact.is_none() {
                    if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                        return Err(LauncherError::Download {
                            url,
                            cause: format!("{}: no checksum published and not present locally", lib.name),
                        });
                    }
                    warn!("{} has no published checksum; using the local copy", lib.name);
                }
                Ok(Some(PlannedJar { dest, artifact }))
            }
        }
    }

    /// Artifact for a coordinate-only library, hashed by the repository's
    /// `.sha1` sidecar. `None` when the repository publishes no checksum.
    async fn repository_artifact(
        &self,
        lib: &LibraryEntry,
        url: &str,
        path: PathBuf,
    ) -> LauncherResult<Option<Artifact>> {
        let sidecar = format!("{url}.sha1");
        let hash = match self.fetcher.fetch_text(&sidecar).await {
            Ok(text) => ContentHash::parse(&text),
            Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
            Err(err) => {
                debug!("No checksum for {} ({})", lib.name, err);
                None
            }
        };
        Ok(hash.map(|hash| Artifact {
            id: lib.name.clone(),
            url: Some(url.to_string()),
            hash,
            size: None,
            path,
        }))
    }

    async fn plan_client_jar(
        &self,
        descriptor: &VersionDescriptor,
        jobs: &mut Vec<FetchJob>,
    ) -> LauncherResult<PathBuf> {
        let dest = self.paths.version_jar(descriptor.client_jar_id());
        match descriptor.client_artifact()? {
            Some(artifact) => {
                jobs.push(FetchJob::new(artifact, dest.clone()));
                Ok(dest)
            }
            None if tokio::fs::try_exists(&dest).await.unwrap_or(false) => Ok(dest),
            None => Err(LauncherError::LaunchAssembly {
                missing_input: format!("client jar for {}", descriptor.id),
            }),
        }
    }
}

async fn reset_dir(dir: &Path) -> LauncherResult<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| LauncherError::io(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LauncherError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoints;
    use crate::core::platform::OsName;
    use crate::core::test_support::{serve, sha1_hex, zip_bytes};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    fn linux() -> PlatformInfo {
        PlatformInfo::new(OsName::Linux, "6.1", "x86_64", "64")
    }

    fn descriptor(base: &str, natives_jar: &[u8]) -> VersionDescriptor {
        serde_json::from_value(serde_json::json!({
            "id": "1.12.2",
            "mainClass": "net.minecraft.client.main.Main",
            "downloads": {
                "client": { "sha1": sha1_hex(b"client"), "size": 6, "url": format!("{base}/client.jar") }
            },
            "libraries": [
                {
                    "name": "com.mojang:brigadier:1.0.18",
                    "downloads": { "artifact": {
                        "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                        "sha1": sha1_hex(b"brigadier"),
                        "size": 9,
                        "url": format!("{base}/brigadier.jar")
                    }}
                },
                {
                    "name": "ca.weblite:java-objc-bridge:1.0.0",
                    "rules": [{ "action": "allow", "os": { "name": "osx" } }],
                    "downloads": { "artifact": {
                        "path": "ca/weblite/java-objc-bridge/1.0.0/java-objc-bridge-1.0.0.jar",
                        "sha1": sha1_hex(b"objc"),
                        "url": format!("{base}/objc.jar")
                    }}
                },
                {
                    "name": "net.fabricmc:sponge-mixin:0.12.5",
                    "url": format!("{base}/maven/")
                },
                {
                    "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
                    "natives": { "linux": "natives-linux", "windows": "natives-windows-${arch}" },
                    "extract": { "exclude": ["META-INF/"] },
                    "downloads": { "classifiers": { "natives-linux": {
                        "path": "org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar",
                        "sha1": sha1_hex(natives_jar),
                        "url": format!("{base}/natives-linux.jar")
                    }}}
                }
            ]
        }))
        .unwrap()
    }

    async fn fixture_server(natives_jar: Vec<u8>) -> String {
        let mixin_sha = sha1_hex(b"mixin");
        serve(
            Router::new()
                .route("/client.jar", get(|| async { "client" }))
                .route("/brigadier.jar", get(|| async { "brigadier" }))
                .route("/objc.jar", get(|| async { (StatusCode::NOT_FOUND, "") }))
                .route(
                    "/maven/net/fabricmc/sponge-mixin/0.12.5/sponge-mixin-0.12.5.jar",
                    get(|| async { "mixin" }),
                )
                .route(
                    "/maven/net/fabricmc/sponge-mixin/0.12.5/sponge-mixin-0.12.5.jar.sha1",
                    get(move || async move { mixin_sha }),
                )
                .route(
                    "/natives-linux.jar",
                    get(move || async move { natives_jar }),
                ),
        )
        .await
    }

    #[tokio::test]
    async fn resolves_classpath_natives_and_client_jar() {
        let natives_jar = zip_bytes(&[
            ("liblwjgl.so", b"elf".as_slice()),
            ("META-INF/MANIFEST.MF", b"manifest".as_slice()),
        ]);
        let base = fixture_server(natives_jar.clone()).await;
        let temp = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::with_data_dir(temp.path());
        config.endpoints = Endpoints::rooted_at(&base);
        let resolver = LibraryResolver::new(
            ArtifactFetcher::new(reqwest::Client::new(), &config),
            &config,
        );
        let natives_dir = config.paths().natives_dir("attempt-1");

        let resolved = resolver
            .resolve(&descriptor(&base, &natives_jar), &linux(), &natives_dir, &ByteCounter::new())
            .await
            .unwrap();

        let libs = config.paths().libraries_dir();
        assert_eq!(
            resolved.classpath,
            vec![
                libs.join("com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"),
                libs.join("net/fabricmc/sponge-mixin/0.12.5/sponge-mixin-0.12.5.jar"),
                config.paths().version_jar("1.12.2"),
            ]
        );
        assert_eq!(std::fs::read(&resolved.client_jar).unwrap(), b"client");
        assert_eq!(resolved.natives.len(), 1);
        assert!(natives_dir.join("liblwjgl.so").exists());
        assert!(!natives_dir.join("META-INF").exists());
    }

    #[tokio::test]
    async fn missing_client_jar_is_an_assembly_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = LauncherConfig::with_data_dir(temp.path());
        let resolver = LibraryResolver::new(
            ArtifactFetcher::new(reqwest::Client::new(), &config),
            &config,
        );
        let bare: VersionDescriptor =
            serde_json::from_value(serde_json::json!({"id": "custom", "mainClass": "Main"})).unwrap();

        let err = resolver
            .resolve(&bare, &linux(), &temp.path().join("natives"), &ByteCounter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchAssembly { .. }));
    }
}
