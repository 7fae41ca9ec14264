// ─── Launch Pipeline ───
// One task drives the five stages in order. Each stage consumes the
// previous one's output, so a stage only starts once everything before it
// has validated. Failures carry the stage they happened in.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::assets::AssetResolver;
use crate::core::auth::Credential;
use crate::core::config::LauncherConfig;
use crate::core::downloader::{ArtifactFetcher, ByteCounter, ProgressPump, ProgressSink};
use crate::core::error::{LauncherError, LauncherResult, Stage};
use crate::core::http::build_http_client;
use crate::core::java::{required_java_for_game_version, JavaLocator};
use crate::core::launch::{self, GameProcess, LaunchInputs, LaunchOverrides, LaunchPlan};
use crate::core::libraries::{LibraryResolver, NativesDir};
use crate::core::platform::PlatformInfo;
use crate::core::version::VersionDirectory;

/// What the caller wants launched.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub version_id: String,
    pub game_dir: PathBuf,
    pub overrides: LaunchOverrides,
}

pub struct LaunchPipeline {
    config: LauncherConfig,
    platform: PlatformInfo,
    client: Client,
    directory: AsyncMutex<VersionDirectory>,
}

impl LaunchPipeline {
    pub const STEPS: usize = 5;

    pub fn new(config: LauncherConfig, platform: PlatformInfo) -> LauncherResult<Self> {
        let client = build_http_client()?;
        Ok(Self::with_client(config, platform, client))
    }

    pub fn with_client(config: LauncherConfig, platform: PlatformInfo, client: Client) -> Self {
        let directory = VersionDirectory::new(ArtifactFetcher::new(client.clone(), &config), &config);
        Self {
            config,
            platform,
            client,
            directory: AsyncMutex::new(directory),
        }
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Resolve everything `request` needs and assemble the launch plan.
    ///
    /// The credential should already be fresh (see `CredentialBroker::ensure_fresh`).
    pub async fn prepare(
        &self,
        request: &LaunchRequest,
        credential: &Credential,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> LauncherResult<LaunchPlan> {
        let counter = Arc::new(ByteCounter::new());
        let pump = ProgressPump::start(counter.clone(), sink.clone(), ProgressPump::DEFAULT_TICK);

        let result = self
            .run_stages(request, credential, sink.as_ref(), &counter, &cancel)
            .await;
        pump.finish().await;

        match &result {
            Ok(_) => sink.status("Ready to launch"),
            Err(err) => {
                warn!("Launch preparation for {} failed: {}", request.version_id, err);
                sink.status(&format!("Launch failed: {err}"));
            }
        }
        result
    }

    /// Spawn the game. The returned process belongs to the caller and keeps
    /// the attempt's natives directory until it is dropped.
    pub fn launch(&self, plan: &LaunchPlan) -> LauncherResult<GameProcess> {
        launch::spawn_game(plan)
    }

    async fn run_stages(
        &self,
        request: &LaunchRequest,
        credential: &Credential,
        sink: &dyn ProgressSink,
        counter: &ByteCounter,
        cancel: &CancellationToken,
    ) -> LauncherResult<LaunchPlan> {
        let fetcher = ArtifactFetcher::new(self.client.clone(), &self.config)
            .with_cancellation(cancel.clone());
        let paths = self.config.paths();
        let platform = &self.platform;

        // ── 1. Version ──
        sink.step(1, Self::STEPS);
        sink.status(&format!("Resolving version {}", request.version_id));
        let descriptor = run_stage(Stage::ResolveVersion, cancel, async {
            let mut directory = self.directory.lock().await;
            directory.resolve_version_chain(&request.version_id).await
        })
        .await?;

        // ── 2. Runtime ──
        sink.step(2, Self::STEPS);
        let java_major = descriptor
            .java_version
            .as_ref()
            .map(|j| j.major_version)
            .unwrap_or_else(|| required_java_for_game_version(&descriptor.id));
        sink.status(&format!("Locating Java {java_major}"));
        let java = run_stage(Stage::ResolveRuntime, cancel, async {
            JavaLocator::new(&paths, platform)
                .with_override(request.overrides.runtime.clone())
                .locate(java_major)
                .await
        })
        .await?;

        // ── 3. Libraries ──
        sink.step(3, Self::STEPS);
        sink.status("Downloading libraries");
        counter.reset();
        // Removed again on any failure below, or once the plan and its game are gone.
        let attempt_id = Uuid::new_v4().simple().to_string();
        let natives = Arc::new(NativesDir::new(paths.natives_dir(&attempt_id)));
        let libraries = run_stage(Stage::ResolveLibraries, cancel, async {
            LibraryResolver::new(fetcher.clone(), &self.config)
                .resolve(&descriptor, platform, natives.path(), counter)
                .await
        })
        .await?;

        // ── 4. Assets ──
        sink.step(4, Self::STEPS);
        sink.status("Downloading assets");
        counter.reset();
        let assets = run_stage(Stage::ResolveAssets, cancel, async {
            AssetResolver::new(fetcher.clone(), &self.config)
                .resolve(&descriptor, &request.game_dir, counter)
                .await
        })
        .await?;

        // ── 5. Assemble ──
        sink.step(5, Self::STEPS);
        sink.status("Assembling launch command");
        let libraries_dir = paths.libraries_dir();
        let plan = run_stage(Stage::Assemble, cancel, async {
            launch::assemble(&LaunchInputs {
                descriptor: &descriptor,
                libraries: &libraries,
                assets: &assets,
                credential,
                runtime: &java.path,
                game_dir: &request.game_dir,
                libraries_dir: &libraries_dir,
                platform,
                overrides: &request.overrides,
            })
        })
        .await?;

        info!(
            "Prepared {} (Java {}, {} libraries, {} assets)",
            descriptor.id,
            java.major,
            libraries.classpath.len(),
            assets.object_count
        );
        Ok(plan.with_natives_lease(natives))
    }
}

/// Run one stage unless cancelled; a cancellation mid-stage drops its
/// in-flight work.
async fn run_stage<T>(
    stage: Stage,
    cancel: &CancellationToken,
    work: impl Future<Output = LauncherResult<T>>,
) -> LauncherResult<T> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled.in_stage(stage));
    }
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LauncherError::Cancelled),
        result = work => result,
    };
    result.map_err(|err| err.in_stage(stage))
}
