pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::auth::{AuthProvider, Credential, CredentialBroker};
pub use crate::core::config::{Endpoints, LauncherConfig, LauncherPaths};
pub use crate::core::downloader::{ArtifactFetcher, ChannelProgressSink, ProgressEvent, ProgressSink};
pub use crate::core::error::{LauncherError, LauncherResult, Stage};
pub use crate::core::launch::{GameProcess, LaunchOverrides, LaunchPlan};
pub use crate::core::pipeline::{LaunchPipeline, LaunchRequest};
pub use crate::core::platform::PlatformInfo;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `info,launcher_core=debug`. Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,launcher_core=debug")),
        )
        .try_init();

    tracing::debug!("launcher-core {} logging initialised", env!("CARGO_PKG_VERSION"));
}
