use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::auth::{AuthHop, AuthProvider};

/// Why an identity provider refused a token exchange.
///
/// The linked-account family (`AccountMissing`, `RegionUnavailable`,
/// `AdultVerificationRequired`, `ChildAccount`) needs action on the account
/// itself; `ReauthRequired` only needs the user to sign in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRejection {
    AccountMissing,
    RegionUnavailable,
    AdultVerificationRequired,
    ChildAccount,
    ReauthRequired,
    Other,
}

impl AuthRejection {
    /// True when signing in again cannot fix the problem.
    pub fn requires_account_action(self) -> bool {
        matches!(
            self,
            Self::AccountMissing
                | Self::RegionUnavailable
                | Self::AdultVerificationRequired
                | Self::ChildAccount
        )
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AccountMissing => "account has no linked Xbox profile",
            Self::RegionUnavailable => "service unavailable in the account region",
            Self::AdultVerificationRequired => "adult verification required",
            Self::ChildAccount => "child account must be added to a family",
            Self::ReauthRequired => "sign-in expired, re-authentication required",
            Self::Other => "rejected",
        };
        f.write_str(text)
    }
}

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveVersion,
    ResolveRuntime,
    ResolveLibraries,
    ResolveAssets,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::ResolveVersion => "resolve-version",
            Stage::ResolveRuntime => "resolve-runtime",
            Stage::ResolveLibraries => "resolve-libraries",
            Stage::ResolveAssets => "resolve-assets",
            Stage::Assemble => "assemble",
        };
        f.write_str(text)
    }
}

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: {cause}")]
    Download { url: String, cause: String },

    // ── Integrity ───────────────────────────────────────
    #[error("Hash mismatch for {artifact}: expected {expected}, got {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    // ── Authentication ──────────────────────────────────
    #[error("{provider} auth network failure at {hop}: {source}")]
    AuthNetwork {
        provider: AuthProvider,
        hop: AuthHop,
        source: reqwest::Error,
    },

    #[error("{provider} auth rejected at {hop} ({code}): {message} [{reason}]")]
    AuthRejected {
        provider: AuthProvider,
        hop: AuthHop,
        code: String,
        message: String,
        reason: AuthRejection,
    },

    #[error("{provider} auth returned an unexpected body at {hop}")]
    AuthProtocol {
        provider: AuthProvider,
        hop: AuthHop,
        raw_body: String,
    },

    // ── Versions ────────────────────────────────────────
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Invalid version descriptor {id}: {reason}")]
    InvalidDescriptor { id: String, reason: String },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Java ────────────────────────────────────────────
    #[error("Java not found for major version {0}")]
    JavaNotFound(u32),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Launch ──────────────────────────────────────────
    #[error("Cannot assemble launch: missing {missing_input}")]
    LaunchAssembly { missing_input: String },

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Control flow ────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<LauncherError>,
    },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Wrap an error with the pipeline stage it came from.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ LauncherError::Stage { .. } => already,
            other => LauncherError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root(&self) -> &LauncherError {
        match self {
            LauncherError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether re-invoking the same stage may succeed without new user input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            LauncherError::Integrity { .. }
                | LauncherError::Download { .. }
                | LauncherError::Http(_)
                | LauncherError::AuthNetwork { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// Consumers on the other side of an IPC boundary only need the message.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
