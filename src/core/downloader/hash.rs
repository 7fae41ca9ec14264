use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

/// Expected digest of a file, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ContentHash {
    pub fn sha1(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha1,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    /// Parse a hex digest, inferring the algorithm from its length.
    /// Maven `.sha1` sidecars may carry a trailing file name, which is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.split_whitespace().next()?;
        if !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match token.len() {
            40 => Some(Self::sha1(token)),
            64 => Some(Self::sha256(token)),
            _ => None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.hex.len() == self.algorithm.hex_len()
            && self.hex.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex)
    }

    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new(self.algorithm)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Incremental hasher for either supported algorithm.
pub enum ContentHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => ContentHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            ContentHasher::Sha1(h) => h.update(bytes),
            ContentHasher::Sha256(h) => h.update(bytes),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Sha1(h) => hex::encode(h.finalize()),
            ContentHasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hash a file on the blocking pool, streaming it in 64 KiB chunks.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path, algorithm))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

/// Same as [`hash_file`], for callers already on a blocking thread.
pub fn hash_file_blocking(path: &Path, algorithm: HashAlgorithm) -> LauncherResult<String> {
    let mut file = std::fs::File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Whether the file at `path` exists and hashes to `expected`.
pub async fn validate_file(path: &Path, expected: &ContentHash) -> LauncherResult<bool> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(false);
    }
    let actual = hash_file(path, expected.algorithm).await?;
    Ok(expected.matches(&actual))
}
