use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::ExtractRules;

/// One attempt's natives directory. The directory is deleted when this is
/// dropped, so whoever runs the game keeps it alive until the game exits.
#[derive(Debug)]
pub struct NativesDir {
    path: PathBuf,
}

impl NativesDir {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NativesDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed natives directory {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove natives directory {:?}: {}", self.path, e),
        }
    }
}

/// Unpack the entries of a native jar that `rules` permit into `dest_dir`.
///
/// Entry names that would escape `dest_dir` are skipped.
pub async fn extract_natives(jar: &Path, dest_dir: &Path, rules: &ExtractRules) -> LauncherResult<usize> {
    let jar = jar.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    let rules = rules.clone();

    tokio::task::spawn_blocking(move || extract_blocking(&jar, &dest_dir, &rules))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

fn extract_blocking(jar: &Path, dest_dir: &Path, rules: &ExtractRules) -> LauncherResult<usize> {
    let file = File::open(jar).map_err(|e| LauncherError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !rules.permits(&name) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe entry {:?} in {:?}", name, jar);
            continue;
        };

        let dest: PathBuf = dest_dir.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut out = File::create(&dest).map_err(|e| LauncherError::io(&dest, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&dest, e))?;
        extracted += 1;
        debug!("Extracted native: {}", name);
    }

    Ok(extracted)
}
