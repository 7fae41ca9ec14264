// ─── Classpath ───

use std::path::{Path, PathBuf};

use crate::core::platform::PlatformInfo;

/// Path as passed to the JVM. Resolves symlinks where possible.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    // Java rejects extended-length paths (`\\?\C:\...`) on the classpath and
    // reports ClassNotFoundException even though the jar exists.
    if let Some(stripped) = text.strip_prefix(r"\\?\") {
        return stripped.to_string();
    }

    text
}

pub fn join_classpath(entries: &[PathBuf], platform: &PlatformInfo) -> String {
    entries
        .iter()
        .map(|p| safe_path_str(p))
        .collect::<Vec<_>>()
        .join(platform.classpath_separator())
}
