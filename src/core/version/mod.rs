pub mod arguments;
mod directory;
pub mod library;
pub mod manifest;
pub mod version_file;

pub use arguments::{resolve_arguments, ArgumentElement, ArgumentTemplate, ArgumentValue};
pub use directory::VersionDirectory;
pub use library::{DownloadInfo, ExtractRules, LibraryDownloads, LibraryEntry, LibrarySource};
pub use manifest::{VersionEntry, VersionManifest};
pub use version_file::{merge, AssetIndexInfo, JavaVersionInfo, VersionDescriptor};
