mod runtime;

pub use runtime::{
    is_java_compatible_major, managed_runtime_dir, probe_java, required_java_for_game_version,
    JavaInstallation, JavaLocator, JavaSource,
};
