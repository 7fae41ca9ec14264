pub mod classpath;
mod plan;
pub mod substitute;
mod task;

pub use classpath::{join_classpath, safe_path_str};
pub use plan::{assemble, LaunchInputs, LaunchOverrides, LaunchPlan, WindowSize};
pub use substitute::Substitutions;
pub use task::{spawn, spawn_game, GameProcess};
