// ─── Launch Task ───
// Spawns the game process described by a LaunchPlan.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::libraries::NativesDir;
use crate::core::platform::{OsName, PlatformInfo};

use super::plan::LaunchPlan;

/// Start the game as a child process.
///
/// Returns immediately after spawning; the caller owns the child and
/// decides what to do with its output and exit.
pub fn spawn(plan: &LaunchPlan) -> LauncherResult<Child> {
    std::fs::create_dir_all(&plan.working_dir)
        .map_err(|e| LauncherError::io(&plan.working_dir, e))?;

    let mut cmd = Command::new(&plan.runtime);
    cmd.args(plan.to_arguments());
    cmd.current_dir(&plan.working_dir);
    for (key, value) in &plan.env {
        cmd.env(key, value);
    }
    configure_platform_spawn(&mut cmd);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    info!("Launching {} with Java: {:?}", plan.main_class, plan.runtime);
    debug!("Command (copy/paste): {}", format_command_for_logs(plan));

    cmd.spawn()
        .map_err(|e| LauncherError::JavaExecution(format!("{}: {e}", plan.runtime.display())))
}

/// A started game. The attempt's natives directory lives as long as this
/// does, so hold on to it until the game has exited.
#[derive(Debug)]
pub struct GameProcess {
    pub child: Child,
    natives: Option<Arc<NativesDir>>,
}

impl GameProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Block until the game exits, then release its natives directory.
    pub fn wait(mut self) -> LauncherResult<ExitStatus> {
        let status = self
            .child
            .wait()
            .map_err(|e| LauncherError::JavaExecution(format!("waiting for game: {e}")))?;
        info!("Game exited with {}", status);
        drop(self.natives.take());
        Ok(status)
    }
}

/// [`spawn`], keeping the plan's natives directory alive for the game.
pub fn spawn_game(plan: &LaunchPlan) -> LauncherResult<GameProcess> {
    let child = spawn(plan)?;
    Ok(GameProcess {
        child,
        natives: plan.natives_lease.clone(),
    })
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_CONSOLE: u32 = 0x00000010;
        cmd.creation_flags(CREATE_NEW_CONSOLE);

        // Terminal session variables make LWJGL treat the game as running
        // inside a virtual terminal.
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
        cmd.env_remove("ConEmuANSI");
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// `value` prepended to the current contents of `var_name`.
pub(crate) fn append_env_path(var_name: &str, value: &str, platform: &PlatformInfo) -> String {
    let separator = match platform.os {
        OsName::Windows => ";",
        OsName::Osx | OsName::Linux => ":",
    };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}

fn format_command_for_logs(plan: &LaunchPlan) -> String {
    let program = shell_escape(&plan.runtime.to_string_lossy());
    let args = plan
        .redacted_arguments()
        .iter()
        .map(|arg| shell_escape(arg))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
