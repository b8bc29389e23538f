use std::fmt;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::config::DisplayOptions;

/// Runs one shell command line. Swappable so tests never touch the host.
pub type CommandRunner = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

pub fn shell_runner() -> CommandRunner {
    Arc::new(run_command)
}

#[derive(Clone)]
pub struct DisplayPowerController {
    sleep_command: Option<String>,
    wake_command: Option<String>,
    runner: CommandRunner,
}

impl fmt::Debug for DisplayPowerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayPowerController")
            .field("sleep_command", &self.sleep_command)
            .field("wake_command", &self.wake_command)
            .finish_non_exhaustive()
    }
}

impl DisplayPowerController {
    /// `None` when neither a sleep nor a wake command is configured.
    pub fn from_options(opts: &DisplayOptions) -> Option<Self> {
        Self::with_runner(
            opts.sleep_command.clone(),
            opts.wake_command.clone(),
            shell_runner(),
        )
    }

    pub fn with_runner(
        sleep_command: Option<String>,
        wake_command: Option<String>,
        runner: CommandRunner,
    ) -> Option<Self> {
        let sleep_command = sleep_command.filter(|c| !c.trim().is_empty());
        let wake_command = wake_command.filter(|c| !c.trim().is_empty());
        if sleep_command.is_none() && wake_command.is_none() {
            return None;
        }
        Some(Self {
            sleep_command,
            wake_command,
            runner,
        })
    }

    pub fn sleep(&self) -> Result<()> {
        self.perform(false)
    }

    pub fn wake(&self) -> Result<()> {
        self.perform(true)
    }

    pub fn set_power(&self, on: bool) -> Result<()> {
        self.perform(on)
    }

    fn perform(&self, on: bool) -> Result<()> {
        let action = if on { "wake" } else { "sleep" };
        let Some(command) = self.command_for(on) else {
            debug!(action, "no display command configured");
            return Ok(());
        };
        info!(action, command, "switching display power");
        (self.runner)(command).with_context(|| format!("display {action} command failed"))
    }

    fn command_for(&self, on: bool) -> Option<&str> {
        if on {
            self.wake_command.as_deref()
        } else {
            self.sleep_command.as_deref()
        }
    }
}

/// Run `command` through `sh -c`, failing on a non-zero exit.
pub fn run_command(command: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "command exited with status {}: {command}",
            status.code().unwrap_or(-1)
        ))
    }
}
