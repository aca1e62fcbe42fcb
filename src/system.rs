//! Host-level actions: closing the media player and keeping the session awake

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use crate::router::{CommandHandler, Reply};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Process name of the media player to close
    pub player_process: String,
    pub inhibit_sleep: bool,
    pub inhibitor_command: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            player_process: "vlc".into(),
            inhibit_sleep: true,
            inhibitor_command: [
                "gnome-session-inhibit",
                "--inhibit",
                "idle:sleep",
                "--inhibit",
                "idle:logout",
                "--inhibit",
                "idle:suspend",
                "--inhibit",
                "idle:autosuspend",
                "sleep",
                "infinity",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

pub trait ProcessControl: Send + Sync {
    /// Terminate every process called `name`
    fn kill_by_name(&self, name: &str) -> Result<()>;
}

pub struct HostProcesses;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        fn kill_command(name: &str) -> Command {
            let mut cmd = Command::new("taskkill");
            cmd.args(["/IM", format!("{}.exe", name).as_str(), "/F"]);
            cmd
        }
    } else {
        fn kill_command(name: &str) -> Command {
            let mut cmd = Command::new("pkill");
            cmd.arg(name);
            cmd
        }
    }
}

impl ProcessControl for HostProcesses {
    fn kill_by_name(&self, name: &str) -> Result<()> {
        // A non-zero exit only means nothing was running
        let status = kill_command(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to terminate '{}'", name))?;
        log::debug!("kill {} exited with {}", name, status);
        Ok(())
    }
}

/// Handles `close play`
pub struct SystemTask {
    player_process: String,
    processes: Arc<dyn ProcessControl>,
}

impl SystemTask {
    pub fn new(player_process: impl Into<String>, processes: Arc<dyn ProcessControl>) -> Self {
        Self {
            player_process: player_process.into(),
            processes,
        }
    }
}

impl CommandHandler for SystemTask {
    fn name(&self) -> &'static str {
        "system"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        if !command.contains("close play") {
            return Ok(None);
        }

        let reply = match self.processes.kill_by_name(&self.player_process) {
            Ok(()) => Reply::say("Closed VLC player."),
            Err(e) => {
                log::error!("Closing player failed: {:#}", e);
                Reply::say("Failed to close VLC.")
            }
        };
        Ok(Some(reply))
    }
}

/// Keeps the desktop session from idling while the assistant runs.
/// The inhibitor child is terminated on drop.
pub struct SessionInhibitor {
    child: Option<Child>,
}

impl SessionInhibitor {
    pub fn start(config: &SystemConfig) -> Self {
        if !config.inhibit_sleep {
            return Self { child: None };
        }
        let Some((program, args)) = config.inhibitor_command.split_first() else {
            return Self { child: None };
        };

        let child = match Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                log::info!("✓ Session idle inhibitor started (pid {})", child.id());
                Some(child)
            }
            Err(e) => {
                log::warn!("Could not start session inhibitor '{}': {}", program, e);
                None
            }
        };
        Self { child }
    }

    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for SessionInhibitor {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.kill() {
                Ok(()) => log::info!("Inhibitor process terminated"),
                Err(e) => log::warn!("Could not terminate inhibitor: {}", e),
            }
            let _ = child.wait();
        }
    }
}
