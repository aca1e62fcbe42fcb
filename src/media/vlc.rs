//! VLC remote-control ("rc") interface over loopback TCP

use anyhow::{Context, Result};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use super::MediaKind;

/// Commands understood by the rc interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlcCommand {
    /// Toggles pause
    Pause,
    Stop,
    Next,
    VolumeUp(u32),
    VolumeDown(u32),
    /// Absolute volume, 0..=256 on VLC's scale
    SetVolume(u32),
}

impl VlcCommand {
    pub fn wire(&self) -> String {
        match self {
            Self::Pause => "pause".into(),
            Self::Stop => "stop".into(),
            Self::Next => "next".into(),
            Self::VolumeUp(step) => format!("volup {}", step),
            Self::VolumeDown(step) => format!("voldown {}", step),
            Self::SetVolume(level) => format!("volume {}", level),
        }
    }
}

/// Player process control
pub trait MediaPlayer: Send + Sync {
    fn launch(&self, files: &[PathBuf], kind: MediaKind, random: bool) -> Result<()>;
    fn send(&self, command: VlcCommand) -> Result<()>;
}

/// VLC started with the rc interface listening on `host:port`
pub struct VlcPlayer {
    binary: String,
    host: String,
    port: u16,
}

impl VlcPlayer {
    pub fn new(binary: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            host: host.into(),
            port,
        }
    }

    /// Player arguments, without the playlist
    pub fn launch_args(&self, kind: MediaKind, random: bool) -> Vec<String> {
        let mut args = vec![
            "--extraintf".to_string(),
            "rc".to_string(),
            "--rc-host".to_string(),
            format!("{}:{}", self.host, self.port),
        ];
        if random {
            args.push("--random".into());
        }
        match kind {
            MediaKind::Video => args.push("--fullscreen".into()),
            MediaKind::Music => {
                args.extend(["--intf", "dummy", "--no-video"].map(String::from));
            }
        }
        args
    }
}

impl MediaPlayer for VlcPlayer {
    fn launch(&self, files: &[PathBuf], kind: MediaKind, random: bool) -> Result<()> {
        let child = Command::new(&self.binary)
            .args(self.launch_args(kind, random))
            .args(files)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start '{}'", self.binary))?;

        log::info!("▶ {} started (pid {}) with {} files", self.binary, child.id(), files.len());
        // The player outlives this call; reap it in the background
        std::thread::spawn(move || {
            let mut child = child;
            let _ = child.wait();
        });
        Ok(())
    }

    fn send(&self, command: VlcCommand) -> Result<()> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .context("Invalid player control address")?
            .next()
            .context("Player control address did not resolve")?;

        let mut stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))
            .with_context(|| format!("Failed to connect to player at {}", addr))?;
        stream
            .write_all(format!("{}\n", command.wire()).as_bytes())
            .context("Failed to send player command")?;

        log::debug!("Sent player command: {}", command.wire());
        Ok(())
    }
}
