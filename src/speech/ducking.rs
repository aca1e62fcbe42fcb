//! Lower the media player's stream while the assistant is listening

use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    pub enable: bool,
    /// Substring identifying the player's sink input (case-insensitive)
    pub application: String,
    pub lowered_percent: u32,
    pub restored_percent: u32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            enable: true,
            application: "vlc".into(),
            lowered_percent: 30,
            restored_percent: 80,
        }
    }
}

pub trait VolumeDucker: Send + Sync {
    fn lower(&self);
    fn restore(&self);
}

/// Restores volume when dropped, whatever path the listen took
pub struct DuckGuard<'a> {
    ducker: &'a dyn VolumeDucker,
}

impl<'a> DuckGuard<'a> {
    pub fn new(ducker: &'a dyn VolumeDucker) -> Self {
        ducker.lower();
        Self { ducker }
    }
}

impl Drop for DuckGuard<'_> {
    fn drop(&mut self) {
        self.ducker.restore();
    }
}

/// PulseAudio / PipeWire ducking through `pactl`
pub struct PactlDucker {
    config: DuckingConfig,
}

impl PactlDucker {
    pub fn new(config: DuckingConfig) -> Self {
        Self { config }
    }

    fn set_volume(&self, percent: u32) {
        if !self.config.enable {
            return;
        }

        let listing = match Command::new("pactl").args(["list", "sink-inputs"]).output() {
            Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
            Err(e) => {
                log::debug!("pactl unavailable: {}", e);
                return;
            }
        };

        let Some(id) = find_sink_input(&listing, &self.config.application) else {
            log::debug!("No '{}' sink input playing", self.config.application);
            return;
        };

        log::debug!("Setting sink input #{} volume to {}%", id, percent);
        if let Err(e) = Command::new("pactl")
            .args(["set-sink-input-volume", &id, &format!("{}%", percent)])
            .status()
        {
            log::warn!("Failed to set media volume: {}", e);
        }
    }
}

impl VolumeDucker for PactlDucker {
    fn lower(&self) {
        self.set_volume(self.config.lowered_percent);
    }

    fn restore(&self) {
        self.set_volume(self.config.restored_percent);
    }
}

/// Id of the first sink input whose block mentions `application`
pub fn find_sink_input(listing: &str, application: &str) -> Option<String> {
    let application = application.to_lowercase();
    listing.split("Sink Input #").skip(1).find_map(|block| {
        if !block.to_lowercase().contains(&application) {
            return None;
        }
        let id = block.lines().next()?.trim();
        (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
    })
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingDucker {
        events: Mutex<Vec<&'static str>>,
    }

    impl RecordingDucker {
        pub fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl VolumeDucker for RecordingDucker {
        fn lower(&self) {
            self.events.lock().unwrap().push("lower");
        }

        fn restore(&self) {
            self.events.lock().unwrap().push("restore");
        }
    }
}
