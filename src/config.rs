use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::assistant::AssistantConfig;
use crate::audio::vad::VadConfig;
use crate::audio::AudioConfig;
use crate::bridge::BridgeConfig;
use crate::llm::LlmConfig;
use crate::media::MediaConfig;
use crate::pictures::PicturesConfig;
use crate::reminders::ReminderConfig;
use crate::speech::SpeechConfig;
use crate::system::SystemConfig;
use crate::ui::UiConfig;
use crate::validation::{
    validate_notification_secs, validate_poll_interval_secs, validate_port, validate_volume_step,
};
use crate::youtube::BrowserConfig;

/// Application configuration
///
/// Every section falls back to its defaults, so a config file only needs the
/// keys the user wants to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub assistant: AssistantConfig,
    pub speech: SpeechConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub reminders: ReminderConfig,
    pub media: MediaConfig,
    pub pictures: PicturesConfig,
    pub browser: BrowserConfig,
    pub llm: LlmConfig,
    pub bridge: BridgeConfig,
    pub ui: UiConfig,
    pub system: SystemConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Invalid config at {}", path.display()))?;
            log::info!("Config loaded from: {}", path.display());
            config
        } else {
            let config = Self::default();
            config.save(path)?;
            log::info!("Default config created at: {}", path.display());
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_str).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Reject values that would break the poller, the player or the webhook
    pub fn validate(&self) -> Result<()> {
        validate_poll_interval_secs(self.reminders.poll_interval_secs)
            .context("reminders.poll_interval_secs")?;
        validate_notification_secs(self.reminders.notification_secs)
            .context("reminders.notification_secs")?;
        validate_volume_step(self.media.volume_step).context("media.volume_step")?;
        validate_port(self.media.control_port).context("media.control_port")?;
        validate_port(self.bridge.port).context("bridge.port")?;
        if self.assistant.wake_words.iter().all(|w| w.trim().is_empty()) {
            anyhow::bail!("assistant.wake_words must contain at least one phrase");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_written_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(loaded.assistant.name, created.assistant.name);
        assert_eq!(loaded.media.control_port, 9999);
        assert_eq!(loaded.bridge.port, 5000);
        assert_eq!(loaded.media.categories.len(), created.media.categories.len());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[assistant]\nname = \"Friday\"\nwake_words = [\"hey friday\"]\n\n[media]\nvolume_step = 10\n",
        )
        .unwrap();

        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config.assistant.name, "Friday");
        assert_eq!(config.assistant.wake_words, vec!["hey friday".to_string()]);
        assert_eq!(config.media.volume_step, 10);
        assert_eq!(config.media.player, "vlc");
        assert_eq!(config.reminders.poll_interval_secs, 30);
        assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[reminders]\npoll_interval_secs = 90\n").unwrap();
        assert!(AppConfig::load_or_create(&path).is_err());

        fs::write(&path, "[assistant]\nwake_words = []\n").unwrap();
        assert!(AppConfig::load_or_create(&path).is_err());

        fs::write(&path, "not = [valid").unwrap();
        assert!(AppConfig::load_or_create(&path).is_err());
    }
}
