use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use std::fs;
use std::path::{Path, PathBuf};

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
    /// Data directory (reminders, to-dos, media state, media folders, sounds)
    pub data: PathBuf,
    /// Cache directory (recordings)
    pub cache: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for Jarvis
    ///
    /// # Platform Paths
    ///
    /// ## Linux
    /// - Config: `~/.config/jarvis/`
    /// - Data: `~/.local/share/jarvis/` → reminders.json, todo_list.json, media/, sounds/
    /// - Cache: `~/.cache/jarvis/` → recordings/
    ///
    /// ## macOS
    /// - Config: `~/Library/Application Support/dev.Jarvis.jarvis/`
    /// - Data: `~/Library/Application Support/dev.Jarvis.jarvis/`
    /// - Cache: `~/Library/Caches/dev.Jarvis.jarvis/`
    ///
    /// ## Windows
    /// - Config: `%APPDATA%\Jarvis\jarvis\config\`
    /// - Data: `%APPDATA%\Jarvis\jarvis\data\`
    /// - Cache: `%LOCALAPPDATA%\Jarvis\jarvis\cache\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "Jarvis", "jarvis")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
            data: proj_dirs.data_dir().to_path_buf(),
            cache: proj_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Build paths rooted at a single directory (portable installs, tests)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            data: root.join("data"),
            cache: root.join("cache"),
        }
    }

    /// Create all necessary directories with subdirectories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;

        fs::create_dir_all(&self.data).context("Failed to create data directory")?;
        fs::create_dir_all(self.media_root()).context("Failed to create media directory")?;
        fs::create_dir_all(self.sounds_dir()).context("Failed to create sounds directory")?;

        fs::create_dir_all(&self.cache).context("Failed to create cache directory")?;
        fs::create_dir_all(self.recordings_dir())
            .context("Failed to create recordings directory")?;

        log::info!("Application directories initialized");
        log::debug!("  Config: {}", self.config.display());
        log::debug!("  Data:   {}", self.data.display());
        log::debug!("  Cache:  {}", self.cache.display());

        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Get path to the reminder store
    pub fn reminders_file(&self) -> PathBuf {
        self.data.join("reminders.json")
    }

    /// Get path to the to-do store
    pub fn todo_file(&self) -> PathBuf {
        self.data.join("todo_list.json")
    }

    /// Get path to the per-category "last played" state
    pub fn media_state_file(&self) -> PathBuf {
        self.data.join("media_state.json")
    }

    /// Root folder for the default media categories
    pub fn media_root(&self) -> PathBuf {
        self.data.join("media")
    }

    /// Folder holding the alarm sound
    pub fn sounds_dir(&self) -> PathBuf {
        self.data.join("sounds")
    }

    /// Default alarm sound
    pub fn alarm_sound(&self) -> PathBuf {
        self.sounds_dir().join("alarm.wav")
    }

    /// Scratch WAV files handed to the transcription endpoint
    pub fn recordings_dir(&self) -> PathBuf {
        self.cache.join("recordings")
    }

    /// The user's Pictures folder, falling back to `<data>/pictures`
    pub fn pictures_dir(&self) -> PathBuf {
        UserDirs::new()
            .and_then(|dirs| dirs.picture_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| self.data.join("pictures"))
    }
}
