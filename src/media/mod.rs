//! Media playback by category through an external player
//!
//! Each category maps to a folder. Plain `play` resumes the rotation where the
//! last session left it; `media_state.json` remembers that position.

pub mod vlc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CommandError;
use crate::router::{CommandHandler, Reply};
use crate::store::JsonFile;
use vlc::{MediaPlayer, VlcCommand};

pub use vlc::VlcPlayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Music,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Relative folders live under the data directory's `media/`
    pub folder: PathBuf,
    pub kind: MediaKind,
}

/// Media configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub player: String,
    pub control_host: String,
    pub control_port: u16,
    pub volume_step: u32,
    pub extensions: Vec<String>,
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        let category = |folder: &str, kind| CategoryConfig {
            folder: PathBuf::from(folder),
            kind,
        };

        Self {
            player: "vlc".into(),
            control_host: "localhost".into(),
            control_port: 9999,
            volume_step: 20,
            extensions: ["mp3", "wav", "m4a", "mp4", "mkv", "avi"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            categories: BTreeMap::from([
                ("music".to_string(), category("music", MediaKind::Music)),
                ("video".to_string(), category("videos", MediaKind::Video)),
                ("devotional".to_string(), category("devotional", MediaKind::Video)),
                ("study music".to_string(), category("study_music", MediaKind::Music)),
                ("study video".to_string(), category("study_video", MediaKind::Video)),
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryState {
    pub last_index: usize,
}

pub type MediaState = BTreeMap<String, CategoryState>;

/// Playlist for one play command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackPlan {
    pub files: Vec<PathBuf>,
    /// Rotation offset to store for the next session
    pub next_index: usize,
}

/// Rotate `files` to start at `last_index` (0 when out of range).
/// Random plays keep the sorted order and reset the rotation.
pub fn plan_playback(mut files: Vec<PathBuf>, last_index: usize, random: bool) -> PlaybackPlan {
    if random || files.is_empty() {
        return PlaybackPlan {
            files,
            next_index: 0,
        };
    }

    let index = if last_index >= files.len() { 0 } else { last_index };
    files.rotate_left(index);
    let next_index = (index + 1) % files.len();
    PlaybackPlan { files, next_index }
}

/// Files in `folder` with one of `extensions` (case-insensitive), sorted
pub fn list_media_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    files.sort();
    Ok(files)
}

pub(crate) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// Handles `play [random] <category>`, per-category controls and volume
pub struct MediaTask {
    config: MediaConfig,
    media_root: PathBuf,
    state: JsonFile<MediaState>,
    player: Arc<dyn MediaPlayer>,
    /// Category names, longest first, so `study music` wins over `music`
    match_order: Vec<String>,
}

impl MediaTask {
    pub fn new(
        config: MediaConfig,
        media_root: PathBuf,
        state_file: impl Into<PathBuf>,
        player: Arc<dyn MediaPlayer>,
    ) -> Result<Self> {
        let mut match_order: Vec<String> = config.categories.keys().cloned().collect();
        match_order.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Ok(Self {
            config,
            media_root,
            state: JsonFile::open(state_file)?,
            player,
            match_order,
        })
    }

    pub fn folder_for(&self, category: &str) -> Option<PathBuf> {
        let folder = &self.config.categories.get(category)?.folder;
        Some(if folder.is_absolute() {
            folder.clone()
        } else {
            self.media_root.join(folder)
        })
    }

    /// Start the player on a category
    pub fn play(&self, category: &str, random: bool) -> Result<Reply> {
        let info = self
            .config
            .categories
            .get(category)
            .ok_or_else(|| CommandError::UnknownCategory(category.to_string()))?;
        let Some(folder) = self.folder_for(category).filter(|f| f.is_dir()) else {
            return Ok(Reply::say(format!("{} folder not found.", category)));
        };

        let files = list_media_files(&folder, &self.config.extensions)?;
        if files.is_empty() {
            return Ok(Reply::say(format!("No {} files found.", category)));
        }

        let last_index = self
            .state
            .load()?
            .get(category)
            .map(|s| s.last_index)
            .unwrap_or(0);
        let plan = plan_playback(files, last_index, random);

        self.player.launch(&plan.files, info.kind, random)?;

        self.state.update(|state| {
            state.insert(
                category.to_string(),
                CategoryState {
                    last_index: plan.next_index,
                },
            );
            ((), true)
        })?;

        log::info!(
            "✓ Playing {} ({} files, next start {})",
            category,
            plan.files.len(),
            plan.next_index
        );
        Ok(Reply::say(format!(
            "Playing your {}{} now.",
            category,
            if random { " in random order" } else { "" }
        )))
    }

    fn control(&self, command: VlcCommand) -> Reply {
        match self.player.send(command) {
            Ok(()) => Reply::default(),
            Err(e) => {
                log::warn!("Player control failed: {:#}", e);
                Reply::say("Failed to control VLC.")
            }
        }
    }

    fn control_for(&self, command: &str) -> Option<VlcCommand> {
        let has = |verbs: &[&str], category: &str| {
            verbs
                .iter()
                .any(|verb| command.contains(&format!("{} {}", verb, category)))
        };

        for category in &self.match_order {
            if has(&["pause", "resume", "continue"], category) {
                return Some(VlcCommand::Pause);
            }
            if has(&["stop"], category) {
                return Some(VlcCommand::Stop);
            }
            if has(&["skip", "next"], category) {
                return Some(VlcCommand::Next);
            }
        }

        let step = self.config.volume_step;
        let has_word = |word: &str| command.split_whitespace().any(|w| w == word);
        if command.contains("volume up") {
            Some(VlcCommand::VolumeUp(step))
        } else if command.contains("volume down") {
            Some(VlcCommand::VolumeDown(step))
        } else if has_word("unmute") {
            Some(VlcCommand::SetVolume(100))
        } else if has_word("mute") {
            Some(VlcCommand::SetVolume(0))
        } else {
            None
        }
    }
}

impl CommandHandler for MediaTask {
    fn name(&self) -> &'static str {
        "media"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        for category in &self.match_order {
            if command.contains(&format!("play random {}", category)) {
                return self.play(category, true).map(Some);
            }
            if command.contains(&format!("play {}", category)) {
                return self.play(category, false).map(Some);
            }
        }

        Ok(self.control_for(command).map(|cmd| self.control(cmd)))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Player double recording launches and control commands
    #[derive(Default)]
    pub struct RecordingPlayer {
        pub launches: Mutex<Vec<(Vec<PathBuf>, MediaKind, bool)>>,
        pub sent: Mutex<Vec<VlcCommand>>,
        pub offline: bool,
    }

    impl MediaPlayer for RecordingPlayer {
        fn launch(&self, files: &[PathBuf], kind: MediaKind, random: bool) -> Result<()> {
            self.launches
                .lock()
                .unwrap()
                .push((files.to_vec(), kind, random));
            Ok(())
        }

        fn send(&self, command: VlcCommand) -> Result<()> {
            if self.offline {
                anyhow::bail!("connection refused");
            }
            self.sent.lock().unwrap().push(command);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPlayer;
    use super::*;
    use proptest::prelude::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn setup(player: Arc<RecordingPlayer>) -> (tempfile::TempDir, MediaTask) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        std::fs::create_dir_all(root.join("music")).unwrap();
        std::fs::create_dir_all(root.join("study_music")).unwrap();
        for name in ["b.mp3", "a.mp3", "c.MP3", "notes.txt"] {
            std::fs::write(root.join("music").join(name), b"").unwrap();
        }
        std::fs::write(root.join("study_music").join("focus.wav"), b"").unwrap();

        let task = MediaTask::new(
            MediaConfig::default(),
            root,
            dir.path().join("media_state.json"),
            player,
        )
        .unwrap();
        (dir, task)
    }

    #[test]
    fn test_plan_rotation() {
        let plan = plan_playback(paths(&["a", "b", "c"]), 1, false);
        assert_eq!(plan.files, paths(&["b", "c", "a"]));
        assert_eq!(plan.next_index, 2);

        let plan = plan_playback(paths(&["a", "b", "c"]), 2, false);
        assert_eq!(plan.next_index, 0);
    }

    #[test]
    fn test_plan_out_of_range_resets() {
        let plan = plan_playback(paths(&["a", "b"]), 7, false);
        assert_eq!(plan.files, paths(&["a", "b"]));
        assert_eq!(plan.next_index, 1);
    }

    #[test]
    fn test_plan_random_resets() {
        let plan = plan_playback(paths(&["a", "b", "c"]), 2, true);
        assert_eq!(plan.files, paths(&["a", "b", "c"]));
        assert_eq!(plan.next_index, 0);
    }

    #[test]
    fn test_play_resumes_rotation() {
        let player = Arc::new(RecordingPlayer::default());
        let (_dir, task) = setup(player.clone());

        let reply = task.handle("play music").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["Playing your music now."]);
        task.handle("play music").unwrap();

        fn names(files: &[PathBuf]) -> Vec<String> {
            files
                .iter()
                .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        }

        let launches = player.launches.lock().unwrap();
        assert_eq!(names(&launches[0].0), vec!["a.mp3", "b.mp3", "c.MP3"]);
        assert_eq!(names(&launches[1].0), vec!["b.mp3", "c.MP3", "a.mp3"]);
        assert_eq!(launches[0].1, MediaKind::Music);

        assert_eq!(task.state.load().unwrap()["music"].last_index, 2);
    }

    #[test]
    fn test_longest_category_wins() {
        let player = Arc::new(RecordingPlayer::default());
        let (_dir, task) = setup(player.clone());

        let reply = task.handle("play random study music").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["Playing your study music in random order now."]);
        let launches = player.launches.lock().unwrap();
        assert_eq!(launches[0].0.len(), 1);
        assert!(launches[0].2);
    }

    #[test]
    fn test_missing_folder_and_empty_folder() {
        let player = Arc::new(RecordingPlayer::default());
        let (dir, task) = setup(player.clone());

        let reply = task.handle("play video").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["video folder not found."]);

        std::fs::create_dir_all(dir.path().join("media/devotional")).unwrap();
        let reply = task.handle("play devotional").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["No devotional files found."]);
        assert!(player.launches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_control_vocabulary() {
        let player = Arc::new(RecordingPlayer::default());
        let (_dir, task) = setup(player.clone());

        for command in [
            "pause music",
            "continue video",
            "stop study music",
            "next music",
            "volume up",
            "volume down",
            "unmute",
            "mute",
        ] {
            assert!(task.handle(command).unwrap().is_some(), "{}", command);
        }

        assert_eq!(
            *player.sent.lock().unwrap(),
            vec![
                VlcCommand::Pause,
                VlcCommand::Pause,
                VlcCommand::Stop,
                VlcCommand::Next,
                VlcCommand::VolumeUp(20),
                VlcCommand::VolumeDown(20),
                VlcCommand::SetVolume(100),
                VlcCommand::SetVolume(0),
            ]
        );
    }

    #[test]
    fn test_mute_needs_whole_word() {
        let player = Arc::new(RecordingPlayer::default());
        let (_dir, task) = setup(player.clone());

        assert!(task.handle("add task commute to work").unwrap().is_none());
        assert!(task.handle("please mute").unwrap().is_some());
        assert_eq!(*player.sent.lock().unwrap(), vec![VlcCommand::SetVolume(0)]);
    }

    #[test]
    fn test_control_failure_is_spoken() {
        let player = Arc::new(RecordingPlayer {
            offline: true,
            ..Default::default()
        });
        let (_dir, task) = setup(player);
        let reply = task.handle("pause music").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["Failed to control VLC."]);
    }

    #[test]
    fn test_unrelated_command_passes() {
        let (_dir, task) = setup(Arc::new(RecordingPlayer::default()));
        assert!(task.handle("show tasks").unwrap().is_none());
        assert!(task.handle("play pictures").unwrap().is_none());
    }

    #[test]
    fn test_unknown_category_is_error() {
        let (_dir, task) = setup(Arc::new(RecordingPlayer::default()));
        assert!(task.play("podcasts", false).is_err());
    }

    proptest! {
        #[test]
        fn prop_rotation_is_a_permutation(len in 1usize..20, last in 0usize..40) {
            let files: Vec<PathBuf> = (0..len).map(|i| PathBuf::from(format!("{:02}", i))).collect();
            let plan = plan_playback(files.clone(), last, false);

            let mut sorted = plan.files.clone();
            sorted.sort();
            prop_assert_eq!(sorted, files);
            prop_assert!(plan.next_index < len);
        }
    }
}
