//! Speech in and out
//!
//! `Speaker` turns replies into audio, `Listener` turns audio (or typed
//! lines) into text. `WakeWordGate` sits on top of a listener and only hands
//! out commands that were addressed to the assistant.

pub mod ducking;
pub mod listener;
pub mod tts;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::playback::SoundPlayer;
use ducking::{DuckGuard, VolumeDucker};

pub use ducking::{DuckingConfig, PactlDucker};
pub use listener::{ConsoleListener, MicListener, Transcriber, WhisperHttpTranscriber};
pub use tts::CommandSpeaker;

/// Something that can say a line out loud
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
}

/// Outcome of one listen attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Phrase(String),
    /// Timeout, silence, or speech that could not be transcribed
    Nothing,
    /// Input is gone for good (stdin closed)
    Closed,
}

/// Source of recognised phrases
pub trait Listener {
    /// Wait for one phrase. `timeout` bounds the wait for speech to start
    /// (`None` waits forever), `phrase_limit` bounds the phrase itself.
    fn listen(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Result<Heard>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    Microphone,
    Console,
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// TTS command. Placeholders: `{rate}`, `{text}`
    pub tts_command: Vec<String>,
    pub rate: u32,
    pub listener: ListenerKind,
    /// Base URL of a Whisper-compatible transcription server
    pub stt_url: String,
    pub stt_model: String,
    /// Env var holding a bearer token for the transcription server, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_api_key_env: Option<String>,
    pub wake_phrase_limit_secs: u64,
    pub command_timeout_secs: u64,
    pub command_phrase_limit_secs: u64,
    /// Silence that ends a phrase
    pub trailing_silence_ms: u32,
    pub ducking: DuckingConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_command: ["espeak-ng", "-s", "{rate}", "{text}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rate: 160,
            listener: ListenerKind::Microphone,
            stt_url: "http://127.0.0.1:8080".into(),
            stt_model: "whisper-1".into(),
            stt_api_key_env: None,
            wake_phrase_limit_secs: 40,
            command_timeout_secs: 10,
            command_phrase_limit_secs: 100,
            trailing_silence_ms: 1200,
            ducking: DuckingConfig::default(),
        }
    }
}

/// Returns the text after the first wake word found in `heard`, or `None`
/// when no wake word was said. Matching is case-insensitive.
pub fn strip_wake_word(heard: &str, wake_words: &[String]) -> Option<String> {
    let heard = heard.to_lowercase();
    wake_words
        .iter()
        .filter(|w| !w.trim().is_empty())
        .filter_map(|w| {
            let w = w.trim().to_lowercase();
            heard.find(&w).map(|at| (at, at + w.len()))
        })
        .min_by_key(|&(at, _)| at)
        .map(|(_, end)| {
            heard[end..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                .trim()
                .to_string()
        })
}

/// Listens for a wake word, then for the command that follows it
pub struct WakeWordGate {
    listener: Box<dyn Listener>,
    wake_words: Vec<String>,
    sound: Arc<dyn SoundPlayer>,
    ducker: Arc<dyn VolumeDucker>,
    config: SpeechConfig,
}

impl WakeWordGate {
    pub fn new(
        listener: Box<dyn Listener>,
        wake_words: Vec<String>,
        sound: Arc<dyn SoundPlayer>,
        ducker: Arc<dyn VolumeDucker>,
        config: SpeechConfig,
    ) -> Self {
        Self {
            listener,
            wake_words,
            sound,
            ducker,
            config,
        }
    }

    /// One wake cycle. `Heard::Phrase` carries the lowercased command.
    pub fn next_command(&mut self) -> Result<Heard> {
        log::debug!("🎧 Listening for wake word...");
        let heard = match self
            .listener
            .listen(None, Duration::from_secs(self.config.wake_phrase_limit_secs))?
        {
            Heard::Phrase(text) => text,
            other => return Ok(other),
        };

        let Some(rest) = strip_wake_word(&heard, &self.wake_words) else {
            log::debug!("Wake word not detected in '{}'", heard);
            return Ok(Heard::Nothing);
        };
        if !rest.is_empty() {
            log::info!("🎙️ Command: {}", rest);
            return Ok(Heard::Phrase(rest));
        }

        // Media stays ducked until the command phrase is captured
        let _duck = DuckGuard::new(self.ducker.as_ref());
        std::thread::sleep(Duration::from_millis(500));
        self.beep();

        log::debug!("🎧 Listening for command...");
        let command = self.listener.listen(
            Some(Duration::from_secs(self.config.command_timeout_secs)),
            Duration::from_secs(self.config.command_phrase_limit_secs),
        )?;
        self.beep();

        Ok(match command {
            Heard::Phrase(text) => {
                let text = text.trim().to_lowercase();
                log::info!("🎙️ Command: {}", text);
                if text.is_empty() {
                    Heard::Nothing
                } else {
                    Heard::Phrase(text)
                }
            }
            other => other,
        })
    }

    fn beep(&self) {
        if let Err(e) = self.sound.play_beep() {
            log::debug!("Beep failed: {}", e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Speaker double that records every line
    #[derive(Default)]
    pub struct RecordingSpeaker {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingSpeaker {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&self, text: &str) -> Result<()> {
            self.lines.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Listener double replaying a script
    pub struct ScriptedListener {
        pub script: VecDeque<Heard>,
        pub timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
    }

    impl ScriptedListener {
        pub fn new(script: Vec<Heard>) -> Self {
            Self {
                script: script.into(),
                timeouts: Arc::default(),
            }
        }
    }

    impl Listener for ScriptedListener {
        fn listen(&mut self, timeout: Option<Duration>, _phrase_limit: Duration) -> Result<Heard> {
            self.timeouts.lock().unwrap().push(timeout);
            Ok(self.script.pop_front().unwrap_or(Heard::Closed))
        }
    }

    /// Sound double counting what was played
    #[derive(Default)]
    pub struct CountingSound {
        pub files: Mutex<Vec<std::path::PathBuf>>,
        pub alarms: Mutex<usize>,
        pub beeps: Mutex<usize>,
    }

    impl SoundPlayer for CountingSound {
        fn play_file(&self, path: &std::path::Path) -> Result<()> {
            self.files.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        fn play_alarm_tone(&self) -> Result<()> {
            *self.alarms.lock().unwrap() += 1;
            Ok(())
        }

        fn play_beep(&self) -> Result<()> {
            *self.beeps.lock().unwrap() += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::speech::ducking::testing::RecordingDucker;

    fn wake_words() -> Vec<String> {
        vec!["ok jarvis".into(), "ok bro".into()]
    }

    fn gate(script: Vec<Heard>) -> (WakeWordGate, Arc<CountingSound>, Arc<RecordingDucker>) {
        let sound = Arc::new(CountingSound::default());
        let ducker = Arc::new(RecordingDucker::default());
        let gate = WakeWordGate::new(
            Box::new(ScriptedListener::new(script)),
            wake_words(),
            sound.clone(),
            ducker.clone(),
            SpeechConfig::default(),
        );
        (gate, sound, ducker)
    }

    #[test]
    fn test_strip_wake_word() {
        assert_eq!(
            strip_wake_word("OK Jarvis, play music", &wake_words()),
            Some("play music".to_string())
        );
        assert_eq!(strip_wake_word("hey ok bro", &wake_words()), Some(String::new()));
        assert_eq!(strip_wake_word("play music", &wake_words()), None);
    }

    #[test]
    fn test_earliest_wake_word_wins() {
        let words = vec!["jarvis".to_string(), "ok jarvis".to_string()];
        assert_eq!(
            strip_wake_word("ok jarvis stop music", &words),
            Some("stop music".to_string())
        );
    }

    #[test]
    fn test_inline_command_skips_second_listen() {
        let (mut gate, sound, ducker) = gate(vec![Heard::Phrase("ok jarvis show tasks".into())]);
        assert_eq!(gate.next_command().unwrap(), Heard::Phrase("show tasks".into()));
        assert_eq!(*sound.beeps.lock().unwrap(), 0);
        assert!(ducker.events().is_empty());
    }

    #[test]
    fn test_wake_word_then_command_ducks_and_restores() {
        let (mut gate, sound, ducker) = gate(vec![
            Heard::Phrase("ok bro".into()),
            Heard::Phrase("Volume Up".into()),
        ]);
        assert_eq!(gate.next_command().unwrap(), Heard::Phrase("volume up".into()));
        assert_eq!(*sound.beeps.lock().unwrap(), 2);
        assert_eq!(ducker.events(), vec!["lower", "restore"]);
    }

    #[test]
    fn test_restores_volume_when_command_times_out() {
        let (mut gate, _sound, ducker) = gate(vec![Heard::Phrase("ok jarvis".into()), Heard::Nothing]);
        assert_eq!(gate.next_command().unwrap(), Heard::Nothing);
        assert_eq!(ducker.events(), vec!["lower", "restore"]);
    }

    #[test]
    fn test_phrase_without_wake_word_is_ignored() {
        let (mut gate, _sound, _ducker) = gate(vec![Heard::Phrase("play music".into())]);
        assert_eq!(gate.next_command().unwrap(), Heard::Nothing);
    }

    #[test]
    fn test_closed_input_propagates() {
        let (mut gate, _sound, _ducker) = gate(vec![]);
        assert_eq!(gate.next_command().unwrap(), Heard::Closed);
    }
}
