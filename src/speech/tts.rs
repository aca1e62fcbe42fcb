use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::process::Command;

use super::Speaker;

/// Text-to-speech through an external engine (espeak-ng by default)
pub struct CommandSpeaker {
    name: String,
    command: Vec<String>,
    rate: u32,
}

impl CommandSpeaker {
    pub fn new(name: impl Into<String>, command: Vec<String>, rate: u32) -> Self {
        Self {
            name: name.into(),
            command,
            rate,
        }
    }

    /// Command line for one utterance
    pub fn render(&self, text: &str) -> Vec<String> {
        let rate = self.rate.to_string();
        self.command
            .iter()
            .map(|arg| arg.replace("{rate}", &rate).replace("{text}", text))
            .collect()
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        log::info!("[{} says] {}", self.name, text);
        if text.trim().is_empty() {
            return Ok(());
        }

        let args = self.render(text);
        let Some((program, rest)) = args.split_first() else {
            return Ok(());
        };

        match Command::new(program).args(rest).status() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                log::warn!("TTS exited with {}", status);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("TTS engine '{}' not found; reply shown in log only", program);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to run TTS engine '{}'", program)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaker(command: &[&str]) -> CommandSpeaker {
        CommandSpeaker::new(
            "Jarvis",
            command.iter().map(|s| s.to_string()).collect(),
            160,
        )
    }

    #[test]
    fn test_render_substitutes_rate_and_text() {
        let args = speaker(&["espeak-ng", "-s", "{rate}", "{text}"]).render("Task not found.");
        assert_eq!(args, vec!["espeak-ng", "-s", "160", "Task not found."]);
    }

    #[test]
    fn test_text_is_one_argument() {
        let args = speaker(&["say", "{text}"]).render("remind me to stretch; at 5 pm");
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], "remind me to stretch; at 5 pm");
    }

    #[test]
    fn test_missing_engine_is_not_an_error() {
        assert!(speaker(&["no-such-tts-engine-xyz", "{text}"]).speak("hello").is_ok());
    }
}
