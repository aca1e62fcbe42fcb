/**
 * Preflight checks for the assistant's external collaborators
 *
 * Verifies the audio stack, microphone, and the desktop tools the handlers
 * shell out to (player, TTS, overlays, tunnel). Returns a structured report
 * for `jarvis doctor`.
 */
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use crate::config::AppConfig;

/// Status of an individual preflight check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Individual preflight check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightItem {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub fix_hint: Option<String>,
}

/// Complete preflight report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub items: Vec<PreflightItem>,
    pub overall: CheckStatus,
    pub can_proceed: bool,
}

impl PreflightReport {
    pub fn from_items(items: Vec<PreflightItem>) -> Self {
        let overall = Self::compute_overall(&items);
        let can_proceed = Self::can_proceed(&items);
        Self {
            items,
            overall,
            can_proceed,
        }
    }

    /// Determine overall status from individual checks
    fn compute_overall(items: &[PreflightItem]) -> CheckStatus {
        if items.iter().any(|i| i.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else if items.iter().any(|i| i.status == CheckStatus::Warn) {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        }
    }

    /// Can the assistant start despite warnings?
    fn can_proceed(items: &[PreflightItem]) -> bool {
        !items.iter().any(|i| i.status == CheckStatus::Fail)
    }
}

/// Run all preflight checks
pub fn run_preflight(config: &AppConfig) -> PreflightReport {
    log::info!("Starting preflight checks...");

    let first = |command: &[String]| command.first().cloned().unwrap_or_default();
    let mut items = vec![check_audio_stack(), check_mic_access()];

    items.push(check_binary(
        "media_player",
        &config.media.player,
        CheckStatus::Warn,
        "Install VLC:\n\
         • Arch: sudo pacman -S vlc\n\
         • Ubuntu/Debian: sudo apt install vlc\n\
         • Fedora: sudo dnf install vlc",
    ));
    items.push(check_binary(
        "tts",
        &first(&config.speech.tts_command),
        CheckStatus::Warn,
        "Install espeak-ng (replies are only logged without it):\n\
         • Ubuntu/Debian: sudo apt install espeak-ng",
    ));
    items.push(check_binary(
        "overlay",
        &first(&config.ui.notify_command),
        CheckStatus::Warn,
        "Install zenity for reminder and list overlays:\n\
         • Ubuntu/Debian: sudo apt install zenity",
    ));
    items.push(check_binary(
        "ducking",
        "pactl",
        CheckStatus::Warn,
        "Install pulseaudio-utils so music can be lowered while listening",
    ));
    items.push(check_binary(
        "slideshow",
        &first(&config.pictures.viewer_command),
        CheckStatus::Warn,
        "Install feh for picture slideshows:\n\
         • Ubuntu/Debian: sudo apt install feh",
    ));
    match &config.browser.command {
        Some(command) => items.push(check_binary(
            "browser",
            &first(command),
            CheckStatus::Warn,
            "Set [browser] command in config.toml to an installed browser, or remove it to use the default",
        )),
        None => items.push(pass("browser", "Using the system default browser")),
    }
    if config.bridge.tunnel.enable {
        items.push(check_binary(
            "tunnel",
            &config.bridge.tunnel.binary,
            CheckStatus::Warn,
            "Install ngrok and set NGROK_AUTH_TOKEN, or run `jarvis serve --no-tunnel`",
        ));
    }
    items.push(check_env_var(
        "llm_key",
        &config.llm.api_key_env,
        "Unmatched commands need a language model key; add it to .env",
    ));

    for item in &items {
        match item.status {
            CheckStatus::Pass => log::info!("✓ {}: {}", item.name, item.message),
            CheckStatus::Warn => log::warn!("{}: {}", item.name, item.message),
            CheckStatus::Fail => log::error!("{}: {}", item.name, item.message),
        }
    }

    let report = PreflightReport::from_items(items);
    log::info!("Preflight complete: {:?}", report.overall);
    report
}

/// Check for PipeWire or PulseAudio
fn check_audio_stack() -> PreflightItem {
    let runs = |bin: &str| {
        Command::new(bin)
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };

    if runs("pw-cli") {
        return pass("audio_stack", "PipeWire detected");
    }
    if runs("pactl") {
        return pass("audio_stack", "PulseAudio detected");
    }

    PreflightItem {
        name: "audio_stack".to_string(),
        status: CheckStatus::Warn,
        message: "No audio server detected (PipeWire or PulseAudio)".to_string(),
        fix_hint: Some(
            "Install PipeWire or PulseAudio:\n\
             • Arch: sudo pacman -S pipewire pipewire-pulse\n\
             • Ubuntu/Debian: sudo apt install pipewire pipewire-pulse\n\
             • Fedora: sudo dnf install pipewire pipewire-pulseaudio"
                .to_string(),
        ),
    }
}

/// Check microphone access (basic probe)
fn check_mic_access() -> PreflightItem {
    use cpal::traits::HostTrait;

    match cpal::default_host().input_devices() {
        Ok(mut devices) => {
            if devices.next().is_some() {
                pass("mic_access", "Microphone devices found")
            } else {
                PreflightItem {
                    name: "mic_access".to_string(),
                    status: CheckStatus::Warn,
                    message: "No microphone devices detected".to_string(),
                    fix_hint: Some(
                        "Connect a microphone, or use `jarvis run --text`".to_string(),
                    ),
                }
            }
        }
        Err(e) => PreflightItem {
            name: "mic_access".to_string(),
            status: CheckStatus::Fail,
            message: format!("Cannot access audio devices: {}", e),
            fix_hint: Some(
                "Check permissions and audio configuration:\n\
                 • Ensure user is in 'audio' group: sudo usermod -aG audio $USER\n\
                 • Verify audio server is running (PipeWire/PulseAudio)"
                    .to_string(),
            ),
        },
    }
}

/// A binary is present when it can be started at all; its exit code is
/// ignored since not every tool knows `--version`.
fn check_binary(name: &str, binary: &str, missing: CheckStatus, hint: &str) -> PreflightItem {
    if binary.is_empty() {
        return PreflightItem {
            name: name.to_string(),
            status: missing,
            message: "No command configured".to_string(),
            fix_hint: Some(hint.to_string()),
        };
    }

    let started = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match started {
        Ok(_) => pass(name, &format!("{} found", binary)),
        Err(e) if e.kind() == ErrorKind::NotFound => PreflightItem {
            name: name.to_string(),
            status: missing,
            message: format!("'{}' not found on PATH", binary),
            fix_hint: Some(hint.to_string()),
        },
        Err(e) => PreflightItem {
            name: name.to_string(),
            status: CheckStatus::Warn,
            message: format!("'{}' could not be started: {}", binary, e),
            fix_hint: Some(hint.to_string()),
        },
    }
}

fn check_env_var(name: &str, var: &str, hint: &str) -> PreflightItem {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => pass(name, &format!("{} is set", var)),
        _ => PreflightItem {
            name: name.to_string(),
            status: CheckStatus::Warn,
            message: format!("{} is not set", var),
            fix_hint: Some(hint.to_string()),
        },
    }
}

fn pass(name: &str, message: &str) -> PreflightItem {
    PreflightItem {
        name: name.to_string(),
        status: CheckStatus::Pass,
        message: message.to_string(),
        fix_hint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: CheckStatus) -> PreflightItem {
        PreflightItem {
            name: "x".into(),
            status,
            message: String::new(),
            fix_hint: None,
        }
    }

    #[test]
    fn test_overall_status() {
        let report = PreflightReport::from_items(vec![item(CheckStatus::Pass), item(CheckStatus::Pass)]);
        assert_eq!(report.overall, CheckStatus::Pass);
        assert!(report.can_proceed);

        let report = PreflightReport::from_items(vec![item(CheckStatus::Pass), item(CheckStatus::Warn)]);
        assert_eq!(report.overall, CheckStatus::Warn);
        assert!(report.can_proceed);

        let report = PreflightReport::from_items(vec![item(CheckStatus::Warn), item(CheckStatus::Fail)]);
        assert_eq!(report.overall, CheckStatus::Fail);
        assert!(!report.can_proceed);
    }

    #[test]
    fn test_missing_binary_uses_given_status() {
        let result = check_binary(
            "tts",
            "definitely-not-a-real-binary-4711",
            CheckStatus::Warn,
            "install it",
        );
        assert_eq!(result.status, CheckStatus::Warn);
        assert_eq!(result.fix_hint.as_deref(), Some("install it"));

        let result = check_binary("tts", "", CheckStatus::Fail, "configure it");
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[test]
    fn test_env_var_check() {
        std::env::set_var("JARVIS_PREFLIGHT_TEST_KEY", "abc");
        assert_eq!(
            check_env_var("llm_key", "JARVIS_PREFLIGHT_TEST_KEY", "").status,
            CheckStatus::Pass
        );
        assert_eq!(
            check_env_var("llm_key", "JARVIS_PREFLIGHT_TEST_MISSING", "").status,
            CheckStatus::Warn
        );
    }

    #[test]
    fn test_report_serializes_lowercase_status() {
        let report = PreflightReport::from_items(vec![item(CheckStatus::Warn)]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["overall"], "warn");
        assert_eq!(value["can_proceed"], true);
    }
}
