//! Full-screen overlays for reminders and list views
//!
//! The assistant has no GUI of its own. Overlays are drawn by an external
//! dialog tool (zenity by default) started from a command template.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::process::Command;
use std::time::Duration;

/// Overlay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Blocking notification, waits until dismissed or timed out.
    /// Placeholders: `{title}`, `{body}`, `{timeout}`
    pub notify_command: Vec<String>,
    /// Self-closing list view. Placeholders: `{title}`, `{body}`, `{timeout}`
    pub list_command: Vec<String>,
    /// Escape `& < >` for dialog tools that parse Pango markup
    pub escape_markup: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            notify_command: [
                "zenity",
                "--info",
                "--title={title}",
                "--text={body}",
                "--ok-label=Dismiss",
                "--timeout={timeout}",
                "--width=1200",
                "--height=700",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            list_command: [
                "zenity",
                "--info",
                "--title={title}",
                "--text={body}",
                "--ok-label=Close",
                "--timeout={timeout}",
                "--width=1200",
                "--height=700",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            escape_markup: true,
        }
    }
}

/// Something that can put text in front of the user
pub trait Overlay: Send + Sync {
    /// Show and wait until the user dismisses it or `timeout` passes
    fn show_blocking(&self, title: &str, body: &str, timeout: Duration) -> Result<()>;

    /// Show without waiting; closes itself after `timeout`
    fn show_detached(&self, title: &str, body: &str, timeout: Duration);
}

/// Overlay backed by an external dialog command
pub struct CommandOverlay {
    config: UiConfig,
}

impl CommandOverlay {
    pub fn new(config: UiConfig) -> Self {
        Self { config }
    }

    fn build(&self, template: &[String], title: &str, body: &str, timeout: Duration) -> Option<Command> {
        let body = if self.config.escape_markup {
            escape_markup(body)
        } else {
            body.to_string()
        };
        let args = render_template(template, title, &body, timeout);
        let (program, rest) = args.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        Some(cmd)
    }
}

impl Overlay for CommandOverlay {
    fn show_blocking(&self, title: &str, body: &str, timeout: Duration) -> Result<()> {
        let Some(mut cmd) = self.build(&self.config.notify_command, title, body, timeout)
        else {
            log::info!("[{}] {}", title, body);
            return Ok(());
        };

        match cmd.status() {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Overlay tool not found; showing in log instead");
                log::info!("[{}] {}", title, body);
                Ok(())
            }
            Err(e) => Err(e).context("Failed to run overlay command"),
        }
    }

    fn show_detached(&self, title: &str, body: &str, timeout: Duration) {
        let Some(mut cmd) = self.build(&self.config.list_command, title, body, timeout) else {
            log::info!("[{}] {}", title, body);
            return;
        };

        match cmd.spawn() {
            Ok(mut child) => {
                // Reap the dialog once it closes
                let _ = std::thread::Builder::new()
                    .name("overlay-reaper".into())
                    .spawn(move || {
                        let _ = child.wait();
                    });
            }
            Err(e) => {
                log::warn!("Failed to show overlay: {}", e);
                log::info!("[{}] {}", title, body);
            }
        }
    }
}

/// Substitute `{title}`, `{body}` and `{timeout}` (seconds) in every argument
pub fn render_template(template: &[String], title: &str, body: &str, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().to_string();
    template
        .iter()
        .map(|arg| {
            arg.replace("{title}", title)
                .replace("{timeout}", &secs)
                .replace("{body}", body)
        })
        .collect()
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Overlay double that records what would have been shown
    #[derive(Default)]
    pub struct RecordingOverlay {
        blocking: Mutex<Vec<(String, String)>>,
        blocking_timeouts: Mutex<Vec<Duration>>,
        detached: Mutex<Vec<(String, String)>>,
    }

    impl RecordingOverlay {
        pub fn blocking(&self) -> Vec<(String, String)> {
            self.blocking.lock().unwrap().clone()
        }

        pub fn blocking_timeouts(&self) -> Vec<Duration> {
            self.blocking_timeouts.lock().unwrap().clone()
        }

        pub fn detached(&self) -> Vec<(String, String)> {
            self.detached.lock().unwrap().clone()
        }
    }

    impl Overlay for RecordingOverlay {
        fn show_blocking(&self, title: &str, body: &str, timeout: Duration) -> Result<()> {
            self.blocking_timeouts.lock().unwrap().push(timeout);
            self.blocking
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }

        fn show_detached(&self, title: &str, body: &str, _timeout: Duration) {
            self.detached
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let template: Vec<String> = ["zenity", "--title={title}", "--text={body}", "--timeout={timeout}"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let args = render_template(&template, "Reminders", "reminder-1: a", Duration::from_secs(10));
        assert_eq!(
            args,
            vec!["zenity", "--title=Reminders", "--text=reminder-1: a", "--timeout=10"]
        );
    }

    #[test]
    fn test_body_placeholders_are_not_expanded() {
        let template = vec!["--text={body}".to_string()];
        let args = render_template(&template, "t", "literal {title}", Duration::ZERO);
        assert_eq!(args, vec!["--text=literal {title}"]);
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(escape_markup("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_notification_closes_after_timeout() {
        let overlay = CommandOverlay::new(UiConfig::default());
        let cmd = overlay
            .build(&overlay.config.notify_command, "Reminder", "reminder-1: stretch", Duration::from_secs(30))
            .unwrap();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--timeout=30".to_string()));
        assert!(args.contains(&"--text=reminder-1: stretch".to_string()));
    }

    #[test]
    fn test_missing_tool_is_not_an_error() {
        let overlay = CommandOverlay::new(UiConfig {
            notify_command: vec!["definitely-not-a-dialog-tool-xyz".into()],
            list_command: vec![],
            escape_markup: false,
        });
        assert!(overlay
            .show_blocking("Reminder", "test", Duration::from_secs(1))
            .is_ok());
        overlay.show_detached("List", "test", Duration::from_secs(1));
    }
}
