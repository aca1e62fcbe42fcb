use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::sync::Arc;
use url::Url;

use crate::router::{CommandHandler, Reply};

const TRIGGER: &str = "open youtube and play";
const SEARCH_URL: &str = "https://www.youtube.com/results";

/// Browser configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit browser command, placeholder `{url}`. The system default
    /// browser is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

pub trait Browser: Send + Sync {
    fn open(&self, url: &Url) -> Result<()>;
}

pub struct CommandBrowser {
    config: BrowserConfig,
}

impl CommandBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl Browser for CommandBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        let Some(template) = &self.config.command else {
            return open::that(url.as_str()).context("Failed to open the default browser");
        };

        let args = render_command(template, url);
        let (program, rest) = args.split_first().context("Empty browser command")?;

        let mut child = Command::new(program)
            .args(rest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start browser '{}'", program))?;

        // Reap the launcher once it exits
        std::thread::Builder::new()
            .name("browser-reaper".into())
            .spawn(move || {
                let _ = child.wait();
            })
            .context("Failed to spawn browser reaper thread")?;
        Ok(())
    }
}

fn render_command(template: &[String], url: &Url) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{url}", url.as_str()))
        .collect()
}

/// Results page for `keyword`
pub fn search_url(keyword: &str) -> Result<Url> {
    Url::parse_with_params(SEARCH_URL, &[("search_query", keyword)])
        .context("Failed to build search URL")
}

/// Handles `open youtube and play <keyword>`
pub struct YoutubeTask {
    browser: Arc<dyn Browser>,
}

impl YoutubeTask {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self { browser }
    }
}

impl CommandHandler for YoutubeTask {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        if !command.contains(TRIGGER) {
            return Ok(None);
        }

        let keyword = command.replacen(TRIGGER, "", 1).trim().to_string();
        if keyword.is_empty() {
            return Ok(Some(Reply::say(
                "Please tell me what to search for on YouTube.",
            )));
        }

        let reply = match search_url(&keyword).and_then(|url| self.browser.open(&url)) {
            Ok(()) => Reply::say(format!("Opening YouTube and searching for {}", keyword)),
            Err(e) => {
                log::error!("YouTube search failed: {:#}", e);
                Reply::say("Something went wrong while trying to open YouTube.")
            }
        };
        Ok(Some(reply))
    }
}
