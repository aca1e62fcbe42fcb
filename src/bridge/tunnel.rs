//! Public tunnel to the local webhook (ngrok)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub enable: bool,
    pub binary: String,
    pub auth_token_env: String,
    /// Local inspection API listing active tunnels
    pub inspect_url: String,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    /// File the public URL is written back to
    pub env_file: PathBuf,
    pub public_url_key: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enable: true,
            binary: "ngrok".into(),
            auth_token_env: "NGROK_AUTH_TOKEN".into(),
            inspect_url: "http://127.0.0.1:4040/api/tunnels".into(),
            poll_attempts: 15,
            poll_interval_ms: 1000,
            env_file: PathBuf::from(".env"),
            public_url_key: "NGROK_PUBLIC_URL".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    #[serde(default)]
    proto: String,
}

/// Webhook URL from the inspection API's tunnel list, preferring https
pub fn webhook_url_from_tunnels(body: &str, route: &str) -> Result<Option<String>> {
    let list: TunnelList = serde_json::from_str(body).context("Failed to parse tunnel list")?;
    let chosen = list
        .tunnels
        .iter()
        .find(|t| t.proto == "https" || t.public_url.starts_with("https://"))
        .or_else(|| list.tunnels.first());

    Ok(chosen.map(|t| {
        format!(
            "{}/{}",
            t.public_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }))
}

/// Set `key=value` in a dotenv file, replacing an existing line or appending
pub fn update_env_variable(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };

    let prefix = format!("{}=", key);
    let mut found = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if line.starts_with(&prefix) {
                found = true;
                format!("{}{}", prefix, value)
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push(format!("{}{}", prefix, value));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
}

/// Running tunnel process; stopped on drop
pub struct Tunnel {
    child: Child,
    pub public_url: String,
}

impl Tunnel {
    /// Register the auth token, start `ngrok http <port>` and wait for the
    /// public URL to show up on the inspection API
    pub async fn start(config: &TunnelConfig, port: u16, route: &str) -> Result<Self> {
        if let Ok(token) = std::env::var(&config.auth_token_env) {
            let output = Command::new(&config.binary)
                .args(["config", "add-authtoken", token.trim()])
                .output()
                .with_context(|| {
                    format!("'{}' not found. Is it installed and on PATH?", config.binary)
                })?;
            if !output.status.success() {
                bail!(
                    "Error setting {} auth token: {}",
                    config.binary,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        } else {
            log::warn!(
                "{} not set; relying on existing {} configuration",
                config.auth_token_env,
                config.binary
            );
        }

        let child = Command::new(&config.binary)
            .arg("http")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", config.binary))?;
        // From here on the child is killed on any early return
        let mut tunnel = Self {
            child,
            public_url: String::new(),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        let mut last_error = None;
        for attempt in 1..=config.poll_attempts.max(1) {
            tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;

            let body = match client.get(&config.inspect_url).send().await {
                Ok(res) => res.text().await.context("Failed to read tunnel list")?,
                Err(e) => {
                    log::debug!("Tunnel API not ready (attempt {}): {}", attempt, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            if let Some(url) = webhook_url_from_tunnels(&body, route)? {
                log::info!("🚀 Public URL: {}", url);
                if let Err(e) = update_env_variable(&config.env_file, &config.public_url_key, &url) {
                    log::warn!("Could not record public URL: {:#}", e);
                }
                tunnel.public_url = url;
                return Ok(tunnel);
            }
            log::debug!("No tunnels yet (attempt {})", attempt);
        }

        bail!(
            "No public tunnel after {} attempts{}",
            config.poll_attempts,
            last_error.map(|e| format!(" (last error: {})", e)).unwrap_or_default()
        )
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        log::info!("Tunnel stopped");
    }
}
