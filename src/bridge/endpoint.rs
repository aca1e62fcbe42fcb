//! Pushes the tunnel URL into the skill's developer console
//!
//! Drives a browser over the W3C WebDriver protocol (chromedriver by
//! default): log in, open the skill, switch to the Endpoint tab, replace the
//! default-region URL and save. The console is not ours; every selector it
//! depends on lives in config.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::validation::validate_public_url;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735fa1ec6c";

const KEY_CONTROL: char = '\u{E009}';
const KEY_NULL: char = '\u{E000}';
const KEY_DELETE: char = '\u{E017}';
const KEY_ESCAPE: char = '\u{E00C}';

const POLL: Duration = Duration::from_millis(500);

/// Console DOM hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSelectors {
    pub email_id: String,
    pub continue_id: String,
    pub password_id: String,
    pub submit_id: String,
    pub skill_link_xpath: String,
    pub modal_xpath: String,
    pub modal_close_xpath: String,
    pub endpoint_tab_xpath: String,
    pub endpoint_input_xpath: String,
    pub save_button_xpath: String,
}

impl Default for ConsoleSelectors {
    fn default() -> Self {
        Self {
            email_id: "ap_email".into(),
            continue_id: "continue".into(),
            password_id: "ap_password".into(),
            submit_id: "signInSubmit".into(),
            skill_link_xpath: r#"//*[@id="tenant-content"]/div/div/div/div/div[4]/div[1]/div[1]/div[2]/div/div/div[2]/table/tbody/tr/td[2]/span/span/a/span"#.into(),
            modal_xpath: "//span[contains(@class, 'astro-modal-dialog') and contains(@class, 'getting-started-modal')]".into(),
            modal_close_xpath: "/html/body/div[5]/span/div/div[2]/div/div[2]/button[1]/span".into(),
            endpoint_tab_xpath: r#"//*[@id="root"]/div/div[1]/nav/ol/li[8]/span/span/a"#.into(),
            endpoint_input_xpath: r#"//*[@id="root"]/div/div[2]/div[2]/div[2]/div[4]/div[2]/div/div[1]/div/div[2]/form[1]/div[1]/div[1]/input"#.into(),
            save_button_xpath: r#"//*[@id="root"]/div/div[2]/header/section/div[2]/button/span"#.into(),
        }
    }
}

/// Endpoint updater configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub enable: bool,
    pub webdriver_url: String,
    pub console_url: String,
    pub username_env: String,
    pub password_env: String,
    pub browser_args: Vec<String>,
    pub wait_timeout_secs: u64,
    /// Pause after opening the skill while the console finishes loading
    pub settle_secs: u64,
    pub click_retries: u32,
    pub retry_delay_secs: u64,
    pub save_wait_secs: u64,
    pub selectors: ConsoleSelectors,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enable: true,
            webdriver_url: "http://127.0.0.1:9515".into(),
            console_url: "https://developer.amazon.com/alexa/console/ask".into(),
            username_env: "AMAZON_USERNAME".into(),
            password_env: "AMAZON_PASSWORD".into(),
            browser_args: [
                "--window-size=1920,1080",
                "--start-maximized",
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--force-device-scale-factor=0.75",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            wait_timeout_secs: 30,
            settle_secs: 20,
            click_retries: 5,
            retry_delay_secs: 3,
            save_wait_secs: 2,
            selectors: ConsoleSelectors::default(),
        }
    }
}

/// Console login
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env(config: &EndpointConfig) -> Result<Self> {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} is not set", var))
        };
        Ok(Self {
            username: read(&config.username_env)?,
            password: read(&config.password_env)?,
        })
    }
}

/// Error reported by the WebDriver server
#[derive(Error, Debug)]
#[error("WebDriver {error}: {message}")]
pub struct WebDriverError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub enum Locator<'a> {
    Id(&'a str),
    Css(&'a str),
    XPath(&'a str),
}

impl Locator<'_> {
    fn to_json(self) -> Value {
        let (using, value) = match self {
            Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", id)),
            Locator::Css(css) => ("css selector", css.to_string()),
            Locator::XPath(xpath) => ("xpath", xpath.to_string()),
        };
        json!({ "using": using, "value": value })
    }

    fn describe(self) -> String {
        match self {
            Locator::Id(s) | Locator::Css(s) | Locator::XPath(s) => s.to_string(),
        }
    }
}

/// One browser session
pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
}

impl WebDriverSession {
    pub async fn create(webdriver_url: &str, browser_args: &[String]) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        let root = webdriver_url.trim_end_matches('/');

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": browser_args }
                }
            }
        });
        let response = client
            .post(format!("{}/session", root))
            .json(&capabilities)
            .send()
            .await
            .with_context(|| format!("No WebDriver server at {}", root))?;
        let value = Self::unwrap_value(response).await?;
        let session_id = value["sessionId"]
            .as_str()
            .context("WebDriver did not return a session id")?;

        log::info!("✓ Browser session {} started", session_id);
        Ok(Self {
            client,
            base: format!("{}/session/{}", root, session_id),
        })
    }

    async fn unwrap_value(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.context("Invalid WebDriver response")?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(WebDriverError {
                error: value["error"].as_str().unwrap_or("unknown error").to_string(),
                message: value["message"].as_str().unwrap_or_default().to_string(),
            }
            .into());
        }
        Ok(value)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.context("WebDriver request failed")?;
        Self::unwrap_value(response).await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    pub async fn find(&self, locator: Locator<'_>) -> Result<String> {
        let value = self
            .command(Method::POST, "/element", Some(locator.to_json()))
            .await?;
        value[ELEMENT_KEY]
            .as_str()
            .map(String::from)
            .context("Malformed element reference")
    }

    pub async fn click(&self, element: &str) -> Result<()> {
        self.command(Method::POST, &format!("/element/{}/click", element), Some(json!({})))
            .await
            .map(drop)
    }

    pub async fn clear(&self, element: &str) -> Result<()> {
        self.command(Method::POST, &format!("/element/{}/clear", element), Some(json!({})))
            .await
            .map(drop)
    }

    pub async fn send_keys(&self, element: &str, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": text })),
        )
        .await
        .map(drop)
    }

    pub async fn is_displayed(&self, element: &str) -> Result<bool> {
        let value = self
            .command(Method::GET, &format!("/element/{}/displayed", element), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Click through the page's own JavaScript, past overlays
    pub async fn script_click(&self, element: &str) -> Result<()> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({
                "script": "arguments[0].click();",
                "args": [{ ELEMENT_KEY: element }]
            })),
        )
        .await
        .map(drop)
    }

    pub async fn quit(self) -> Result<()> {
        self.command(Method::DELETE, "", None).await.map(drop)
    }

    /// Poll until the element exists
    pub async fn wait_for(&self, locator: Locator<'_>, timeout: Duration) -> Result<String> {
        let started = Instant::now();
        loop {
            match self.find(locator).await {
                Ok(element) => return Ok(element),
                Err(e) if started.elapsed() >= timeout => {
                    return Err(e).with_context(|| {
                        format!(
                            "Element not found within {}s: {}",
                            timeout.as_secs(),
                            locator.describe()
                        )
                    })
                }
                Err(_) => tokio::time::sleep(POLL).await,
            }
        }
    }

    /// Poll until the element exists and accepts a click
    pub async fn wait_click(&self, locator: Locator<'_>, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let attempt = match self.find(locator).await {
                Ok(element) => self.click(&element).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if started.elapsed() >= timeout => {
                    return Err(e).with_context(|| {
                        format!(
                            "Element not clickable within {}s: {}",
                            timeout.as_secs(),
                            locator.describe()
                        )
                    })
                }
                Err(_) => tokio::time::sleep(POLL).await,
            }
        }
    }

    pub async fn wait_type(&self, locator: Locator<'_>, text: &str, timeout: Duration) -> Result<()> {
        let element = self.wait_for(locator, timeout).await?;
        self.clear(&element).await?;
        self.send_keys(&element, text).await
    }

    async fn is_visible(&self, locator: Locator<'_>) -> bool {
        match self.find(locator).await {
            Ok(element) => self.is_displayed(&element).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// True once the element is shown
    pub async fn wait_visible(&self, locator: Locator<'_>, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.is_visible(locator).await {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// True once the element is gone or hidden
    pub async fn wait_invisible(&self, locator: Locator<'_>, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if !self.is_visible(locator).await {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

/// Close the console's onboarding modal if it shows up.
/// Escape first, then the close button, then a script click on it.
async fn dismiss_modal(session: &WebDriverSession, selectors: &ConsoleSelectors) -> bool {
    let modal = Locator::XPath(&selectors.modal_xpath);
    let close = Locator::XPath(&selectors.modal_close_xpath);

    if !session.wait_visible(modal, Duration::from_secs(5)).await {
        log::debug!("No onboarding modal");
        return false;
    }
    log::debug!("Onboarding modal visible, closing it");

    if let Ok(body) = session.find(Locator::Css("body")).await {
        let _ = session.send_keys(&body, &KEY_ESCAPE.to_string()).await;
        if session.wait_invisible(modal, Duration::from_secs(7)).await {
            return true;
        }
    }

    if session.wait_click(close, Duration::from_secs(5)).await.is_ok()
        && session.wait_invisible(modal, Duration::from_secs(7)).await
    {
        return true;
    }

    if let Ok(button) = session.find(close).await {
        if session.script_click(&button).await.is_ok()
            && session.wait_invisible(modal, Duration::from_secs(7)).await
        {
            return true;
        }
    }

    log::warn!("Could not close the onboarding modal");
    false
}

async fn open_endpoint_tab(session: &WebDriverSession, config: &EndpointConfig) -> Result<()> {
    let selectors = &config.selectors;
    let modal = Locator::XPath(&selectors.modal_xpath);
    let tab = Locator::XPath(&selectors.endpoint_tab_xpath);
    let retries = config.click_retries.max(1);

    for attempt in 1..=retries {
        if !session.wait_invisible(modal, Duration::from_secs(5)).await {
            log::warn!("Modal still visible, closing it again");
            dismiss_modal(session, selectors).await;
        }

        match session.wait_click(tab, Duration::from_secs(10)).await {
            Ok(()) => {
                log::debug!("Endpoint tab opened");
                return Ok(());
            }
            Err(e) => {
                log::warn!(
                    "Endpoint tab click failed (attempt {}/{}): {:#}",
                    attempt,
                    retries,
                    e
                );
                tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
            }
        }
    }

    log::warn!("All standard attempts failed; trying a script click");
    let element = session.find(tab).await?;
    session.script_click(&element).await.with_context(|| {
        format!(
            "Failed to open Endpoint tab after {} attempts and script fallback",
            retries
        )
    })
}

async fn run_update(
    session: &WebDriverSession,
    config: &EndpointConfig,
    credentials: &Credentials,
    public_url: &str,
) -> Result<()> {
    let s = &config.selectors;
    let wait = Duration::from_secs(config.wait_timeout_secs);

    log::info!("Opening developer console...");
    session.navigate(&config.console_url).await?;

    log::info!("Logging in...");
    session
        .wait_type(Locator::Id(&s.email_id), &credentials.username, wait)
        .await?;
    session.wait_click(Locator::Id(&s.continue_id), wait).await?;
    session
        .wait_type(Locator::Id(&s.password_id), &credentials.password, wait)
        .await?;
    session.wait_click(Locator::Id(&s.submit_id), wait).await?;

    log::info!("Opening skill...");
    session
        .wait_click(Locator::XPath(&s.skill_link_xpath), wait)
        .await?;
    tokio::time::sleep(Duration::from_secs(config.settle_secs)).await;
    dismiss_modal(session, s).await;

    open_endpoint_tab(session, config).await?;

    log::info!("Updating default region endpoint...");
    let input = session
        .wait_for(Locator::XPath(&s.endpoint_input_xpath), wait)
        .await?;
    // Select-all + delete so the page's change handlers fire
    session
        .send_keys(&input, &format!("{}a{}{}", KEY_CONTROL, KEY_NULL, KEY_DELETE))
        .await?;
    session.send_keys(&input, public_url).await?;

    session
        .wait_click(Locator::XPath(&s.save_button_xpath), wait)
        .await?;
    tokio::time::sleep(Duration::from_secs(config.save_wait_secs)).await;
    Ok(())
}

/// Replace the skill's endpoint with `public_url`. The browser session is
/// closed whether or not the update succeeds.
pub async fn update_endpoint(
    config: &EndpointConfig,
    credentials: &Credentials,
    public_url: &str,
) -> Result<()> {
    let url = validate_public_url(public_url)?;

    let session = WebDriverSession::create(&config.webdriver_url, &config.browser_args).await?;
    let result = run_update(&session, config, credentials, url.as_str()).await;

    if let Err(e) = session.quit().await {
        log::warn!("Failed to close browser session: {:#}", e);
    }

    match result {
        Ok(()) => {
            log::info!("✓ Skill endpoint updated to {}", url);
            Ok(())
        }
        Err(e) => bail!("Endpoint update failed: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use warp::Filter;

    type Log = Arc<Mutex<Vec<(String, String, Value)>>>;

    /// Minimal WebDriver server: every element exists, nothing is displayed
    async fn mock_webdriver(log: Log) -> SocketAddr {
        let route = warp::method()
            .and(warp::path::full())
            .and(warp::body::bytes())
            .map(move |method: warp::http::Method, path: warp::path::FullPath, body: warp::hyper::body::Bytes| {
                let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                let path = path.as_str().to_string();
                log.lock()
                    .unwrap()
                    .push((method.to_string(), path.clone(), body));

                let value = if path == "/session" {
                    json!({ "sessionId": "s1", "capabilities": {} })
                } else if path.ends_with("/element") {
                    json!({ ELEMENT_KEY: "e1" })
                } else if path.ends_with("/displayed") {
                    json!(false)
                } else {
                    Value::Null
                };
                warp::reply::json(&json!({ "value": value }))
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    #[test]
    fn test_locator_json() {
        assert_eq!(
            Locator::Id("ap_email").to_json(),
            json!({ "using": "css selector", "value": "[id=\"ap_email\"]" })
        );
        assert_eq!(
            Locator::XPath("//a").to_json(),
            json!({ "using": "xpath", "value": "//a" })
        );
    }

    #[tokio::test]
    async fn test_update_flow_against_mock_driver() {
        let log: Log = Arc::default();
        let addr = mock_webdriver(log.clone()).await;
        let config = EndpointConfig {
            webdriver_url: format!("http://{}", addr),
            settle_secs: 0,
            save_wait_secs: 0,
            retry_delay_secs: 0,
            ..EndpointConfig::default()
        };
        let credentials = Credentials {
            username: "me@example.com".into(),
            password: "secret".into(),
        };

        update_endpoint(&config, &credentials, "https://abc.ngrok-free.app/alexa")
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let (method, path, body) = &log[0];
        assert_eq!((method.as_str(), path.as_str()), ("POST", "/session"));
        assert_eq!(
            body["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"][0],
            "--window-size=1920,1080"
        );

        let typed: Vec<&str> = log
            .iter()
            .filter(|(_, path, _)| path.ends_with("/value"))
            .filter_map(|(_, _, body)| body["text"].as_str())
            .collect();
        assert_eq!(typed[0], "me@example.com");
        assert_eq!(typed[1], "secret");
        assert_eq!(typed.last().copied(), Some("https://abc.ngrok-free.app/alexa"));

        let (method, path, _) = log.last().unwrap();
        assert_eq!((method.as_str(), path.as_str()), ("DELETE", "/session/s1"));
    }

    #[tokio::test]
    async fn test_rejects_non_https_url() {
        let credentials = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        let result = update_endpoint(
            &EndpointConfig::default(),
            &credentials,
            "http://insecure.example/alexa",
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_driver_error_is_reported() {
        let route = warp::any().map(|| {
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "value": { "error": "session not created", "message": "Chrome failed to start" }
                })),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            )
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let err = WebDriverSession::create(&format!("http://{}", addr), &[])
            .await
            .err()
            .unwrap();
        let driver_error = err.downcast_ref::<WebDriverError>().unwrap();
        assert_eq!(driver_error.error, "session not created");
    }
}
