//! Hosted language model fallback (OpenAI-style chat completions)

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spoken when the model cannot be reached or answers garbage
pub const APOLOGY: &str = "I'm sorry, something went wrong with the AI response.";

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key_env: "GROQ_API_KEY".into(),
            timeout_secs: 30,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Chat completion client
pub struct LlmClient {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmClient {
    /// Reads the API key from the configured environment variable
    pub fn from_env(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            log::warn!(
                "{} is not set; questions for the language model will fail",
                config.api_key_env
            );
        }
        Self::new(config, api_key)
    }

    pub fn new(config: LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send one prompt, return the first choice's text
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", self.config.api_key_env))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.config.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        log::debug!("Asking {}: {}", self.config.model, prompt);
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages,
            })
            .send()
            .await
            .context("Language model request failed")?;

        if !response.status().is_success() {
            bail!("Language model returned status: {}", response.status());
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Invalid language model response")?;
        let answer = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .context("Language model returned no choices")?;

        log::info!("✓ Model answered ({} chars)", answer.len());
        Ok(answer)
    }

    /// `ask`, with failures logged and replaced by the apology
    pub async fn answer(&self, prompt: &str) -> String {
        match self.ask(prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("Error from language model: {:#}", e);
                APOLOGY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use warp::Filter;

    /// Local stand-in for the completions API
    async fn mock_endpoint(status: u16, body: serde_json::Value) -> SocketAddr {
        let route = warp::post()
            .and(warp::header::<String>("authorization"))
            .and(warp::body::json())
            .map(move |auth: String, request: serde_json::Value| {
                assert_eq!(auth, "Bearer test-key");
                assert_eq!(request["model"], "llama-3.3-70b-versatile");
                assert_eq!(request["messages"][0]["role"], "user");
                warp::reply::with_status(
                    warp::reply::json(&body),
                    warp::http::StatusCode::from_u16(status).unwrap(),
                )
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    fn client(addr: SocketAddr, key: Option<&str>) -> LlmClient {
        LlmClient::new(
            LlmConfig {
                endpoint: format!("http://{}/openai/v1/chat/completions", addr),
                ..LlmConfig::default()
            },
            key.map(String::from),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ask_returns_first_choice() {
        let addr = mock_endpoint(
            200,
            serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": " Paris. " } }]
            }),
        )
        .await;

        let answer = client(addr, Some("test-key"))
            .ask("capital of france")
            .await
            .unwrap();
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn test_http_error_becomes_apology() {
        let addr = mock_endpoint(500, serde_json::json!({ "error": "boom" })).await;
        let llm = client(addr, Some("test-key"));
        assert!(llm.ask("hi").await.is_err());
        assert_eq!(llm.answer("hi").await, APOLOGY);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let addr = mock_endpoint(200, serde_json::json!({})).await;
        let llm = client(addr, None);
        assert!(!llm.is_configured());
        assert_eq!(llm.answer("hi").await, APOLOGY);
    }
}
