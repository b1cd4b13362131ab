//! HTTP model backends
//!
//! - `ChatCompletionClient`: OpenAI-compatible cloud endpoint (`/chat/completions`)
//! - `OllamaClient`: locally hosted model (`/api/generate`)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::prompt::{build_analysis_prompt, SYSTEM_PROMPT};
use super::{ModelClient, ModelError};
use crate::models::HostContext;

/// Maximum characters of an error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Sampling temperature for chat completions
const CHAT_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// Client for an OpenAI-compatible chat completion endpoint
pub struct ChatCompletionClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    name: String,
}

impl ChatCompletionClient {
    /// Create a new chat completion client
    ///
    /// `api_url` is the API base (e.g. `https://api.x.ai/v1`); the
    /// `chat/completions` path is appended to it.
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = base_url(api_url)?
            .join("chat/completions")
            .context("Invalid chat completion path")?;

        let model = model.into();
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            name: format!("chat/{}", model),
            model,
        })
    }
}

#[async_trait]
impl ModelClient for ChatCompletionClient {
    async fn analyze(&self, host: &HostContext, log_excerpt: &str) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::Auth(format!("{}: no API key configured", self.name)))?;

        let prompt = build_analysis_prompt(host, log_excerpt);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: CHAT_TEMPERATURE,
        };

        debug!(backend = %self.name, host_id = %host.host_id, "Sending chat completion request");
        let request = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body);

        let response: ChatResponse = send_json(request, &self.name).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Unavailable(format!("{}: response had no content", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Client for a locally hosted Ollama model
pub struct OllamaClient {
    client: Client,
    endpoint: Url,
    model: String,
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client for the server at `host` (e.g. `http://localhost:11434`)
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = base_url(host)?
            .join("api/generate")
            .context("Invalid generate path")?;

        let model = model.into();
        Ok(Self {
            client,
            endpoint,
            name: format!("ollama/{}", model),
            model,
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn analyze(&self, host: &HostContext, log_excerpt: &str) -> Result<String, ModelError> {
        let prompt = build_analysis_prompt(host, log_excerpt);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };

        debug!(backend = %self.name, host_id = %host.host_id, "Sending generate request");
        let request = self.client.post(self.endpoint.clone()).json(&body);
        let response: GenerateResponse = send_json(request, &self.name).await?;

        response
            .response
            .ok_or_else(|| ModelError::Unavailable(format!("{}: response had no text", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse a base URL so that relative joins keep its path
fn base_url(raw: &str) -> Result<Url> {
    let normalized = format!("{}/", raw.trim().trim_end_matches('/'));
    Url::parse(&normalized).with_context(|| format!("Invalid model URL: {}", raw))
}

/// Send a request and decode its JSON body, classifying failures
async fn send_json<T: DeserializeOwned>(request: RequestBuilder, backend: &str) -> Result<T, ModelError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ModelError::Unavailable(format!("{}: request timed out", backend))
        } else {
            ModelError::Unavailable(format!("{}: {}", backend, e))
        }
    })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ModelError::Auth(format!(
            "{}: credentials rejected ({})",
            backend, status
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return Err(ModelError::Unavailable(format!(
            "{}: API error ({}): {}",
            backend, status, body
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ModelError::Unavailable(format!("{}: malformed response: {}", backend, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn host() -> HostContext {
        HostContext::new("web-01", "10.0.0.5")
    }

    #[tokio::test]
    async fn test_chat_completion_returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"health_score\":95}"}}]}"#,
            )
            .create_async()
            .await;

        let client = ChatCompletionClient::new(
            &format!("{}/v1", server.url()),
            Some("test_key".to_string()),
            "grok-beta",
            TIMEOUT,
        )
        .unwrap();

        let text = client.analyze(&host(), "log line").await.unwrap();
        assert_eq!(text, r#"{"health_score":95}"#);
        assert_eq!(client.name(), "chat/grok-beta");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_completion_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let client =
            ChatCompletionClient::new(&server.url(), Some("bad".to_string()), "grok-beta", TIMEOUT)
                .unwrap();

        let err = client.analyze(&host(), "").await.unwrap_err();
        assert!(matches!(err, ModelError::Auth(_)));
    }

    #[tokio::test]
    async fn test_chat_completion_without_key_is_auth_error() {
        let client =
            ChatCompletionClient::new("http://127.0.0.1:1", Some("  ".to_string()), "m", TIMEOUT)
                .unwrap();

        let err = client.analyze(&host(), "").await.unwrap_err();
        assert!(matches!(err, ModelError::Auth(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client =
            ChatCompletionClient::new(&server.url(), Some("k".to_string()), "grok-beta", TIMEOUT)
                .unwrap();

        match client.analyze(&host(), "").await.unwrap_err() {
            ModelError::Unavailable(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client =
            ChatCompletionClient::new(&server.url(), Some("k".to_string()), "grok-beta", TIMEOUT)
                .unwrap();

        let err = client.analyze(&host(), "").await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_ollama_returns_response_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"llama3.1","stream":false}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"model":"llama3.1","response":"{\"severity\":\"WARN\"}","done":true}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(&server.url(), "llama3.1", TIMEOUT).unwrap();

        let text = client.analyze(&host(), "log line").await.unwrap();
        assert_eq!(text, r#"{"severity":"WARN"}"#);
        assert_eq!(client.name(), "ollama/llama3.1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ollama_connection_refused_is_unavailable() {
        let client = OllamaClient::new("http://127.0.0.1:1", "llama3.1", TIMEOUT).unwrap();

        let err = client.analyze(&host(), "").await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(OllamaClient::new("not a url", "llama3.1", TIMEOUT).is_err());
    }
}
