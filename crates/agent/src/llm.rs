use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vendedor_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENROUTER_REFERER: &str = "https://github.com/vendedor/vendedor";
const OPENROUTER_TITLE: &str = "Vendedor";

/// Chat-completions client for OpenAI, OpenRouter and Ollama's compatible endpoint.
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;
        let endpoint =
            format!("{}/chat/completions", config.effective_base_url().trim_end_matches('/'));

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &ChatCompletionRequest<'_>) -> Result<String, RequestFailure> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        if self.provider == LlmProvider::OpenRouter {
            request =
                request.header("HTTP-Referer", OPENROUTER_REFERER).header("X-Title", OPENROUTER_TITLE);
        }

        let response = request.send().await.map_err(|error| RequestFailure {
            retryable: error.is_connect() || error.is_timeout() || error.is_request(),
            error: anyhow!("llm request failed: {error}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RequestFailure {
                retryable: is_retryable_status(status),
                error: anyhow!("llm returned {status}: {}", truncate(&body_text, 200)),
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|error| {
            RequestFailure { retryable: false, error: anyhow!("invalid llm response body: {error}") }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RequestFailure {
                retryable: false,
                error: anyhow!("llm response contained no content"),
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        attempt,
                        max_retries = self.max_retries,
                        error = %failure.error,
                        "retrying llm request"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

/// Bounds every completion of the inner client; an elapsed deadline is an error.
pub struct TimeoutLlmClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutLlmClient<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for TimeoutLlmClient<C> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.inner.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => bail!("llm call timed out after {}ms", self.timeout.as_millis()),
        }
    }
}

/// Pulls the first balanced JSON object out of model text.
///
/// Handles code fences and prose around the object; braces inside string
/// literals are ignored.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let bytes = raw.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = raw[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (index, &byte) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &raw[start..=index];
                        match serde_json::from_str::<serde_json::Value>(candidate) {
                            Ok(value) if value.is_object() => return Some(value),
                            _ => {
                                debug!(
                                    event_name = "llm.json.candidate_rejected",
                                    "discarding unparsable json candidate"
                                );
                                break;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        search_from = start + 1;
    }

    None
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

struct RequestFailure {
    retryable: bool,
    error: anyhow::Error,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use vendedor_core::config::{AppConfig, LlmProvider};

    use super::{extract_json_object, LlmClient, OpenAiCompatibleClient, TimeoutLlmClient};

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".to_string())
        }
    }

    #[test]
    fn extracts_object_from_fenced_reply() {
        let raw = "Claro, aquí está:\n```json\n{\"slots\": {\"category\": \"tv\"}}\n```";
        assert_eq!(extract_json_object(raw), Some(json!({"slots": {"category": "tv"}})));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let raw = r#"{"questions": ["¿Qué tamaño {en pulgadas} buscas?"]} trailing"#;
        assert_eq!(
            extract_json_object(raw),
            Some(json!({"questions": ["¿Qué tamaño {en pulgadas} buscas?"]}))
        );
    }

    #[test]
    fn skips_invalid_candidates_and_rejects_plain_text() {
        assert_eq!(extract_json_object("{not json} {\"ok\": true}"), Some(json!({"ok": true})));
        assert_eq!(extract_json_object("no hay json aquí"), None);
        assert_eq!(extract_json_object("{\"abierto\": "), None);
    }

    #[test]
    fn endpoint_uses_provider_default_base_url() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::OpenRouter;
        let client = OpenAiCompatibleClient::from_config(&config).expect("client builds");
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");

        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let client = OpenAiCompatibleClient::from_config(&config).expect("client builds");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn timeout_wrapper_turns_slow_calls_into_errors() {
        let client = TimeoutLlmClient::new(SlowClient, Duration::from_millis(100));
        let error = client.complete("hola").await.expect_err("should time out");
        assert!(error.to_string().contains("timed out"));
    }
}
