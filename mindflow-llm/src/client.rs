//! Chat client: one interface over OpenAI-compatible and Ollama backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{ChatCompletion, ChatMessage, GenerationOptions};

/// A text-generation backend: ordered messages in, raw text out.
///
/// Implementations must return within a bounded time or fail; a timeout is
/// an error, never a partial completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a reply for `messages`.
    ///
    /// # Errors
    /// Connectivity failures, timeouts and exhausted retries.
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatCompletion, LlmError>;

    /// Name of the model answering requests.
    fn model_name(&self) -> String;

    /// Swap connection parameters at runtime; empty values keep the current
    /// setting. Returns whether the backend supports reconfiguration.
    fn reconfigure(&self, _base_url: &str, _model: &str, _api_key: &str) -> bool {
        false
    }
}

/// Provider backend for chat inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API (DeepSeek, OpenAI, vLLM, ...).
    OpenAiCompatible {
        /// API root; `/chat/completions` is appended.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend: every call fails with [`LlmError::Unavailable`].
    None,
}

impl LlmProvider {
    fn from_config(config: &LlmConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        match config.provider.as_str() {
            "ollama" => Self::Ollama { base_url },
            "openai" => Self::OpenAiCompatible {
                base_url,
                api_key: config.resolved_api_key().unwrap_or_default(),
            },
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    provider: LlmProvider,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_ms: u64,
    max_retries: u32,
}

/// HTTP chat client whose connection can be swapped at runtime.
pub struct LlmClient {
    settings: RwLock<Settings>,
    http: Client,
}

impl LlmClient {
    /// Create a client from the `[llm]` configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            settings: RwLock::new(Settings {
                provider: LlmProvider::from_config(config),
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                timeout_ms: config.request_timeout_ms,
                max_retries: config.max_retries,
            }),
            http: Client::new(),
        }
    }

    /// Create a client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::from_config(&LlmConfig {
            provider: "none".to_string(),
            max_retries: 0,
            ..LlmConfig::default()
        })
    }

    /// Point the client at a new endpoint. Empty arguments keep the
    /// current value.
    ///
    /// An Ollama client stays on Ollama; a `none` client becomes
    /// OpenAI-compatible once it has a base URL.
    pub fn update_connection(&self, base_url: &str, model: &str, api_key: &str) {
        let mut settings = self.settings.write();
        let base_url = base_url.trim_end_matches('/');
        let provider = match &settings.provider {
            LlmProvider::Ollama { base_url: old } => LlmProvider::Ollama {
                base_url: pick(base_url, old),
            },
            LlmProvider::OpenAiCompatible {
                base_url: old_url,
                api_key: old_key,
            } => LlmProvider::OpenAiCompatible {
                base_url: pick(base_url, old_url),
                api_key: pick(api_key, old_key),
            },
            LlmProvider::None if base_url.is_empty() => LlmProvider::None,
            LlmProvider::None => LlmProvider::OpenAiCompatible {
                base_url: base_url.to_string(),
                api_key: api_key.to_string(),
            },
        };
        settings.provider = provider;
        if !model.is_empty() {
            settings.model = model.to_string();
        }
        info!(model = %settings.model, "LLM connection updated");
    }

    /// The active provider.
    #[must_use]
    pub fn provider(&self) -> LlmProvider {
        self.settings.read().provider.clone()
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.settings.read().provider, LlmProvider::None)
    }

    fn request_body(settings: &Settings, messages: &[ChatMessage], options: &GenerationOptions) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.wire_role(), "content": m.content }))
            .collect();
        let temperature = options.temperature.unwrap_or(settings.temperature);
        let max_tokens = options.max_tokens.or(settings.max_tokens);

        match settings.provider {
            LlmProvider::Ollama { .. } => {
                let mut body = json!({
                    "model": settings.model,
                    "messages": messages,
                    "stream": false,
                    "options": { "temperature": temperature },
                });
                if let Some(n) = max_tokens {
                    body["options"]["num_predict"] = json!(n);
                }
                body
            }
            _ => {
                let mut body = json!({
                    "model": settings.model,
                    "messages": messages,
                    "temperature": temperature,
                });
                if let Some(n) = max_tokens {
                    body["max_tokens"] = json!(n);
                }
                body
            }
        }
    }

    /// Pull the generated text and token count out of a response envelope.
    fn extract(provider: &LlmProvider, json: &Value) -> Result<(String, u32), LlmError> {
        let (text, tokens) = match provider {
            LlmProvider::Ollama { .. } => (
                json["message"]["content"].as_str(),
                json["eval_count"].as_u64(),
            ),
            _ => (
                json["choices"][0]["message"]["content"].as_str(),
                json["usage"]["completion_tokens"].as_u64(),
            ),
        };
        let text = text.ok_or_else(|| {
            LlmError::ParseError(format!("response has no message content: {json}"))
        })?;
        let tokens = tokens.map_or(0, |t| u32::try_from(t).unwrap_or(u32::MAX));
        Ok((text.to_string(), tokens))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let settings = self.settings.read().clone();
        let (url, api_key) = match &settings.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => (format!("{base_url}/api/chat"), None),
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                (format!("{base_url}/chat/completions"), Some(api_key.clone()))
            }
        };
        let body = Self::request_body(&settings, messages, options);

        let mut last_error = String::new();
        for attempt in 0..=settings.max_retries {
            if attempt > 0 {
                debug!(
                    "Retrying LLM call (attempt {}/{})",
                    attempt + 1,
                    settings.max_retries + 1
                );
            }

            let start = Instant::now();
            let mut request = self
                .http
                .post(&url)
                .json(&body)
                .timeout(Duration::from_millis(settings.timeout_ms));
            if let Some(key) = &api_key {
                request = request.bearer_auth(key);
            }
            let result = request.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (content, tokens_generated) = Self::extract(&settings.provider, &json)?;
                    debug!(latency_ms, tokens_generated, "LLM call succeeded");
                    return Ok(ChatCompletion {
                        content,
                        tokens_generated,
                        latency_ms,
                        model: settings.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!("LLM backend returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!("LLM request timed out after {}ms", settings.timeout_ms);
                    } else {
                        warn!("LLM request failed: {last_error}");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: settings.max_retries + 1,
            last_error,
        })
    }

    fn model_name(&self) -> String {
        self.settings.read().model.clone()
    }

    fn reconfigure(&self, base_url: &str, model: &str, api_key: &str) -> bool {
        self.update_connection(base_url, model, api_key);
        true
    }
}

fn pick(new: &str, old: &str) -> String {
    if new.is_empty() { old } else { new }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .invoke(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn update_connection_switches_none_to_openai() {
        let client = LlmClient::none();
        client.update_connection("https://example.invalid/v1/", "m-1", "sk-x");
        assert!(client.is_available());
        assert_eq!(
            client.provider(),
            LlmProvider::OpenAiCompatible {
                base_url: "https://example.invalid/v1".to_string(),
                api_key: "sk-x".to_string(),
            }
        );
        assert_eq!(client.model_name(), "m-1");

        client.update_connection("", "", "sk-y");
        assert_eq!(
            client.provider(),
            LlmProvider::OpenAiCompatible {
                base_url: "https://example.invalid/v1".to_string(),
                api_key: "sk-y".to_string(),
            }
        );
        assert_eq!(client.model_name(), "m-1");
    }

    #[test]
    fn ollama_body_uses_options_block() {
        let client = LlmClient::from_config(&LlmConfig {
            provider: "ollama".to_string(),
            max_tokens: Some(64),
            ..LlmConfig::default()
        });
        let settings = client.settings.read().clone();
        let body = LlmClient::request_body(
            &settings,
            &[ChatMessage::system("s"), ChatMessage::named("旅人", "u")],
            &GenerationOptions::default(),
        );
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["options"]["num_predict"], json!(64));
        assert_eq!(body["messages"][1]["role"], json!("user"));
    }

    #[test]
    fn extract_reads_openai_envelope() {
        let json = json!({
            "choices": [{ "message": { "content": "你好" } }],
            "usage": { "completion_tokens": 3 }
        });
        let provider = LlmProvider::OpenAiCompatible {
            base_url: String::new(),
            api_key: String::new(),
        };
        let (text, tokens) = LlmClient::extract(&provider, &json).expect("extract");
        assert_eq!(text, "你好");
        assert_eq!(tokens, 3);
        assert!(LlmClient::extract(&provider, &json!({})).is_err());
    }
}
