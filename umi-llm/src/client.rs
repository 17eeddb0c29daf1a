//! LLM Client — unified interface for Ollama, OpenAI-compatible and mock back ends.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::mock::MockBackend;
use crate::types::{ChatRole, LlmRequest, LlmResponse};

/// Provider backend for text generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// Deterministic canned replies; never touches the network.
    Mock,
    /// No back end; every call fails so the caller falls back.
    None,
}

impl LlmProvider {
    /// Build a provider from its config name (`ollama`, `openai`, `mock`, `none`).
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown name or an OpenAI
    /// provider without an API key.
    pub fn from_name(name: &str, base_url: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama {
                base_url: base_url.trim_end_matches('/').to_string(),
            }),
            "openai" | "openai_compatible" => {
                let api_key = api_key
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| LlmError::ConfigError("openai provider needs api_key".into()))?;
                Ok(Self::OpenAiCompatible {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key: api_key.to_string(),
                })
            }
            "mock" => Ok(Self::Mock),
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }
}

/// The main client that routes requests to the configured back end.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    mock: MockBackend,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            mock: MockBackend::new(),
        }
    }

    /// Client answering every request with the mock back end.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(LlmProvider::Mock, "mock", 0)
    }

    /// Client with no back end (all calls fail, callers fall back).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Check if a real or mock back end is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a reply.
    ///
    /// Returns `Err` if the back end is unavailable or all retries fail.
    /// The caller should fall back to a mock reply on error.
    ///
    /// # Errors
    /// See [`LlmError`].
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Mock => {
                let npc_name = request.npc_name.as_deref().unwrap_or("???");
                Ok(LlmResponse {
                    text: self.mock.reply(npc_name, &request.user),
                    tokens_generated: 0,
                    latency_ms: 0,
                    model: "mock".into(),
                })
            }
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/chat");
                let body = json!({
                    "model": self.model,
                    "messages": messages(request),
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                self.post_with_retries("Ollama", &url, None, &body, request, |json| {
                    (
                        json["message"]["content"].as_str().map(str::to_string),
                        json["eval_count"].as_u64(),
                    )
                })
                .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/v1/chat/completions");
                let body = json!({
                    "model": self.model,
                    "messages": messages(request),
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                self.post_with_retries("OpenAI", &url, Some(api_key.as_str()), &body, request, |json| {
                    (
                        json["choices"][0]["message"]["content"].as_str().map(str::to_string),
                        json["usage"]["completion_tokens"].as_u64(),
                    )
                })
                .await
            }
        }
    }

    async fn post_with_retries(
        &self,
        backend: &str,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
        request: &LlmRequest,
        extract: impl Fn(&Value) -> (Option<String>, Option<u64>),
    ) -> Result<LlmResponse, LlmError> {
        let mut last_error = LlmError::Unavailable(format!("{backend} was never attempted"));
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(backend, attempt = attempt + 1, max = self.max_retries + 1, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(request.timeout_ms));
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }
            let result = builder.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = extract(&json);
                    let text = text.ok_or_else(|| LlmError::ParseError(format!("{backend} reply has no content")))?;
                    return Ok(LlmResponse {
                        text,
                        tokens_generated: tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    last_error = LlmError::RequestFailed(format!("HTTP {}", resp.status()));
                    warn!(backend, error = %last_error, "LLM back end returned error");
                }
                Err(e) => {
                    last_error = classify(&e, request.timeout_ms);
                    warn!(backend, error = %last_error, "LLM request failed");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error: last_error.to_string(),
        })
    }
}

/// Map a transport failure onto the error it represents for one attempt.
fn classify(err: &reqwest::Error, timeout_ms: u64) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(timeout_ms)
    } else if err.is_connect() {
        LlmError::Unavailable(err.to_string())
    } else {
        LlmError::RequestFailed(err.to_string())
    }
}

fn messages(request: &LlmRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(json!({ "role": "system", "content": request.system }));
    for turn in &request.history {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.user }));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatTurn;

    #[test]
    fn provider_names() {
        assert_eq!(
            LlmProvider::from_name("Ollama", "http://localhost:11434/", None).expect("ollama"),
            LlmProvider::Ollama {
                base_url: "http://localhost:11434".into()
            }
        );
        assert_eq!(LlmProvider::from_name("mock", "", None).expect("mock"), LlmProvider::Mock);
        assert_eq!(LlmProvider::from_name("none", "", None).expect("none"), LlmProvider::None);
        assert!(LlmProvider::from_name("openai", "https://x", None).is_err());
        assert!(LlmProvider::from_name("llama_cpp", "", None).is_err());
    }

    #[test]
    fn messages_keep_history_order() {
        let request = LlmRequest::dialogue("sys", "지금")
            .with_history(vec![ChatTurn::user("처음"), ChatTurn::assistant("대답")]);
        let messages = messages(&request);
        let roles: Vec<&str> = messages.iter().filter_map(|m| m["role"].as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3]["content"], "지금");
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::dialogue("s", "u"))
            .await
            .expect_err("no provider");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn mock_provider_answers_in_format() {
        let client = LlmClient::mock();
        let request = LlmRequest::dialogue("s", "안녕하세요").with_npc_name("해진");
        let response = client.generate(&request).await.expect("mock");
        assert!(response.text.contains("SAY:"));
        assert_eq!(response.model, "mock");
    }

    #[tokio::test]
    async fn unreachable_ollama_exhausts_retries() {
        let provider = LlmProvider::from_name("ollama", "http://127.0.0.1:9", None).expect("ollama");
        let client = LlmClient::new(provider, "qwen2.5:3b", 1);
        let request = LlmRequest::dialogue("s", "u").with_timeout(200);
        let err = client.generate(&request).await.expect_err("nothing listens on port 9");
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn silent_backend_reports_the_attempt_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let provider = LlmProvider::from_name("ollama", &format!("http://{addr}"), None).expect("ollama");
        let client = LlmClient::new(provider, "qwen2.5:3b", 0);
        let request = LlmRequest::dialogue("s", "u").with_timeout(150);
        let err = client.generate(&request).await.expect_err("never answers");
        match err {
            LlmError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert_eq!(last_error, LlmError::Timeout(150).to_string());
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }
}
