//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract.

use crate::traits::{CallParams, ProviderClient, ProviderResponse};
use serde::Deserialize;
use serde_json::Value;
use sq_domain::config::ProviderConfig;
use sq_domain::error::{Error, Result};
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new adapter from the deserialized provider config.
    pub fn from_config(id: &str, cfg: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            client,
        })
    }

    fn build_body(&self, model: &str, prompt: &str, params: CallParams) -> Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = params.temperature {
            body["temperature"] = temperature.into();
        }
        body
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait::async_trait]
impl ProviderClient for OpenAiCompatClient {
    async fn call(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        params: CallParams,
    ) -> Result<ProviderResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.build_body(model, prompt, params));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("provider '{}' call", self.id)));
            }
            result = request.send() => {
                result.map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(format!("provider '{}': {e}", self.id))
                    } else {
                        Error::Http(e.to_string())
                    }
                })?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: self.id.clone(),
                status: Some(status.as_u16()),
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider {
                provider: self.id.clone(),
                status: None,
                message: "response contained no choices".into(),
            })?;
        let usage = parsed.usage.unwrap_or_default();

        Ok(ProviderResponse {
            content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
