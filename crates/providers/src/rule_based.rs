//! Deterministic local client.
//!
//! Terminates every fallback chain: when selection lands on the
//! rule-based sentinel, or a deployment runs with no remote providers,
//! this client produces a deterministic digest of the prompt at zero
//! cost. It never fails and never rate-limits.

use crate::traits::{CallParams, ProviderClient, ProviderResponse};
use sha2::{Digest, Sha256};
use sq_domain::error::{Error, Result};
use tokio_util::sync::CancellationToken;

pub struct RuleBasedClient {
    id: String,
}

impl RuleBasedClient {
    pub fn new() -> Self {
        Self { id: "local".into() }
    }
}

impl Default for RuleBasedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderClient for RuleBasedClient {
    async fn call(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        _params: CallParams,
    ) -> Result<ProviderResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("rule-based call".into()));
        }

        // Stable fingerprint so repeated calls are byte-identical.
        let digest = hex::encode(&Sha256::digest(prompt.as_bytes())[..8]);
        let head: String = prompt.chars().take(120).collect();
        let content = format!("[{model}] {head} (digest {digest})");

        Ok(ProviderResponse {
            content,
            prompt_tokens: (prompt.len() / 4) as u32,
            completion_tokens: 0,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
