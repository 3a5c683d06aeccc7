use sq_domain::error::Result;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallParams {
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ProviderResponse {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider client contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter must implement.
///
/// Implementations must observe `cancel` at every await point and must
/// surface HTTP 429 and 5xx as `Error::Provider { status: Some(..) }` so
/// the orchestrator's fallback chain can distinguish transient failures
/// from hard ones.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn call(
        &self,
        cancel: &CancellationToken,
        model: &str,
        prompt: &str,
        params: CallParams,
    ) -> Result<ProviderResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Datasource client contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One record returned by a datasource fetch. The retrieval executor
/// maps records into context artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    pub label: String,
    pub payload: String,
    pub source: String,
}

/// Trait for external data sources (issue trackers, code hosts, …).
/// Invisible to the core beyond the retrieval-executor boundary.
#[async_trait::async_trait]
pub trait DatasourceClient: Send + Sync {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        source: &str,
        query: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<SourceRecord>>;
}
