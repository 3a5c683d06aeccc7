use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider connections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for one upstream LLM provider, keyed by provider
/// name under `[providers.<name>]`.
///
/// `api_key` supports `${VAR}` environment expansion; an unresolved
/// reference fails config validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    #[serde(default = "d_30000u")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub retry: u32,
    #[serde(default = "d_500u")]
    pub backoff_ms: u64,
    /// Local providers (rule-based, on-box models) need no credentials.
    #[serde(default)]
    pub is_local: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: String::new(),
            timeout_ms: 30_000,
            retry: 2,
            backoff_ms: 500,
            is_local: false,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_30000u() -> u64 {
    30_000
}
fn d_2() -> u32 {
    2
}
fn d_500u() -> u64 {
    500
}
