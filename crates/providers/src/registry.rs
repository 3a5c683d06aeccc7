use crate::openai_compat::OpenAiCompatClient;
use crate::rule_based::RuleBasedClient;
use crate::traits::ProviderClient;
use sq_domain::config::Config;
use sq_domain::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds one client per configured provider name. The `"local"`
/// rule-based client is always registered so every fallback chain has a
/// terminal.
pub struct ProviderRegistry {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    /// Build clients for every enabled provider in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();

        for (name, provider_cfg) in &config.providers {
            if !provider_cfg.enabled {
                tracing::debug!(provider = %name, "provider disabled, skipping");
                continue;
            }
            if provider_cfg.is_local {
                clients.insert(name.clone(), Arc::new(RuleBasedClient::new()));
            } else {
                let client = OpenAiCompatClient::from_config(name, provider_cfg)?;
                clients.insert(name.clone(), Arc::new(client));
            }
            tracing::info!(provider = %name, local = provider_cfg.is_local, "provider ready");
        }

        clients
            .entry("local".into())
            .or_insert_with(|| Arc::new(RuleBasedClient::new()));

        Ok(Self { clients })
    }

    /// Registry with only the rule-based client (tests, offline mode).
    pub fn local_only() -> Self {
        let mut clients: HashMap<String, Arc<dyn ProviderClient>> = HashMap::new();
        clients.insert("local".into(), Arc::new(RuleBasedClient::new()));
        Self { clients }
    }

    /// Insert or replace a client (used by tests to inject fakes).
    pub fn insert(&mut self, name: &str, client: Arc<dyn ProviderClient>) {
        self.clients.insert(name.to_string(), client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}
