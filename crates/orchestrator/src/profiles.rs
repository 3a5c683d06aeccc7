use sq_domain::config::LlmConfig;
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model profiles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Operational profile for one `"provider/model"` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    /// Relative answer quality in [0, 1].
    pub quality: f64,
    /// Relative latency score in [0, 1] (higher is faster).
    pub speed: f64,
    pub cost_per_1k_tokens: f64,
    pub context_limit: usize,
    pub supports_streaming: bool,
    /// Token-bucket capacity; 0 means unlimited.
    pub max_requests_per_second: u32,
    pub request_timeout_ms: u64,
    pub is_local: bool,
    pub requires_auth: bool,
}

/// Split a `"provider/model"` key into its two components.
///
/// Without a `/`, the whole string is the provider and the model is
/// empty (the provider default applies).
pub fn split_model_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((provider, model)) => (provider, model),
        None => (key, ""),
    }
}

/// Read-mostly table of model profiles, keyed `"provider/model"`.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: HashMap<String, ModelProfile>,
}

impl ProfileTable {
    /// The built-in profile set. Config overrides merge on top.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();

        let mut add = |key: &str,
                       quality: f64,
                       speed: f64,
                       cost_per_1k_tokens: f64,
                       context_limit: usize,
                       max_rps: u32,
                       timeout_ms: u64,
                       is_local: bool| {
            profiles.insert(
                key.to_string(),
                ModelProfile {
                    quality,
                    speed,
                    cost_per_1k_tokens,
                    context_limit,
                    supports_streaming: true,
                    max_requests_per_second: max_rps,
                    request_timeout_ms: timeout_ms,
                    is_local,
                    requires_auth: !is_local,
                },
            );
        };

        add("openai/gpt-4o", 0.92, 0.6, 0.0125, 128_000, 8, 30_000, false);
        add("openai/gpt-4o-mini", 0.78, 0.85, 0.00075, 128_000, 16, 20_000, false);
        add("anthropic/claude-sonnet-4", 0.94, 0.55, 0.018, 200_000, 6, 45_000, false);
        add("anthropic/claude-haiku-3-5", 0.75, 0.9, 0.004, 200_000, 16, 15_000, false);
        add("local/rule-based", 0.3, 1.0, 0.0, usize::MAX, 0, 5_000, true);

        Self { profiles }
    }

    /// Builtin table with config overrides applied: per-key partial
    /// profile overrides first, then per-provider runtime limits.
    pub fn from_config(llm: &LlmConfig) -> Self {
        let mut table = Self::builtin();

        for (key, o) in &llm.profiles {
            let entry = table
                .profiles
                .entry(key.clone())
                .or_insert_with(|| ModelProfile {
                    quality: 0.5,
                    speed: 0.5,
                    cost_per_1k_tokens: 0.001,
                    context_limit: 32_000,
                    supports_streaming: false,
                    max_requests_per_second: 4,
                    request_timeout_ms: 30_000,
                    is_local: false,
                    requires_auth: true,
                });
            if let Some(v) = o.quality {
                entry.quality = v;
            }
            if let Some(v) = o.speed {
                entry.speed = v;
            }
            if let Some(v) = o.cost_per_1k_tokens {
                entry.cost_per_1k_tokens = v;
            }
            if let Some(v) = o.context_limit {
                entry.context_limit = v;
            }
            if let Some(v) = o.supports_streaming {
                entry.supports_streaming = v;
            }
            if let Some(v) = o.max_requests_per_second {
                entry.max_requests_per_second = v;
            }
            if let Some(v) = o.request_timeout_ms {
                entry.request_timeout_ms = v;
            }
            if let Some(v) = o.is_local {
                entry.is_local = v;
            }
            if let Some(v) = o.requires_auth {
                entry.requires_auth = v;
            }
        }

        for (provider, runtime) in &llm.providers {
            for (key, profile) in table.profiles.iter_mut() {
                if split_model_key(key).0 != provider {
                    continue;
                }
                if let Some(rps) = runtime.max_requests_per_second {
                    profile.max_requests_per_second = rps;
                }
                if let Some(timeout) = runtime.request_timeout_ms {
                    profile.request_timeout_ms = timeout;
                }
            }
        }

        table
    }

    pub fn get(&self, key: &str) -> Option<&ModelProfile> {
        self.profiles.get(key)
    }

    pub fn insert(&mut self, key: &str, profile: ModelProfile) {
        self.profiles.insert(key.to_string(), profile);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelProfile)> {
        self.profiles.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The cheapest profile whose context window fits `context_size`.
    /// Ties break on higher quality, then on key order for determinism.
    pub fn cheapest_fitting(&self, context_size: usize) -> Option<(&str, &ModelProfile)> {
        let mut best: Option<(&str, &ModelProfile)> = None;
        for (key, profile) in &self.profiles {
            if profile.context_limit < context_size {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_key, best_profile)) => {
                    (
                        profile.cost_per_1k_tokens,
                        std::cmp::Reverse(
                            // Order quality descending without float Ord.
                            (profile.quality * 1e6) as i64,
                        ),
                        key.as_str(),
                    ) < (
                        best_profile.cost_per_1k_tokens,
                        std::cmp::Reverse((best_profile.quality * 1e6) as i64),
                        best_key,
                    )
                }
            };
            if better {
                best = Some((key.as_str(), profile));
            }
        }
        best
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sq_domain::config::{ModelProfileOverride, ProviderRuntimeConfig};

    #[test]
    fn split_model_key_variants() {
        assert_eq!(split_model_key("openai/gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(split_model_key("local"), ("local", ""));
    }

    #[test]
    fn builtin_contains_rule_based_terminal() {
        let table = ProfileTable::builtin();
        let local = table.get("local/rule-based").unwrap();
        assert!(local.is_local);
        assert_eq!(local.cost_per_1k_tokens, 0.0);
        assert_eq!(local.max_requests_per_second, 0);
    }

    #[test]
    fn cheapest_fitting_prefers_free_local() {
        let table = ProfileTable::builtin();
        let (key, _) = table.cheapest_fitting(1000).unwrap();
        assert_eq!(key, "local/rule-based");
    }

    #[test]
    fn cheapest_fitting_respects_context_limit() {
        let mut llm = LlmConfig::default();
        llm.profiles.insert(
            "local/rule-based".into(),
            ModelProfileOverride {
                context_limit: Some(1_000),
                ..Default::default()
            },
        );
        let table = ProfileTable::from_config(&llm);
        let (key, profile) = table.cheapest_fitting(150_000).unwrap();
        assert_ne!(key, "local/rule-based");
        assert!(profile.context_limit >= 150_000);
    }

    #[test]
    fn config_overrides_merge() {
        let mut llm = LlmConfig::default();
        llm.profiles.insert(
            "openai/gpt-4o".into(),
            ModelProfileOverride {
                cost_per_1k_tokens: Some(0.002),
                ..Default::default()
            },
        );
        llm.providers.insert(
            "openai".into(),
            ProviderRuntimeConfig {
                max_requests_per_second: Some(2),
                request_timeout_ms: None,
            },
        );
        let table = ProfileTable::from_config(&llm);
        let profile = table.get("openai/gpt-4o").unwrap();
        assert!((profile.cost_per_1k_tokens - 0.002).abs() < 1e-12);
        assert_eq!(profile.max_requests_per_second, 2);
        // Untouched fields keep builtin values.
        assert_eq!(profile.context_limit, 128_000);
        // Provider-wide limit also hits the other openai model.
        assert_eq!(
            table.get("openai/gpt-4o-mini").unwrap().max_requests_per_second,
            2
        );
    }
}
