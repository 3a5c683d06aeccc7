mod llm;
mod pipeline;
mod providers;
mod server;
mod workflows;

pub use llm::*;
pub use pipeline::*;
pub use providers::*;
pub use server::*;
pub use workflows::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream provider connections keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
    /// Pipeline for the default workflow.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Read a TOML config file, expand `${VAR}` references against the
    /// process environment, and parse.
    ///
    /// An unresolved reference fails loading; this is the only path that
    /// touches the environment, so parsed configs are inert values.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env(&raw)?;
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("parse {path:?}: {e}")))
    }

    /// Resolve a workflow name to its pipeline definition.
    ///
    /// The default workflow falls back to the top-level `[pipeline]`
    /// section when `[workflows.pipelines]` has no entry for it.
    pub fn workflow_pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        if !self.workflows.enabled.iter().any(|w| w == name) {
            return None;
        }
        self.workflows
            .pipelines
            .get(name)
            .or((name == self.workflows.default).then_some(&self.pipeline))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment expansion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replace every `${VAR}` in `raw` with the value of the environment
/// variable `VAR`. All unresolved references are collected into one
/// `Error::Config` so the operator sees the full list at once.
pub fn expand_env(raw: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    let mut missing: Vec<String> = Vec::new();
    let expanded = re.replace_all(raw, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(val) => val,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });
    if missing.is_empty() {
        Ok(expanded.into_owned())
    } else {
        Err(Error::Config(format!(
            "unresolved environment references: {}",
            missing.join(", ")
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // Enabled remote providers need a base_url.
        for (name, p) in &self.providers {
            if p.enabled && !p.is_local && p.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.{name}.base_url"),
                    message: "base_url must not be empty for a remote provider".into(),
                });
            }
            if p.enabled && !p.is_local && p.api_key.as_deref().map_or(true, str::is_empty) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("providers.{name}.api_key"),
                    message: "no API key configured; requests to this provider will fail".into(),
                });
            }
        }

        // The default workflow must be enabled and resolvable.
        if !self
            .workflows
            .enabled
            .iter()
            .any(|w| w == &self.workflows.default)
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "workflows.default".into(),
                message: format!(
                    "default workflow '{}' is not in workflows.enabled",
                    self.workflows.default
                ),
            });
        }
        for name in &self.workflows.enabled {
            if self.workflow_pipeline(name).is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("workflows.pipelines.{name}"),
                    message: "enabled workflow has no pipeline definition".into(),
                });
            }
        }

        // Pipeline entries must be unique and dependency refs resolvable.
        let mut pipelines: Vec<(&str, &PipelineConfig)> = vec![("pipeline", &self.pipeline)];
        for (name, p) in &self.workflows.pipelines {
            pipelines.push((name.as_str(), p));
        }
        for (pname, p) in pipelines {
            let ids: Vec<&str> = p.agents.iter().map(|a| a.id.as_str()).collect();
            for spec in &p.agents {
                if spec.id.is_empty() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("{pname}.agents"),
                        message: "agent id must not be empty".into(),
                    });
                }
                for dep in &spec.depends_on {
                    if !ids.contains(&dep.as_str()) {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("{pname}.agents.{}.depends_on", spec.id),
                            message: format!("unknown dependency '{dep}'"),
                        });
                    }
                }
            }
            let mut seen: Vec<&str> = Vec::new();
            for id in &ids {
                if seen.contains(id) {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("{pname}.agents"),
                        message: format!("duplicate agent id '{id}'"),
                    });
                }
                seen.push(id);
            }
        }

        // Budget sanity.
        let b = &self.llm.budget;
        if b.session < 0.0 || b.agent < 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.budget".into(),
                message: "budgets must not be negative".into(),
            });
        }
        if !(0.0..=1.0).contains(&b.warning_threshold) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.budget.warning_threshold".into(),
                message: "warning_threshold must be within [0, 1]".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
