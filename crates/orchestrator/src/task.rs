use sq_domain::config::SelectionConfig;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed classification of LLM request complexity. Each task type has
/// a fixed selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    IntentClassification,
    EntityExtraction,
    Validation,
    ShortSynthesis,
    MediumSynthesis,
    QueryNormalization,
    Dedup,
    SimpleInference,
    MediumSynthesisLarge,
    ComplexRetrievalPlanning,
    MultiSourceCorrelation,
    AdvancedInference,
    LongContextAnalysis,
    DeepReasoning,
    CriticalReasoning,
}

impl TaskType {
    pub const ALL: [TaskType; 15] = [
        TaskType::IntentClassification,
        TaskType::EntityExtraction,
        TaskType::Validation,
        TaskType::ShortSynthesis,
        TaskType::MediumSynthesis,
        TaskType::QueryNormalization,
        TaskType::Dedup,
        TaskType::SimpleInference,
        TaskType::MediumSynthesisLarge,
        TaskType::ComplexRetrievalPlanning,
        TaskType::MultiSourceCorrelation,
        TaskType::AdvancedInference,
        TaskType::LongContextAnalysis,
        TaskType::DeepReasoning,
        TaskType::CriticalReasoning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::IntentClassification => "intent_classification",
            TaskType::EntityExtraction => "entity_extraction",
            TaskType::Validation => "validation",
            TaskType::ShortSynthesis => "short_synthesis",
            TaskType::MediumSynthesis => "medium_synthesis",
            TaskType::QueryNormalization => "query_normalization",
            TaskType::Dedup => "dedup",
            TaskType::SimpleInference => "simple_inference",
            TaskType::MediumSynthesisLarge => "medium_synthesis_large",
            TaskType::ComplexRetrievalPlanning => "complex_retrieval_planning",
            TaskType::MultiSourceCorrelation => "multi_source_correlation",
            TaskType::AdvancedInference => "advanced_inference",
            TaskType::LongContextAnalysis => "long_context_analysis",
            TaskType::DeepReasoning => "deep_reasoning",
            TaskType::CriticalReasoning => "critical_reasoning",
        }
    }

    pub fn parse(s: &str) -> Option<TaskType> {
        TaskType::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Default response-cache TTL for this task type.
    pub fn default_cache_ttl(&self) -> Duration {
        let secs = match self {
            TaskType::IntentClassification
            | TaskType::EntityExtraction
            | TaskType::QueryNormalization
            | TaskType::Dedup => 24 * 3600,
            TaskType::Validation => 12 * 3600,
            TaskType::ShortSynthesis
            | TaskType::MediumSynthesis
            | TaskType::MediumSynthesisLarge => 3600,
            TaskType::SimpleInference
            | TaskType::ComplexRetrievalPlanning
            | TaskType::MultiSourceCorrelation
            | TaskType::AdvancedInference
            | TaskType::LongContextAnalysis => 30 * 60,
            TaskType::DeepReasoning | TaskType::CriticalReasoning => 15 * 60,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Selection strategies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One candidate in a selection strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A `"provider/model"` key.
    Model(String),
    /// The deterministic sentinel: the agent skips the LLM call and
    /// runs its rule-based path.
    RuleBased,
}

impl Candidate {
    pub fn parse(s: &str) -> Candidate {
        if s == "rule_based" {
            Candidate::RuleBased
        } else {
            Candidate::Model(s.to_string())
        }
    }

    /// The `"provider/model"` string recorded in decisions.
    pub fn decision_key(&self) -> &str {
        match self {
            Candidate::Model(key) => key,
            Candidate::RuleBased => "local/rule-based",
        }
    }
}

/// Ordered candidate list `[default, fallback_1, fallback_2,
/// deterministic]` for one task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionStrategy {
    pub candidates: Vec<Candidate>,
}

impl SelectionStrategy {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Reason label for a candidate slot: `default`, `fallback_1`,
    /// `fallback_2`, then `deterministic`.
    pub fn slot_label(index: usize, candidate: &Candidate) -> String {
        if matches!(candidate, Candidate::RuleBased) {
            return "deterministic".into();
        }
        match index {
            0 => "default".into(),
            n => format!("fallback_{n}"),
        }
    }
}

/// Per-task-type strategy table: built-ins overridden by config.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    strategies: HashMap<TaskType, SelectionStrategy>,
    default_model: String,
}

impl StrategyTable {
    /// The built-in strategy set: cheap fast models for classification
    /// tiers, stronger models with cheaper fallbacks for reasoning
    /// tiers, every chain terminated by the rule-based sentinel.
    pub fn builtin() -> Self {
        let mut strategies = HashMap::new();

        let chain = |models: &[&str]| -> SelectionStrategy {
            let mut candidates: Vec<Candidate> =
                models.iter().map(|m| Candidate::Model(m.to_string())).collect();
            candidates.push(Candidate::RuleBased);
            SelectionStrategy::new(candidates)
        };

        let light = chain(&[
            "openai/gpt-4o-mini",
            "anthropic/claude-haiku-3-5",
            "local/rule-based",
        ]);
        let medium = chain(&[
            "openai/gpt-4o-mini",
            "openai/gpt-4o",
            "local/rule-based",
        ]);
        let heavy = chain(&[
            "anthropic/claude-sonnet-4",
            "openai/gpt-4o",
            "local/rule-based",
        ]);

        for task in [
            TaskType::IntentClassification,
            TaskType::EntityExtraction,
            TaskType::QueryNormalization,
            TaskType::Dedup,
            TaskType::Validation,
        ] {
            strategies.insert(task, light.clone());
        }
        for task in [
            TaskType::ShortSynthesis,
            TaskType::MediumSynthesis,
            TaskType::MediumSynthesisLarge,
            TaskType::SimpleInference,
        ] {
            strategies.insert(task, medium.clone());
        }
        for task in [
            TaskType::ComplexRetrievalPlanning,
            TaskType::MultiSourceCorrelation,
            TaskType::AdvancedInference,
            TaskType::LongContextAnalysis,
            TaskType::DeepReasoning,
            TaskType::CriticalReasoning,
        ] {
            strategies.insert(task, heavy.clone());
        }

        Self {
            strategies,
            default_model: "local/rule-based".into(),
        }
    }

    /// Builtin strategies with `[llm.selection]` overrides applied: a
    /// `defaults` entry replaces the first candidate, a `fallbacks`
    /// entry replaces everything after it.
    pub fn from_config(selection: &SelectionConfig, default_model: &str) -> Self {
        let mut table = Self::builtin();
        table.default_model = default_model.to_string();

        for (task_name, model) in &selection.defaults {
            let Some(task) = TaskType::parse(task_name) else {
                tracing::warn!(task = %task_name, "unknown task type in llm.selection.defaults");
                continue;
            };
            let strategy = table
                .strategies
                .entry(task)
                .or_insert_with(|| SelectionStrategy::new(vec![Candidate::RuleBased]));
            if strategy.candidates.is_empty() {
                strategy.candidates.push(Candidate::parse(model));
            } else {
                strategy.candidates[0] = Candidate::parse(model);
            }
        }

        for (task_name, models) in &selection.fallbacks {
            let Some(task) = TaskType::parse(task_name) else {
                tracing::warn!(task = %task_name, "unknown task type in llm.selection.fallbacks");
                continue;
            };
            let strategy = table
                .strategies
                .entry(task)
                .or_insert_with(|| SelectionStrategy::new(vec![Candidate::RuleBased]));
            strategy.candidates.truncate(1);
            for model in models {
                strategy.candidates.push(Candidate::parse(model));
            }
        }

        table
    }

    /// Strategy for a task type; unknown tasks get the configured
    /// default model followed by the sentinel.
    pub fn for_task(&self, task: TaskType) -> SelectionStrategy {
        self.strategies.get(&task).cloned().unwrap_or_else(|| {
            SelectionStrategy::new(vec![
                Candidate::parse(&self.default_model),
                Candidate::RuleBased,
            ])
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
