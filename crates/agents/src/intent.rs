use regex::Regex;
use sq_context::{AgentContext, Intent, IntentKind};
use sq_domain::error::Result;
use sq_pipeline::{Agent, AgentCapabilities};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyword table per intent kind. Confidence grows with the number of
/// matching keywords; dispatch downstream is always on [`IntentKind`],
/// never on the raw strings.
const KEYWORDS: &[(IntentKind, &[&str])] = &[
    (IntentKind::QueryCommits, &["commit", "commits", "push", "pushed"]),
    (IntentKind::QueryIssues, &["issue", "issues", "bug", "ticket"]),
    (
        IntentKind::QueryMergeRequests,
        &["merge request", "merge requests", "pull request", "mr"],
    ),
    (IntentKind::QueryPipelines, &["pipeline", "pipelines", "build", "ci"]),
    (IntentKind::SearchCode, &["search", "find code", "grep", "where is"]),
    (IntentKind::ExplainConcept, &["explain", "why", "how does", "what is"]),
    (
        IntentKind::SummarizeActivity,
        &["summarize", "summary", "activity", "overview"],
    ),
];

const BASE_CONFIDENCE: f64 = 0.6;
const PER_KEYWORD: f64 = 0.15;
const MAX_CONFIDENCE: f64 = 0.95;

/// Classifies the session query into intents and extracts entities
/// (projects, dates, authors).
pub struct IntentAgent {
    project_re: Regex,
    author_re: Regex,
    iso_date_re: Regex,
}

impl IntentAgent {
    pub fn new() -> Self {
        Self {
            project_re: Regex::new(r"(?i)\bproject\s+([A-Za-z0-9][A-Za-z0-9_.-]*)")
                .expect("static regex"),
            author_re: Regex::new(r"(?i)\bby\s+([A-Za-z][A-Za-z0-9_.-]*)").expect("static regex"),
            iso_date_re: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("static regex"),
        }
    }

    fn classify(&self, query: &str) -> Vec<Intent> {
        let lower = query.to_lowercase();
        let mut intents = Vec::new();

        for (kind, keywords) in KEYWORDS {
            let hits = keywords.iter().filter(|kw| contains_term(&lower, kw)).count();
            if hits == 0 {
                continue;
            }
            let confidence =
                (BASE_CONFIDENCE + PER_KEYWORD * (hits as f64 - 1.0).max(0.0) + PER_KEYWORD)
                    .min(MAX_CONFIDENCE);
            intents.push(Intent {
                kind: *kind,
                confidence,
                entities: Vec::new(),
            });
        }

        if intents.is_empty() {
            intents.push(Intent {
                kind: IntentKind::Unknown,
                confidence: 0.2,
                entities: Vec::new(),
            });
        }
        // Strongest intent first.
        intents.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        intents
    }

    fn extract_entities(&self, query: &str) -> BTreeMap<String, Vec<String>> {
        let mut entities: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let lower = query.to_lowercase();

        for caps in self.project_re.captures_iter(query) {
            push_unique(entities.entry("projects".into()).or_default(), &caps[1]);
        }
        for caps in self.author_re.captures_iter(query) {
            push_unique(entities.entry("authors".into()).or_default(), &caps[1]);
        }

        for phrase in ["last week", "last month", "yesterday", "today", "this week"] {
            if lower.contains(phrase) {
                push_unique(entities.entry("dates".into()).or_default(), phrase);
            }
        }
        for m in self.iso_date_re.find_iter(query) {
            push_unique(entities.entry("dates".into()).or_default(), m.as_str());
        }

        entities
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Substring match on word boundaries, so "ci" does not fire inside
/// "activity".
fn contains_term(text: &str, term: &str) -> bool {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(pos) = text[start..].find(term) {
        let at = start + pos;
        let end = at + term.len();
        let before_ok = at == 0 || !bytes[at - 1].is_ascii_alphanumeric();
        let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}

impl Default for IntentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Agent for IntentAgent {
    fn id(&self) -> &str {
        "intent"
    }

    fn preconditions(&self) -> &[&str] {
        &["metadata.query"]
    }

    fn postconditions(&self) -> &[&str] {
        &["reasoning.intents"]
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            estimated_duration_ms: 5,
            ..Default::default()
        }
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        mut ctx: AgentContext,
    ) -> Result<AgentContext> {
        let query = ctx.metadata.query.clone().unwrap_or_default();

        let entities = self.extract_entities(&query);
        let flat: Vec<String> = entities.values().flatten().cloned().collect();

        let mut intents = self.classify(&query);
        for intent in &mut intents {
            intent.entities = flat.clone();
        }

        let top = &intents[0];
        tracing::debug!(
            intents = intents.len(),
            top = %top.kind,
            confidence = top.confidence,
            "query classified"
        );

        ctx.reasoning.intents = intents;
        ctx.reasoning.entities = entities;
        Ok(ctx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
