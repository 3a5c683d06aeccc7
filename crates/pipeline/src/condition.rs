use serde_json::Value;
use sq_context::AgentContext;
use sq_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gate conditions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A predicate over a `"namespace.slot"` path, written in config as
/// `"<path> <op> [value]"`:
///
/// - `reasoning.intents not_empty`
/// - `metadata.locale exists`
/// - `metadata.locale eq en`
/// - `reasoning.summary contains gitlab`
/// - `llm.usage.total_cost_usd lt 0.5` is NOT supported: paths address
///   one namespace slot, not nested fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: String,
    pub op: Comparator,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Exists,
    NotEmpty,
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

impl Comparator {
    fn parse(s: &str) -> Option<Comparator> {
        match s {
            "exists" => Some(Comparator::Exists),
            "not_empty" => Some(Comparator::NotEmpty),
            "eq" => Some(Comparator::Eq),
            "ne" => Some(Comparator::Ne),
            "gt" => Some(Comparator::Gt),
            "lt" => Some(Comparator::Lt),
            "contains" => Some(Comparator::Contains),
            _ => None,
        }
    }

    fn takes_value(&self) -> bool {
        !matches!(self, Comparator::Exists | Comparator::NotEmpty)
    }
}

impl Condition {
    /// Parse `"<path> <op> [value]"`. The value, when present, is the
    /// remainder of the string (so it may contain spaces).
    pub fn parse(raw: &str) -> Result<Condition> {
        let mut parts = raw.trim().splitn(3, char::is_whitespace);
        let path = parts
            .next()
            .filter(|p| p.contains('.'))
            .ok_or_else(|| Error::Config(format!("condition '{raw}': missing slot path")))?;
        let op_str = parts
            .next()
            .ok_or_else(|| Error::Config(format!("condition '{raw}': missing comparator")))?;
        let op = Comparator::parse(op_str)
            .ok_or_else(|| Error::Config(format!("condition '{raw}': unknown comparator '{op_str}'")))?;

        let value = parts.next().map(|v| v.trim().to_string());
        if op.takes_value() && value.is_none() {
            return Err(Error::Config(format!(
                "condition '{raw}': comparator '{op_str}' requires a value"
            )));
        }

        Ok(Condition {
            path: path.to_string(),
            op,
            value,
        })
    }

    /// Evaluate against a context. Missing slots make every comparator
    /// false except `ne`.
    pub fn eval(&self, ctx: &AgentContext) -> bool {
        match self.op {
            Comparator::Exists | Comparator::NotEmpty => ctx.slot_present(&self.path),
            Comparator::Eq | Comparator::Ne | Comparator::Gt | Comparator::Lt
            | Comparator::Contains => {
                let expected = self.value.as_deref().unwrap_or_default();
                let Some(actual) = ctx.slot_value(&self.path) else {
                    return self.op == Comparator::Ne;
                };
                match self.op {
                    Comparator::Eq => value_eq(&actual, expected),
                    Comparator::Ne => !value_eq(&actual, expected),
                    Comparator::Gt => compare_numeric(&actual, expected)
                        .is_some_and(|ord| ord == std::cmp::Ordering::Greater),
                    Comparator::Lt => compare_numeric(&actual, expected)
                        .is_some_and(|ord| ord == std::cmp::Ordering::Less),
                    Comparator::Contains => value_contains(&actual, expected),
                    _ => unreachable!(),
                }
            }
        }
    }
}

fn value_eq(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        Value::Number(n) => expected.parse::<f64>().is_ok_and(|e| {
            n.as_f64().is_some_and(|a| (a - e).abs() < f64::EPSILON)
        }),
        Value::Bool(b) => expected.parse::<bool>().is_ok_and(|e| *b == e),
        Value::Null => expected == "null",
        _ => false,
    }
}

fn compare_numeric(actual: &Value, expected: &str) -> Option<std::cmp::Ordering> {
    let a = actual.as_f64()?;
    let e = expected.parse::<f64>().ok()?;
    a.partial_cmp(&e)
}

fn value_contains(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s.contains(expected),
        Value::Array(items) => items.iter().any(|item| match item {
            Value::String(s) => s == expected,
            other => value_eq(other, expected),
        }),
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sq_context::{Intent, IntentKind};

    fn ctx() -> AgentContext {
        let mut c = AgentContext::new("s", "t");
        c.metadata.locale = Some("en".into());
        c.reasoning.intents.push(Intent {
            kind: IntentKind::QueryCommits,
            confidence: 0.9,
            entities: vec![],
        });
        c.reasoning.summary = Some("commits in gitlab-mcp".into());
        c
    }

    #[test]
    fn parse_rejects_malformed_conditions() {
        assert!(Condition::parse("no-dot exists").is_err());
        assert!(Condition::parse("reasoning.intents").is_err());
        assert!(Condition::parse("reasoning.intents frobnicates").is_err());
        assert!(Condition::parse("metadata.locale eq").is_err());
    }

    #[test]
    fn not_empty_and_exists() {
        let c = ctx();
        assert!(Condition::parse("reasoning.intents not_empty").unwrap().eval(&c));
        assert!(!Condition::parse("enrichment.facts not_empty").unwrap().eval(&c));
        assert!(Condition::parse("metadata.locale exists").unwrap().eval(&c));
    }

    #[test]
    fn eq_and_ne_on_strings() {
        let c = ctx();
        assert!(Condition::parse("metadata.locale eq en").unwrap().eval(&c));
        assert!(!Condition::parse("metadata.locale eq fr").unwrap().eval(&c));
        assert!(Condition::parse("metadata.locale ne fr").unwrap().eval(&c));
        // Missing slot: only `ne` holds.
        assert!(Condition::parse("reasoning.nope ne x").unwrap().eval(&c));
        assert!(!Condition::parse("reasoning.nope eq x").unwrap().eval(&c));
    }

    #[test]
    fn numeric_comparisons() {
        let c = ctx();
        assert!(Condition::parse("metadata.schema_version gt 0").unwrap().eval(&c));
        assert!(Condition::parse("metadata.schema_version lt 99").unwrap().eval(&c));
        assert!(!Condition::parse("metadata.schema_version gt 99").unwrap().eval(&c));
    }

    #[test]
    fn contains_on_strings_with_spaces_in_value() {
        let c = ctx();
        let cond = Condition::parse("reasoning.summary contains gitlab-mcp").unwrap();
        assert!(cond.eval(&c));
        let cond = Condition::parse("reasoning.summary contains commits in").unwrap();
        assert_eq!(cond.value.as_deref(), Some("commits in"));
        assert!(cond.eval(&c));
    }
}
