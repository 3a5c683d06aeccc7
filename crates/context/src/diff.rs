use crate::context::{AgentContext, Namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sq_domain::error::Result;
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diff types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Slot went from empty to populated.
    Added,
    /// Slot went from populated to empty.
    Removed,
    /// Slot changed value or membership.
    Modified,
}

/// One changed slot within a namespace. Array-valued slots carry element
/// counts and, when elements expose an `id`, the identifiers involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotChange {
    pub slot: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub removed: usize,
    #[serde(default)]
    pub added_ids: Vec<String>,
    #[serde(default)]
    pub removed_ids: Vec<String>,
}

/// Key-level structural diff between two contexts. Only changed slots
/// appear; namespaces with no changes are absent from `changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDiff {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub changes: BTreeMap<String, Vec<SlotChange>>,
}

impl ContextDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Namespaces touched by this diff.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    /// Changed slots as `"namespace.slot"` paths.
    pub fn slots_written(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (ns, slots) in &self.changes {
            for change in slots {
                out.push(format!("{ns}.{}", change.slot));
            }
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diff computation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the structural diff from `before` to `after`, attributed to
/// `agent_id`. Comparison is key-level (namespace.slot), not byte-level.
pub fn diff(before: &AgentContext, after: &AgentContext, agent_id: &str) -> Result<ContextDiff> {
    let mut changes: BTreeMap<String, Vec<SlotChange>> = BTreeMap::new();

    for ns in Namespace::ALL {
        let b = before.namespace_value(ns)?;
        let a = after.namespace_value(ns)?;
        let (Some(b_map), Some(a_map)) = (b.as_object(), a.as_object()) else {
            continue;
        };

        let mut slot_changes = Vec::new();
        for (key, b_val) in b_map {
            // Namespaces are fixed structs, so both sides always expose
            // the same key set.
            let a_val = a_map.get(key).unwrap_or(&Value::Null);
            if let Some(change) = diff_slot(key, b_val, a_val) {
                slot_changes.push(change);
            }
        }
        if !slot_changes.is_empty() {
            changes.insert(ns.as_str().to_string(), slot_changes);
        }
    }

    Ok(ContextDiff {
        timestamp: Utc::now(),
        agent_id: agent_id.to_string(),
        changes,
    })
}

fn diff_slot(key: &str, before: &Value, after: &Value) -> Option<SlotChange> {
    if before == after {
        return None;
    }

    if let (Value::Array(b), Value::Array(a)) = (before, after) {
        let (added, added_ids) = members_missing_from(a, b);
        let (removed, removed_ids) = members_missing_from(b, a);
        let kind = if b.is_empty() {
            ChangeKind::Added
        } else if a.is_empty() {
            ChangeKind::Removed
        } else {
            ChangeKind::Modified
        };
        return Some(SlotChange {
            slot: key.to_string(),
            kind,
            added,
            removed,
            added_ids,
            removed_ids,
        });
    }

    let kind = if is_empty_value(before) {
        ChangeKind::Added
    } else if is_empty_value(after) {
        ChangeKind::Removed
    } else {
        ChangeKind::Modified
    };
    Some(SlotChange {
        slot: key.to_string(),
        kind,
        added: 0,
        removed: 0,
        added_ids: Vec::new(),
        removed_ids: Vec::new(),
    })
}

/// Count elements of `from` that are absent in `other`, collecting their
/// `id` fields when the elements expose one.
fn members_missing_from(from: &[Value], other: &[Value]) -> (usize, Vec<String>) {
    let mut count = 0;
    let mut ids = Vec::new();
    for el in from {
        if !other.contains(el) {
            count += 1;
            if let Some(id) = element_id(el) {
                ids.push(id);
            }
        }
    }
    (count, ids)
}

fn element_id(el: &Value) -> Option<String> {
    el.as_object()?
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diff tracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks context evolution across agent runs: each capture diffs the
/// current context against the advancing baseline.
pub struct DiffTracker {
    baseline: AgentContext,
    history: Vec<ContextDiff>,
}

impl DiffTracker {
    /// Snapshot `baseline` as the starting point.
    pub fn new(baseline: AgentContext) -> Self {
        Self {
            baseline,
            history: Vec::new(),
        }
    }

    /// Diff `current` against the baseline, record the result, and
    /// advance the baseline to `current`.
    pub fn capture(&mut self, agent_id: &str, current: &AgentContext) -> Result<ContextDiff> {
        let d = diff(&self.baseline, current, agent_id)?;
        self.history.push(d.clone());
        self.baseline = current.clone();
        Ok(d)
    }

    pub fn baseline(&self) -> &AgentContext {
        &self.baseline
    }

    pub fn history(&self) -> &[ContextDiff] {
        &self.history
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
