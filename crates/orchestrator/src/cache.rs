use crate::task::TaskType;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use sq_domain::config::CacheConfig;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fingerprinting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collapse whitespace runs and lowercase, so cosmetic prompt edits hit
/// the same entry.
fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Cache key over the request-identity tuple.
pub fn fingerprint(
    prompt: &str,
    model: &str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    task_type: TaskType,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_prompt(prompt).as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(max_tokens.unwrap_or(0).to_le_bytes());
    hasher.update(temperature.unwrap_or(0.0).to_le_bytes());
    hasher.update(task_type.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: String,
    pub tokens: u64,
    pub cost: f64,
    pub task_type: TaskType,
    /// The `"provider/model"` that produced the response, so a cache
    /// hit re-reports the original selection.
    pub selected: String,
    pub stored_at: Instant,
}

impl CacheEntry {
    fn weight(&self) -> usize {
        self.response.len() + self.selected.len() + 64
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    /// LRU order, least-recent at the front.
    order: VecDeque<String>,
    total_weight: usize,
}

/// Process-wide fingerprinted response cache with per-task-type TTLs
/// and LRU eviction under entry-count and byte-size caps.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    enabled: bool,
    max_entries: usize,
    max_weight: usize,
    ttls: HashMap<TaskType, Duration>,
}

impl ResponseCache {
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut ttls = HashMap::new();
        for task in TaskType::ALL {
            let ttl = config
                .ttls_by_task
                .get(task.as_str())
                .map(|secs| Duration::from_secs(*secs))
                .unwrap_or_else(|| task.default_cache_ttl());
            ttls.insert(task, ttl);
        }
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                total_weight: 0,
            }),
            enabled: config.enabled,
            max_entries: config.max_entries,
            max_weight: config.max_size_bytes,
            ttls,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl_for(&self, task: TaskType) -> Duration {
        self.ttls
            .get(&task)
            .copied()
            .unwrap_or_else(|| task.default_cache_ttl())
    }

    /// Look up a live entry and bump its recency. Expired entries are
    /// removed on the way.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock();

        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => entry.stored_at.elapsed() > self.ttl_for(entry.task_type),
        };
        if expired {
            if let Some(entry) = inner.map.remove(key) {
                inner.total_weight -= entry.weight();
            }
            inner.order.retain(|k| k != key);
            return None;
        }

        inner.order.retain(|k| k != key);
        inner.order.push_back(key.to_string());
        inner.map.get(key).cloned()
    }

    /// Store an entry, evicting least-recently-used entries while over
    /// either cap.
    pub fn put(&self, key: &str, entry: CacheEntry) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock();

        if let Some(old) = inner.map.remove(key) {
            inner.total_weight -= old.weight();
            inner.order.retain(|k| k != key);
        }

        inner.total_weight += entry.weight();
        inner.map.insert(key.to_string(), entry);
        inner.order.push_back(key.to_string());

        while inner.map.len() > self.max_entries || inner.total_weight > self.max_weight {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.map.remove(&oldest) {
                inner.total_weight -= evicted.weight();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
