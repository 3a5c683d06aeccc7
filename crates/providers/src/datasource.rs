use crate::traits::{DatasourceClient, SourceRecord};
use parking_lot::RwLock;
use sq_domain::error::{Error, Result};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static datasource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory datasource for tests and local mode: records are seeded per
/// source and matched by substring against the query and filters.
#[derive(Default)]
pub struct StaticDatasource {
    records: RwLock<BTreeMap<String, Vec<SourceRecord>>>,
}

impl StaticDatasource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one record under a source name.
    pub fn seed(&self, source: &str, id: &str, label: &str, payload: &str) {
        self.records
            .write()
            .entry(source.to_string())
            .or_default()
            .push(SourceRecord {
                id: id.to_string(),
                label: label.to_string(),
                payload: payload.to_string(),
                source: source.to_string(),
            });
    }

    pub fn record_count(&self, source: &str) -> usize {
        self.records.read().get(source).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl DatasourceClient for StaticDatasource {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        source: &str,
        query: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<SourceRecord>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("datasource '{source}' fetch")));
        }

        let records = self.records.read();
        let Some(pool) = records.get(source) else {
            return Ok(Vec::new());
        };

        let query_lower = query.to_lowercase();
        // Matching is textual, so only the project filter is applied;
        // time and author windows are not modeled by the fixture store.
        let project = filters.get("project").map(|p| p.to_lowercase());
        let matches = pool
            .iter()
            .filter(|r| {
                let text = format!("{} {}", r.label, r.payload).to_lowercase();
                let query_hit = query_lower.is_empty()
                    || query_lower
                        .split_whitespace()
                        .any(|term| text.contains(term));
                let filter_hit = project
                    .as_ref()
                    .map_or(true, |needle| text.contains(needle));
                query_hit && filter_hit
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> StaticDatasource {
        let ds = StaticDatasource::new();
        ds.seed(
            "gitlab",
            "c-101",
            "commit c-101",
            "fix pipeline flake in gitlab-mcp",
        );
        ds.seed("gitlab", "c-102", "commit c-102", "add retry to http client");
        ds.seed("jira", "J-7", "issue J-7", "login page broken");
        ds
    }

    #[tokio::test]
    async fn fetch_matches_by_query_terms() {
        let ds = seeded();
        let cancel = CancellationToken::new();
        let hits = ds
            .fetch(&cancel, "gitlab", "recent commit activity", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2, "both records contain the term 'commit'");
    }

    #[tokio::test]
    async fn fetch_applies_filters() {
        let ds = seeded();
        let cancel = CancellationToken::new();
        let filters: BTreeMap<String, String> =
            [("project".to_string(), "gitlab-mcp".to_string())].into();
        let hits = ds.fetch(&cancel, "gitlab", "", &filters).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c-101");
    }

    #[tokio::test]
    async fn unknown_source_returns_empty() {
        let ds = seeded();
        let cancel = CancellationToken::new();
        let hits = ds
            .fetch(&cancel, "github", "anything", &BTreeMap::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
