use crate::context::AgentContext;
use sq_domain::error::{Error, Result};
use sq_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Size limits applied to a context. Serialized JSON byte length is the
/// authoritative measure for the total and per-namespace checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    pub max_total: usize,
    pub max_namespace: usize,
    pub max_array_items: usize,
    pub externalization_threshold: usize,
    pub max_inline_artifact: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_total: 10 * 1024 * 1024,
            max_namespace: 2 * 1024 * 1024,
            max_array_items: 1000,
            externalization_threshold: 100 * 1024,
            max_inline_artifact: 50 * 1024,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Out-of-context storage for externalized artifact payloads. The
/// returned reference is opaque to the context model.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, artifact_id: &str, payload: &str) -> Result<String>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, storage_ref: &str) -> Option<String> {
        self.inner.lock().get(storage_ref).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, artifact_id: &str, payload: &str) -> Result<String> {
        let storage_ref = format!("mem://{artifact_id}");
        self.inner
            .lock()
            .insert(storage_ref.clone(), payload.to_string());
        Ok(storage_ref)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Size checker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Enforces [`SizeLimits`] on a context. Size errors are recoverable:
/// the caller may externalize oversized payloads and retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeChecker {
    pub limits: SizeLimits,
}

impl SizeChecker {
    pub fn new(limits: SizeLimits) -> Self {
        Self { limits }
    }

    /// Check every limit; the first violated limit is returned.
    pub fn check(&self, ctx: &AgentContext) -> Result<()> {
        let stats = ctx.stats()?;

        if stats.total_size > self.limits.max_total {
            return Err(Error::ContextSize {
                limit: "max_total".into(),
                current: stats.total_size,
                maximum: self.limits.max_total,
            });
        }
        for (ns, size) in &stats.size_by_namespace {
            if *size > self.limits.max_namespace {
                return Err(Error::ContextSize {
                    limit: format!("max_namespace:{ns}"),
                    current: *size,
                    maximum: self.limits.max_namespace,
                });
            }
        }
        for (path, count) in &stats.array_counts {
            if *count > self.limits.max_array_items {
                return Err(Error::ContextSize {
                    limit: format!("max_array_items:{path}"),
                    current: *count,
                    maximum: self.limits.max_array_items,
                });
            }
        }
        for artifact in ctx.all_artifacts() {
            if !artifact.external && artifact.payload_len() > self.limits.max_inline_artifact {
                return Err(Error::ContextSize {
                    limit: format!("max_inline_artifact:{}", artifact.id),
                    current: artifact.payload_len(),
                    maximum: self.limits.max_inline_artifact,
                });
            }
        }
        Ok(())
    }

    /// Whether any inline artifact payload exceeds the externalization
    /// threshold.
    pub fn should_externalize(&self, ctx: &AgentContext) -> bool {
        ctx.all_artifacts()
            .any(|a| !a.external && a.payload_len() > self.limits.externalization_threshold)
    }

    /// Move every over-threshold inline payload into `store`, replacing
    /// it with the opaque storage reference. Artifact identity and
    /// ordering are preserved. Returns the number externalized.
    pub fn externalize(&self, ctx: &mut AgentContext, store: &dyn ArtifactStore) -> Result<usize> {
        let threshold = self.limits.externalization_threshold;
        let session_id = ctx.metadata.session_id.clone();
        let mut moved = 0;

        for artifact in ctx.all_artifacts_mut() {
            if artifact.external || artifact.payload_len() <= threshold {
                continue;
            }
            let payload = artifact.payload.take().unwrap_or_default();
            let storage_ref = store.put(&artifact.id, &payload)?;

            TraceEvent::ArtifactExternalized {
                session_id: session_id.clone(),
                artifact_id: artifact.id.clone(),
                payload_bytes: payload.len(),
            }
            .emit();

            artifact.storage_ref = Some(storage_ref);
            artifact.external = true;
            moved += 1;
        }
        Ok(moved)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Artifact;

    fn small_limits() -> SizeLimits {
        SizeLimits {
            max_total: 8 * 1024,
            max_namespace: 4 * 1024,
            max_array_items: 3,
            externalization_threshold: 64,
            max_inline_artifact: 128,
        }
    }

    #[test]
    fn default_limits_match_policy() {
        let limits = SizeLimits::default();
        assert_eq!(limits.max_total, 10 * 1024 * 1024);
        assert_eq!(limits.max_namespace, 2 * 1024 * 1024);
        assert_eq!(limits.max_array_items, 1000);
        assert_eq!(limits.externalization_threshold, 100 * 1024);
        assert_eq!(limits.max_inline_artifact, 50 * 1024);
    }

    #[test]
    fn fresh_context_passes() {
        let ctx = AgentContext::new("s", "t");
        SizeChecker::default().check(&ctx).unwrap();
    }

    #[test]
    fn array_limit_violation_names_the_slot() {
        let mut ctx = AgentContext::new("s", "t");
        for i in 0..4 {
            ctx.retrieval
                .artifacts
                .push(Artifact::inline(format!("a{i}"), "x", "p"));
        }
        let err = SizeChecker::new(small_limits()).check(&ctx).unwrap_err();
        match err {
            Error::ContextSize { limit, current, maximum } => {
                assert_eq!(limit, "max_array_items:retrieval.artifacts");
                assert_eq!(current, 4);
                assert_eq!(maximum, 3);
            }
            other => panic!("expected ContextSize, got {other}"),
        }
    }

    #[test]
    fn inline_artifact_limit() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.retrieval
            .artifacts
            .push(Artifact::inline("big", "dump", "x".repeat(200)));
        let err = SizeChecker::new(small_limits()).check(&ctx).unwrap_err();
        assert!(err.to_string().contains("max_inline_artifact:big"));
    }

    #[test]
    fn externalize_moves_payload_and_preserves_order() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.retrieval.artifacts.push(Artifact::inline("a1", "small", "tiny"));
        ctx.retrieval
            .artifacts
            .push(Artifact::inline("a2", "large", "x".repeat(100)));

        let checker = SizeChecker::new(small_limits());
        assert!(checker.should_externalize(&ctx));

        let store = MemoryArtifactStore::new();
        let moved = checker.externalize(&mut ctx, &store).unwrap();
        assert_eq!(moved, 1);
        assert!(!checker.should_externalize(&ctx));

        // Order and identity preserved.
        assert_eq!(ctx.retrieval.artifacts[0].id, "a1");
        assert_eq!(ctx.retrieval.artifacts[1].id, "a2");

        let a2 = &ctx.retrieval.artifacts[1];
        assert!(a2.external);
        assert!(a2.payload.is_none());
        let stored = store.get(a2.storage_ref.as_deref().unwrap()).unwrap();
        assert_eq!(stored.len(), 100);

        // A second pass finds nothing left to move.
        assert_eq!(checker.externalize(&mut ctx, &store).unwrap(), 0);

        let stats = ctx.stats().unwrap();
        assert_eq!(stats.externalized_count, 1);
    }

    #[test]
    fn size_error_clears_after_externalization() {
        let mut ctx = AgentContext::new("s", "t");
        ctx.retrieval
            .artifacts
            .push(Artifact::inline("big", "dump", "x".repeat(200)));

        let checker = SizeChecker::new(small_limits());
        assert!(checker.check(&ctx).is_err());

        let store = MemoryArtifactStore::new();
        checker.externalize(&mut ctx, &store).unwrap();
        checker.check(&ctx).unwrap();
    }
}
