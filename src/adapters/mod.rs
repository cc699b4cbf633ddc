//! Backend adapters: each translates one backend-specific query string into
//! a list of `Paper`s, enforcing its own rate/concurrency limits, retry
//! backoff, and best-effort full-text enrichment. No adapter ever raises
//! across its boundary — partial failure (fewer results) is always
//! preferred over total failure, matching `gscholar.rs::query`'s
//! continue-on-page-error loop and `openalex.rs::query`'s
//! warn-and-empty-vec fallback.

pub mod arxiv;
pub mod core;
pub mod openalex;
pub mod retry;
pub mod scopus;
pub mod semantic_scholar;

use crate::model::Paper;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared contract every backend adapter implements.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Short, lowercase backend tag (`"openalex"`, `"scopus"`, ...), used to
    /// tag queries and to key the platform-enable list.
    fn name(&self) -> &'static str;

    /// Search for up to `limit` papers matching `query`. Never raises;
    /// returns as many valid `Paper`s as could be harvested, possibly zero.
    async fn search(&self, query: &str, limit: usize) -> Vec<Paper>;
}

/// Holds one configured adapter instance per enabled backend.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn BackendAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, backend: &str) -> Option<Arc<dyn BackendAdapter>> {
        self.adapters.get(backend).cloned()
    }

    pub fn enabled_names<'a>(&self, platforms: &'a [String]) -> Vec<&'a String> {
        platforms.iter().filter(|p| self.adapters.contains_key(*p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter;

    #[async_trait]
    impl BackendAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn search(&self, _query: &str, _limit: usize) -> Vec<Paper> {
            Vec::new()
        }
    }

    #[test]
    fn registry_looks_up_by_name() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter));
        assert!(registry.get("stub").is_some());
        assert!(registry.get("missing").is_none());
    }
}
