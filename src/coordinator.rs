//! Search coordinator (C6): for each enabled backend, formulate queries and
//! fan them out concurrently through the matching adapter, inserting every
//! harvested paper into the shared [`RequestAnalysis`]. Generalizes
//! `unified.rs`'s per-source dispatch (one `if source == "..."` branch per
//! backend feeding one shared `enriched_list`) into a registry-driven loop
//! that does all backends concurrently instead of sequentially.

use crate::adapters::AdapterRegistry;
use crate::formulator::formulate_queries;
use crate::llm::StructuredLlm;
use crate::model::SharedAnalysis;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Run query formulation + search for every enabled backend concurrently,
/// writing results straight into `analysis`. Never raises; a backend with no
/// adapter registered, or whose formulation/search calls fail, simply
/// contributes nothing.
pub async fn run_search(
    analysis: &SharedAnalysis,
    registry: &AdapterRegistry,
    llm: &Arc<dyn StructuredLlm>,
) {
    let (user_query, num_queries, papers_per_query, platforms, timestamp) = {
        let guard = analysis.lock().await;
        (
            guard.query.as_vec().join(" "),
            guard.parameters.num_queries,
            guard.parameters.papers_per_query,
            guard.parameters.enabled_platforms.clone(),
            guard.timestamp.clone(),
        )
    };

    let backends: Vec<String> =
        platforms.into_iter().filter(|p| registry.get(p).is_some()).collect();

    if backends.is_empty() {
        warn!("no enabled backend has a registered adapter; search will return zero papers");
        return;
    }

    stream::iter(backends)
        .for_each_concurrent(None, |backend| {
            let analysis = analysis.clone();
            let llm = llm.clone();
            let user_query = user_query.clone();
            let timestamp = timestamp.clone();
            let adapter = registry.get(&backend);
            async move {
                let Some(adapter) = adapter else { return };
                let queries = formulate_queries(&llm, &backend, &user_query, num_queries).await;
                if queries.is_empty() {
                    warn!(backend = %backend, "query formulation produced no queries");
                    return;
                }

                for query_text in queries {
                    {
                        let mut guard = analysis.lock().await;
                        guard.add_query(query_text.clone(), backend.clone(), timestamp.clone());
                    }

                    let papers = adapter.search(&query_text, papers_per_query).await;
                    info!(backend = %backend, query = %query_text, found = papers.len(), "backend search complete");

                    let mut guard = analysis.lock().await;
                    for paper in papers {
                        guard.add_search_result(paper);
                    }
                }
            }
        })
        .await;

    let mut guard = analysis.lock().await;
    guard.apply_year_filter();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BackendAdapter;
    use crate::error::Result;
    use crate::model::{shared, Paper, PipelineParameters, QueryInput, RequestAnalysis};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StubAdapter;

    #[async_trait]
    impl BackendAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "openalex"
        }
        async fn search(&self, _query: &str, _limit: usize) -> Vec<Paper> {
            vec![Paper::new("10.1/x", "Paper One", vec!["A".into()], Some(2020), Some("abs".into()), None, None, "openalex").unwrap()]
        }
    }

    struct StubLlm;

    #[async_trait]
    impl StructuredLlm for StubLlm {
        async fn process(&self, _system: &str, _user: &str) -> Result<Value> {
            Ok(json!({"queries": ["q1"]}))
        }
    }

    #[tokio::test]
    async fn harvests_papers_from_enabled_backends() {
        let mut params = PipelineParameters::default();
        params.enabled_platforms = vec!["openalex".to_string()];
        params.num_queries = 1;
        params.papers_per_query = 5;

        let analysis = shared(RequestAnalysis::new(
            QueryInput::Single("test".to_string()),
            String::new(),
            params,
            None,
            None,
            "2026-01-01T00:00:00Z".to_string(),
        ));

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter));
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm);

        run_search(&analysis, &registry, &llm).await;

        let guard = analysis.lock().await;
        assert_eq!(guard.search_results.len(), 1);
        assert_eq!(guard.queries.len(), 1);
    }
}
