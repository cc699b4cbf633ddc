//! Query formulator (C5): turn the user's natural-language request into
//! `num_queries` backend-syntax-correct query strings per enabled backend,
//! via one [`StructuredLlm`] call per backend. Mirrors `llm_filter.rs`'s
//! "never raise, degrade to empty" boundary contract — a backend whose
//! formulation call fails simply gets no queries rather than aborting the
//! whole request.

use crate::llm::StructuredLlm;
use crate::prompts::query_formulation;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct QueriesResponse {
    #[serde(default)]
    queries: Vec<String>,
}

/// Ask the LLM for `num_queries` queries in `backend`'s wire syntax. Returns
/// an empty vector (never an error) if the call fails or the response
/// doesn't parse.
pub async fn formulate_queries(
    llm: &Arc<dyn StructuredLlm>,
    backend: &str,
    user_query: &str,
    num_queries: usize,
) -> Vec<String> {
    if num_queries == 0 {
        return Vec::new();
    }

    let system = query_formulation::system_prompt(backend);
    let user = query_formulation::user_prompt(user_query, num_queries);

    let value = match llm.process(&system, &user).await {
        Ok(v) => v,
        Err(e) => {
            warn!(backend, error = %e, "query formulation failed, skipping backend");
            return Vec::new();
        }
    };

    match serde_json::from_value::<QueriesResponse>(value) {
        Ok(parsed) => parsed.queries.into_iter().filter(|q| !q.trim().is_empty()).take(num_queries).collect(),
        Err(e) => {
            warn!(backend, error = %e, "query formulation response did not match schema");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StubLlm(Value);

    #[async_trait]
    impl StructuredLlm for StubLlm {
        async fn process(&self, _system: &str, _user: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl StructuredLlm for FailingLlm {
        async fn process(&self, _system: &str, _user: &str) -> Result<Value> {
            Err(crate::error::PipelineError::Llm("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn formulates_queries_from_valid_response() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm(json!({"queries": ["a", "b", "c"]})));
        let queries = formulate_queries(&llm, "openalex", "coffee and diabetes", 2).await;
        assert_eq!(queries, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn returns_empty_on_llm_failure() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(FailingLlm);
        let queries = formulate_queries(&llm, "openalex", "x", 3).await;
        assert!(queries.is_empty());
    }

    #[tokio::test]
    async fn returns_empty_on_malformed_response() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm(json!({"not_queries": []})));
        let queries = formulate_queries(&llm, "openalex", "x", 3).await;
        assert!(queries.is_empty());
    }
}
