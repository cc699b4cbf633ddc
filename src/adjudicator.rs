//! Exclusion/extraction adjudicator (C7): for each harvested paper, ask the
//! LLM to fill in the merged exclusion+extraction schema, drop any paper
//! that trips an exclusion criterion, and attach the extraction fields to
//! the survivors. Generalizes `llm_filter.rs::filter_papers`'s
//! semaphore-gated concurrent-map-over-papers shape from a fixed
//! relevant/irrelevant/uncertain label into an arbitrary schema.

use crate::llm::StructuredLlm;
use crate::model::{Paper, RankedPaper};
use crate::prompts::exclusion_extraction::{build_user_prompt, SYSTEM_PROMPT};
use crate::schema::CompiledSchema;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

/// Run the merged schema against every paper concurrently (bounded by
/// `concurrency`), keeping only papers with no tripped exclusion criterion.
/// A paper whose adjudication call fails is kept unmodified (no evidence of
/// exclusion beats a false negative from a flaky call), matching
/// `llm_filter.rs`'s pattern of treating an adjudication failure as
/// "uncertain" rather than "irrelevant".
pub async fn adjudicate(
    llm: &Arc<dyn StructuredLlm>,
    papers: Vec<Paper>,
    exclusion_schema: Option<&CompiledSchema>,
    extraction_schema: Option<&CompiledSchema>,
    concurrency: usize,
) -> Vec<RankedPaper> {
    if exclusion_schema.is_none() && extraction_schema.is_none() {
        return papers.into_iter().map(|p| RankedPaper::new(p, 0.0)).collect();
    }

    let merged = CompiledSchema::merge(exclusion_schema, extraction_schema);
    if merged.is_empty() {
        return papers.into_iter().map(|p| RankedPaper::new(p, 0.0)).collect();
    }

    let exclusion_names: Vec<String> =
        exclusion_schema.map(|s| s.fields.iter().map(|f| f.name.clone()).collect()).unwrap_or_default();
    let extraction_names: Vec<String> =
        extraction_schema.map(|s| s.fields.iter().map(|f| f.name.clone()).collect()).unwrap_or_default();

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let merged = Arc::new(merged);
    let exclusion_names = Arc::new(exclusion_names);
    let extraction_names = Arc::new(extraction_names);

    stream::iter(papers)
        .map(|paper| {
            let semaphore = semaphore.clone();
            let llm = llm.clone();
            let merged = merged.clone();
            let exclusion_names = exclusion_names.clone();
            let extraction_names = extraction_names.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                adjudicate_one(&llm, paper, &merged, &exclusion_names, &extraction_names).await
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|r| async move { r })
        .collect()
        .await
}

async fn adjudicate_one(
    llm: &Arc<dyn StructuredLlm>,
    paper: Paper,
    merged: &CompiledSchema,
    exclusion_names: &[String],
    extraction_names: &[String],
) -> Option<RankedPaper> {
    let full_text = paper
        .full_text
        .as_deref()
        .or(paper.abstract_text.as_deref())
        .unwrap_or_default();
    let user_prompt = build_user_prompt(&paper.title, full_text, merged);

    let response = match llm.process(SYSTEM_PROMPT, &user_prompt).await {
        Ok(v) => v,
        Err(e) => {
            warn!(title = %paper.title, error = %e, "adjudication call failed, keeping paper unmodified");
            return Some(RankedPaper::new(paper, 0.0));
        }
    };

    let coerced = merged.coerce_object(&response);
    let mut ranked = RankedPaper::new(paper, 0.0);

    let mut excluded = false;
    for name in exclusion_names {
        let value = coerced.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
        if value {
            excluded = true;
        }
        ranked.exclusion_criteria_result.insert(name.clone(), value);
    }
    if excluded {
        return None;
    }

    for name in extraction_names {
        if let Some(value) = coerced.get(name) {
            ranked.extraction_result.insert(name.clone(), value.clone());
        }
    }

    Some(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::schema::{FieldDef, FieldKind};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    struct StubLlm(Value);

    #[async_trait]
    impl StructuredLlm for StubLlm {
        async fn process(&self, _system: &str, _user: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn sample_paper() -> Paper {
        Paper::new("10.1/x", "Title", vec!["A".into()], Some(2020), Some("abstract text".into()), None, None, "openalex").unwrap()
    }

    fn exclusion_schema() -> CompiledSchema {
        let mut m = IndexMap::new();
        m.insert(
            "is_review".to_string(),
            FieldDef { kind: FieldKind::Boolean, description: "true if a review article".to_string() },
        );
        CompiledSchema::compile(&m)
    }

    #[tokio::test]
    async fn excluded_paper_is_dropped() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm(json!({"is_review": true})));
        let results = adjudicate(&llm, vec![sample_paper()], Some(&exclusion_schema()), None, 4).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn surviving_paper_keeps_exclusion_result() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm(json!({"is_review": false})));
        let results = adjudicate(&llm, vec![sample_paper()], Some(&exclusion_schema()), None, 4).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].exclusion_criteria_result.get("is_review"), Some(&false));
    }

    #[tokio::test]
    async fn no_schema_keeps_every_paper_untouched() {
        let llm: Arc<dyn StructuredLlm> = Arc::new(StubLlm(json!({})));
        let results = adjudicate(&llm, vec![sample_paper()], None, None, 4).await;
        assert_eq!(results.len(), 1);
    }
}
