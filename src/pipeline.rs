//! Pipeline orchestrator (C9): wires query formulation, search, full-text
//! enrichment, adjudication and tournament ranking into one entry point
//! that never raises to the caller. Generalizes `unified.rs`'s "try each
//! source, merge into one list" orchestration and `main.rs::run_search_pipeline`'s
//! stage-by-stage driver into a component pipeline built around injected
//! trait-object collaborators instead of free functions.

use crate::adapters::AdapterRegistry;
use crate::adjudicator::adjudicate;
use crate::citation::CitationResolver;
use crate::coordinator::run_search;
use crate::fulltext::FullTextFetcher;
use crate::llm::StructuredLlm;
use crate::model::{shared, Paper, PipelineParameters, QueryInput, RankedPaper, RequestAnalysis};
use crate::ranker::rank;
use crate::schema::{CompiledSchema, FieldDef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// The external request shape: everything a caller supplies for one
/// analysis run.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub query: QueryInput,
    #[serde(default)]
    pub ranking_guidance: String,
    #[serde(default)]
    pub parameters: PipelineParameters,
    #[serde(default)]
    pub exclusion_schema: IndexMap<String, FieldDef>,
    #[serde(default)]
    pub data_extraction_schema: IndexMap<String, FieldDef>,
}

/// Minimum word count a paper's full text must clear before full-text
/// enrichment is skipped as unnecessary.
const ENRICHMENT_MIN_WORDS: usize = 200;

pub struct Pipeline {
    llm: Arc<dyn StructuredLlm>,
    fulltext: Arc<dyn FullTextFetcher>,
    citations: Arc<dyn CitationResolver>,
    adapters: AdapterRegistry,
    adjudication_concurrency: usize,
    ranking_group_concurrency: usize,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn StructuredLlm>,
        fulltext: Arc<dyn FullTextFetcher>,
        citations: Arc<dyn CitationResolver>,
        adapters: AdapterRegistry,
        adjudication_concurrency: usize,
        ranking_group_concurrency: usize,
    ) -> Self {
        Self {
            llm,
            fulltext,
            citations,
            adapters,
            adjudication_concurrency,
            ranking_group_concurrency,
        }
    }

    /// Run one end-to-end analysis. Never returns `Result`: every internal
    /// component degrades to an empty/default contribution on failure, and
    /// any such degradation is recorded under `analysis.metadata["warnings"]`
    /// rather than aborting the request.
    pub async fn analyze_request(&self, request: AnalyzeRequest, timestamp: String) -> RequestAnalysis {
        let exclusion_schema = non_empty_schema(&request.exclusion_schema);
        let extraction_schema = non_empty_schema(&request.data_extraction_schema);

        let mut analysis = RequestAnalysis::new(
            request.query.clone(),
            request.ranking_guidance.clone(),
            request.parameters.clone(),
            exclusion_schema.clone(),
            extraction_schema.clone(),
            timestamp.clone(),
        );

        let sub_queries = request.query.as_vec();
        let mut warnings: Vec<String> = Vec::new();
        let mut candidates: Vec<RankedPaper> = Vec::new();
        let mut seen_titles: std::collections::HashSet<String> = std::collections::HashSet::new();

        for sub_query in &sub_queries {
            let tmp = shared(RequestAnalysis::new(
                QueryInput::Single(sub_query.clone()),
                request.ranking_guidance.clone(),
                request.parameters.clone(),
                exclusion_schema.clone(),
                extraction_schema.clone(),
                timestamp.clone(),
            ));

            run_search(&tmp, &self.adapters, &self.llm).await;

            let (queries, papers) = {
                let mut guard = tmp.lock().await;
                (std::mem::take(&mut guard.queries), std::mem::take(&mut guard.search_results))
            };

            if papers.is_empty() {
                warnings.push(format!("sub-query {:?} returned zero papers", sub_query));
            }

            for q in queries {
                analysis.add_query(q.text, q.backend, q.timestamp);
            }
            for paper in &papers {
                analysis.add_search_result(paper.clone());
            }

            let enriched = self.enrich_full_text(papers).await;

            let survivors = adjudicate(
                &self.llm,
                enriched,
                exclusion_schema.as_ref(),
                extraction_schema.as_ref(),
                self.adjudication_concurrency,
            )
            .await;

            for ranked in survivors {
                if seen_titles.insert(ranked.title_key()) {
                    candidates.push(ranked);
                }
            }
        }

        info!(candidates = candidates.len(), "proceeding to tournament ranking");

        let ranked = rank(
            candidates,
            &sub_queries.join(" "),
            &request.ranking_guidance,
            &self.llm,
            &self.citations,
            request.parameters.num_papers_to_return,
            self.ranking_group_concurrency,
        )
        .await;

        for r in ranked {
            analysis.add_ranked_paper(r);
        }

        if !warnings.is_empty() {
            analysis
                .metadata
                .insert("warnings".to_string(), Value::Array(warnings.into_iter().map(Value::String).collect()));
        }

        analysis
    }

    async fn enrich_full_text(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let mut out = Vec::with_capacity(papers.len());
        for mut paper in papers {
            if paper.full_text_word_count() < ENRICHMENT_MIN_WORDS {
                let target = paper
                    .pdf_link
                    .clone()
                    .or_else(|| (!paper.doi.is_empty()).then(|| format!("https://doi.org/{}", paper.doi)));
                if let Some(target) = target {
                    let text = self.fulltext.fetch(&target, ENRICHMENT_MIN_WORDS).await;
                    if !text.is_empty() {
                        paper.full_text = Some(text);
                    } else {
                        warn!(title = %paper.title, "full-text enrichment produced nothing");
                    }
                }
            }
            out.push(paper);
        }
        out
    }
}

fn non_empty_schema(map: &IndexMap<String, FieldDef>) -> Option<CompiledSchema> {
    if map.is_empty() {
        None
    } else {
        Some(CompiledSchema::compile(map))
    }
}

/// The JSON report shape written to disk / returned over HTTP.
#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub query: &'a QueryInput,
    pub ranking_guidance: &'a str,
    pub ranked_papers: &'a [RankedPaper],
    pub metadata: &'a std::collections::HashMap<String, Value>,
    pub timestamp: &'a str,
}

impl<'a> From<&'a RequestAnalysis> for AnalysisReport<'a> {
    fn from(analysis: &'a RequestAnalysis) -> Self {
        Self {
            query: &analysis.query,
            ranking_guidance: &analysis.ranking_guidance,
            ranked_papers: &analysis.ranked_papers,
            metadata: &analysis.metadata,
            timestamp: &analysis.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BackendAdapter;
    use crate::citation::NullCitationResolver;
    use crate::error::Result;
    use crate::fulltext::NullFullTextFetcher;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubAdapter;

    #[async_trait]
    impl BackendAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "openalex"
        }
        async fn search(&self, _query: &str, _limit: usize) -> Vec<Paper> {
            vec![Paper::new(
                "10.1/x",
                "A Sufficiently Long Paper Title",
                vec!["A".into()],
                Some(2021),
                Some("abstract text".into()),
                Some("word ".repeat(250)),
                None,
                "openalex",
            )
            .unwrap()]
        }
    }

    struct StubLlm;

    #[async_trait]
    impl StructuredLlm for StubLlm {
        async fn process(&self, system: &str, _user: &str) -> Result<Value> {
            if system.contains("generate search queries") {
                Ok(json!({"queries": ["q1"]}))
            } else if system.contains("rank a small group") {
                Ok(json!({"rankings": [{"paper_id": "paper_0", "rank": 1, "explanation": "ok"}]}))
            } else if system.contains("adjudicator") {
                Ok(json!({}))
            } else {
                Ok(json!({"analysis": "solid paper", "relevant_quotes": ["a quote"]}))
            }
        }
    }

    #[tokio::test]
    async fn end_to_end_run_returns_a_ranked_paper() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter));

        let pipeline = Pipeline::new(
            Arc::new(StubLlm),
            Arc::new(NullFullTextFetcher::default()),
            Arc::new(NullCitationResolver),
            registry,
            4,
            4,
        );

        let mut parameters = PipelineParameters::default();
        parameters.enabled_platforms = vec!["openalex".to_string()];
        parameters.num_queries = 1;
        parameters.papers_per_query = 3;
        parameters.num_papers_to_return = 1;

        let request = AnalyzeRequest {
            query: QueryInput::Single("graph neural networks".to_string()),
            ranking_guidance: String::new(),
            parameters,
            exclusion_schema: IndexMap::new(),
            data_extraction_schema: IndexMap::new(),
        };

        let analysis = pipeline.analyze_request(request, "2026-01-01T00:00:00Z".to_string()).await;
        assert_eq!(analysis.ranked_papers.len(), 1);
        assert_eq!(analysis.ranked_papers[0].analysis, "solid paper");
    }
}
