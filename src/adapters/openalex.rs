//! OpenAlex backend adapter. Generalizes `openalex.rs::query` from a
//! fixed-page scraper returning `OpenAlexResult` rows into a
//! [`BackendAdapter`] returning [`Paper`]s, keeping the same URL shape,
//! concurrent-page fetch and abstract-inverted-index reconstruction. The
//! formulated query is itself a fully formed `/works` URL; anything whose
//! path doesn't start with `/works` is rejected before it reaches the
//! network, and `sort`/`per-page`/`mailto`/`select` are filled in when the
//! formulated URL omits them, over-fetching `2x` the requested limit before
//! trimming.

use super::retry::{with_backoff, Attempt};
use super::BackendAdapter;
use crate::config::BackendLimits;
use crate::model::Paper;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const OPENALEX_API_BASE: &str = "https://api.openalex.org";
const PER_PAGE: usize = 200;
const POLITE_EMAIL: &str = "paper-research-pipeline@example.com";
const SELECT_FIELDS: &str = "id,title,display_name,publication_year,doi,cited_by_count,\
abstract_inverted_index,authorships,primary_location,best_oa_location,open_access";

pub struct OpenAlexAdapter {
    client: Client,
    limits: BackendLimits,
    concurrency: Arc<Semaphore>,
}

impl OpenAlexAdapter {
    pub fn new(limits: BackendLimits) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("paper-research-pipeline/0.1 (mailto:{})", POLITE_EMAIL))
            .build()
            .unwrap_or_default();
        let concurrency = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        Self { client, limits, concurrency }
    }

    async fn fetch_page(&self, url: &str) -> Option<OpenAlexResponse> {
        let _permit = self.concurrency.acquire().await.ok()?;
        with_backoff(
            "openalex",
            self.limits.max_retries,
            self.limits.base_backoff(),
            self.limits.max_backoff(),
            |_attempt| {
                let url = url.to_string();
                let client = self.client.clone();
                async move {
                    let response = match client.get(&url).send().await {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "OpenAlex request failed");
                            return Attempt::Retry;
                        }
                    };
                    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        return Attempt::RetryAfter(10);
                    }
                    if !response.status().is_success() {
                        warn!(status = %response.status(), "OpenAlex non-success status");
                        return Attempt::Retry;
                    }
                    match response.json::<OpenAlexResponse>().await {
                        Ok(parsed) => Attempt::Done(parsed),
                        Err(e) => {
                            warn!(error = %e, "OpenAlex body did not parse");
                            Attempt::Retry
                        }
                    }
                }
            },
        )
        .await
    }
}

#[async_trait]
impl BackendAdapter for OpenAlexAdapter {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<Paper> {
        // The query formulator produces a fully formed OpenAlex `/works` URL
        // (see `prompts::query_formulation`'s openalex cheat sheet); only the
        // `/works` path is trusted, anything else is rejected before it ever
        // reaches the network.
        let mut url = match reqwest::Url::parse(query.trim()) {
            Ok(u) => u,
            Err(e) => {
                warn!(query = %query, error = %e, "OpenAlex query did not parse as a URL, rejecting");
                return Vec::new();
            }
        };
        if !url.path().starts_with("/works") {
            warn!(path = %url.path(), "OpenAlex query URL path must start with /works, rejecting");
            return Vec::new();
        }

        let fetch_limit = PER_PAGE.min((limit.max(1)) * 2);
        let has_param = |name: &str| url.query_pairs().any(|(k, _)| k == name);
        let needs_sort = !has_param("sort");
        let needs_per_page = !has_param("per-page");
        let needs_mailto = !has_param("mailto");
        let needs_select = !has_param("select");
        {
            let mut pairs = url.query_pairs_mut();
            if needs_per_page {
                pairs.append_pair("per-page", &fetch_limit.to_string());
            }
            if needs_mailto {
                pairs.append_pair("mailto", POLITE_EMAIL);
            }
            if needs_sort {
                pairs.append_pair("sort", "relevance_score:desc");
            }
            if needs_select {
                pairs.append_pair("select", SELECT_FIELDS);
            }
        }
        debug!(url = %url, "OpenAlex search");

        let Some(parsed) = self.fetch_page(url.as_str()).await else {
            return Vec::new();
        };

        parsed
            .results
            .into_iter()
            .take(limit)
            .filter_map(|work| work_to_paper(work))
            .collect()
    }
}

fn work_to_paper(work: OpenAlexWork) -> Option<Paper> {
    let title = work.display_name.or(work.title).unwrap_or_default();
    let doi = work.doi.unwrap_or_default();
    let abstract_text = work.abstract_inverted_index.map(|idx| reconstruct_abstract(&idx));
    let authors = work
        .authorships
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| a.author)
        .filter_map(|a| a.display_name)
        .collect();

    let mut paper = Paper::new(
        doi,
        title,
        authors,
        work.publication_year,
        abstract_text,
        None,
        work.best_oa_location
            .as_ref()
            .and_then(|l| l.pdf_url.clone())
            .or_else(|| work.primary_location.as_ref().and_then(|l| l.pdf_url.clone())),
        "openalex",
    )?;

    paper.citation_count = work.cited_by_count.unwrap_or(crate::model::UNKNOWN);
    if let Some(id) = work.id {
        paper.id = Some(id);
    }
    if let Some(oa) = work.open_access {
        paper
            .metadata
            .insert("is_oa".to_string(), Value::Bool(oa.is_oa.unwrap_or(false)));
    }
    Some(paper)
}

fn reconstruct_abstract(inverted_index: &Value) -> String {
    let Some(map) = inverted_index.as_object() else {
        return String::new();
    };
    let mut positions: Vec<(usize, &str)> = Vec::new();
    for (word, idxs) in map {
        if let Some(arr) = idxs.as_array() {
            for idx in arr {
                if let Some(pos) = idx.as_u64() {
                    positions.push((pos as usize, word.as_str()));
                }
            }
        }
    }
    positions.sort_by_key(|(pos, _)| *pos);
    positions.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    cited_by_count: Option<i32>,
    #[serde(rename = "abstract_inverted_index")]
    abstract_inverted_index: Option<Value>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
    primary_location: Option<OpenAlexLocation>,
    best_oa_location: Option<OpenAlexLocation>,
    open_access: Option<OpenAlexOpenAccess>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexOpenAccess {
    is_oa: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn works_path_is_accepted() {
        let url = reqwest::Url::parse("https://api.openalex.org/works?search=x").unwrap();
        assert!(url.path().starts_with("/works"));
    }

    #[test]
    fn non_works_path_is_rejected() {
        let url = reqwest::Url::parse("https://api.openalex.org/authors?search=x").unwrap();
        assert!(!url.path().starts_with("/works"));
    }

    #[test]
    fn reconstructs_abstract_in_word_order() {
        let idx = serde_json::json!({"Deep": [0], "learning": [1], "works": [2]});
        assert_eq!(reconstruct_abstract(&idx), "Deep learning works");
    }

    #[test]
    fn work_without_title_is_dropped() {
        let work = OpenAlexWork {
            id: None,
            title: None,
            display_name: None,
            publication_year: Some(2020),
            doi: None,
            cited_by_count: None,
            abstract_inverted_index: Some(serde_json::json!({"a": [0]})),
            authorships: None,
            primary_location: None,
            best_oa_location: None,
            open_access: None,
        };
        assert!(work_to_paper(work).is_none());
    }
}
