//! CORE backend adapter. No teacher file covers CORE; grounded in the same
//! POST-JSON-body, typed-response and backoff shape as
//! [`super::scopus::ScopusAdapter`], fitted to CORE's `/v3/search/works`
//! scroll-style endpoint.

use super::retry::{with_backoff, Attempt};
use super::BackendAdapter;
use crate::config::BackendLimits;
use crate::model::Paper;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

const CORE_SEARCH_URL: &str = "https://api.core.ac.uk/v3/search/works";

pub struct CoreAdapter {
    client: Client,
    api_key: Option<String>,
    limits: BackendLimits,
    concurrency: Arc<Semaphore>,
}

impl CoreAdapter {
    pub fn new(api_key: Option<String>, limits: BackendLimits) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default();
        let concurrency = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        Self { client, api_key, limits, concurrency }
    }

    async fn run_search(&self, query: &str, limit: usize) -> Option<CoreResponse> {
        let Some(api_key) = self.api_key.clone() else {
            warn!("CORE adapter has no API key configured");
            return None;
        };
        let _permit = self.concurrency.acquire().await.ok()?;

        with_backoff(
            "core",
            self.limits.max_retries,
            self.limits.base_backoff(),
            self.limits.max_backoff(),
            |_attempt| {
                let client = self.client.clone();
                let api_key = api_key.clone();
                let query = query.to_string();
                async move {
                    let body = serde_json::json!({
                        "q": query,
                        "limit": (limit.max(1) * 2).min(100),
                        "scroll": true,
                        "sort": "relevance",
                    });
                    let response = match client
                        .post(CORE_SEARCH_URL)
                        .bearer_auth(&api_key)
                        .json(&body)
                        .send()
                        .await
                    {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "CORE request failed");
                            return Attempt::Retry;
                        }
                    };
                    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        return Attempt::RetryAfter(15);
                    }
                    if !response.status().is_success() {
                        warn!(status = %response.status(), "CORE non-success status");
                        return Attempt::Retry;
                    }
                    match response.json::<CoreResponse>().await {
                        Ok(parsed) => Attempt::Done(parsed),
                        Err(e) => {
                            warn!(error = %e, "CORE body did not parse");
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
impl BackendAdapter for CoreAdapter {
    fn name(&self) -> &'static str {
        "core"
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<Paper> {
        let Some(parsed) = self.run_search(query, limit).await else {
            return Vec::new();
        };

        let mut papers: Vec<Paper> = parsed.results.into_iter().filter_map(result_to_paper).collect();

        // CORE's relevance sort ignores citation count; re-sort and trim
        // here so downstream consumers see the highest-cited results first,
        // the way `openalex.rs` callers already expect.
        papers.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        papers.truncate(limit);
        papers
    }
}

fn result_to_paper(result: CoreResult) -> Option<Paper> {
    let authors = result.authors.unwrap_or_default().into_iter().map(|a| a.name).collect();
    let year = result.year_published;

    let mut paper = Paper::new(
        result.doi.unwrap_or_default(),
        result.title.unwrap_or_default(),
        authors,
        year,
        result.abstract_text,
        result.full_text,
        result.download_url,
        "core",
    )?;
    paper.citation_count = result.citation_count.unwrap_or(crate::model::UNKNOWN);
    Some(paper)
}

#[derive(Debug, Deserialize)]
struct CoreResponse {
    #[serde(default)]
    results: Vec<CoreResult>,
}

#[derive(Debug, Deserialize)]
struct CoreResult {
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "fullText")]
    full_text: Option<String>,
    doi: Option<String>,
    #[serde(rename = "yearPublished")]
    year_published: Option<i32>,
    #[serde(rename = "citationCount")]
    citation_count: Option<i32>,
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
    authors: Option<Vec<CoreAuthor>>,
}

#[derive(Debug, Deserialize)]
struct CoreAuthor {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_without_title_is_dropped() {
        let result = CoreResult {
            title: None,
            abstract_text: Some("abstract".into()),
            full_text: None,
            doi: None,
            year_published: Some(2021),
            citation_count: Some(3),
            download_url: None,
            authors: None,
        };
        assert!(result_to_paper(result).is_none());
    }

    #[test]
    fn result_with_title_and_abstract_is_kept() {
        let result = CoreResult {
            title: Some("A Title".into()),
            abstract_text: Some("abstract".into()),
            full_text: None,
            doi: Some("10.1/x".into()),
            year_published: Some(2021),
            citation_count: Some(3),
            download_url: None,
            authors: Some(vec![CoreAuthor { name: "Jane Doe".into() }]),
        };
        let paper = result_to_paper(result).unwrap();
        assert_eq!(paper.citation_count, 3);
        assert_eq!(paper.authors, vec!["Jane Doe".to_string()]);
    }
}
