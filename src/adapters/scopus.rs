//! Scopus backend adapter. No teacher file covers Scopus; grounded in the
//! request/backoff shape of `openalex.rs::fetch_page` and in the POST +
//! typed-response pattern used for `crossref.rs`'s Crossref lookups, applied
//! to Scopus's Advanced Search API (`POST /content/search/scopus`).

use super::retry::{with_backoff, Attempt};
use super::BackendAdapter;
use crate::config::BackendLimits;
use crate::error::PipelineError;
use crate::model::Paper;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

const SCOPUS_SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

pub struct ScopusAdapter {
    client: Client,
    api_key: Option<String>,
    limits: BackendLimits,
    concurrency: Arc<Semaphore>,
}

impl ScopusAdapter {
    pub fn new(api_key: Option<String>, limits: BackendLimits) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default();
        let concurrency = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        Self { client, api_key, limits, concurrency }
    }

    async fn run_search(&self, query: &str, limit: usize) -> Option<ScopusResponse> {
        let Some(api_key) = self.api_key.clone() else {
            warn!("Scopus adapter has no API key configured");
            return None;
        };
        let _permit = self.concurrency.acquire().await.ok()?;

        with_backoff(
            "scopus",
            self.limits.max_retries,
            self.limits.base_backoff(),
            self.limits.max_backoff(),
            |_attempt| {
                let client = self.client.clone();
                let api_key = api_key.clone();
                let query = query.to_string();
                async move {
                    let body = serde_json::json!({
                        "query": query,
                        "count": limit.min(200),
                        "view": "COMPLETE",
                        "sort": "-citedby-count",
                    });
                    let response = match client
                        .post(SCOPUS_SEARCH_URL)
                        .header("X-ELS-APIKey", &api_key)
                        .json(&body)
                        .send()
                        .await
                    {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "Scopus request failed");
                            return Attempt::Retry;
                        }
                    };
                    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        return Attempt::RetryAfter(20);
                    }
                    if !response.status().is_success() {
                        warn!(status = %response.status(), "Scopus non-success status");
                        return Attempt::Retry;
                    }
                    match response.json::<ScopusResponse>().await {
                        Ok(parsed) => Attempt::Done(parsed),
                        Err(e) => {
                            warn!(error = %e, "Scopus body did not parse");
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
impl BackendAdapter for ScopusAdapter {
    fn name(&self) -> &'static str {
        "scopus"
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<Paper> {
        if let Err(e) = validate_scopus_query(query) {
            warn!(query, error = %e, "rejecting malformed Scopus query before it reaches the API");
            return Vec::new();
        }

        let Some(parsed) = self.run_search(query, limit).await else {
            return Vec::new();
        };

        parsed
            .search_results
            .entries
            .into_iter()
            .take(limit)
            .filter_map(entry_to_paper)
            .collect()
    }
}

/// Reject the malformed Scopus Advanced Search patterns that the API itself
/// 400s on: adjacent proximity operators (`W/n` or `PRE/n` with nothing
/// between them and the next operator), `AND NOT AND` (double negation
/// chains Scopus refuses to parse), and bare unquoted wildcards (`*` with no
/// surrounding term, which Scopus treats as a syntax error rather than a
/// match-everything wildcard).
fn proximity_adjacent_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)(W/\d+|PRE/\d+)\s*(W/\d+|PRE/\d+)").unwrap())
}

fn bare_wildcard_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(^|\s)\*(\s|$)").unwrap())
}

pub fn validate_scopus_query(query: &str) -> crate::error::Result<()> {
    if proximity_adjacent_pattern().is_match(query) {
        return Err(PipelineError::Validation(
            "adjacent proximity operators are not valid Scopus syntax".to_string(),
        ));
    }

    if query.to_uppercase().contains("AND NOT AND") {
        return Err(PipelineError::Validation(
            "\"AND NOT AND\" is not valid Scopus syntax".to_string(),
        ));
    }

    if bare_wildcard_pattern().is_match(query) {
        return Err(PipelineError::Validation(
            "a bare wildcard with no surrounding term is not valid Scopus syntax".to_string(),
        ));
    }

    Ok(())
}

fn entry_to_paper(entry: ScopusEntry) -> Option<Paper> {
    let authors = entry.authors.unwrap_or_default().into_iter().map(|a| a.name).collect();

    let year = entry
        .cover_date
        .as_deref()
        .and_then(|d| d.get(0..4))
        .and_then(|y| y.parse().ok());

    let mut paper = Paper::new(
        entry.doi.unwrap_or_default(),
        entry.title.unwrap_or_default(),
        authors,
        year,
        entry.description,
        None,
        None,
        "scopus",
    )?;
    paper.citation_count = entry
        .citedby_count
        .and_then(|c| c.parse().ok())
        .unwrap_or(crate::model::UNKNOWN);
    Some(paper)
}

#[derive(Debug, Deserialize)]
struct ScopusResponse {
    #[serde(rename = "search-results")]
    search_results: ScopusSearchResults,
}

#[derive(Debug, Deserialize)]
struct ScopusSearchResults {
    #[serde(default, rename = "entry")]
    entries: Vec<ScopusEntry>,
}

#[derive(Debug, Deserialize)]
struct ScopusEntry {
    #[serde(rename = "dc:title")]
    title: Option<String>,
    #[serde(rename = "prism:doi")]
    doi: Option<String>,
    #[serde(rename = "dc:description")]
    description: Option<String>,
    #[serde(rename = "prism:coverDate")]
    cover_date: Option<String>,
    #[serde(rename = "citedby-count")]
    citedby_count: Option<String>,
    #[serde(rename = "author", default)]
    authors: Option<Vec<ScopusAuthor>>,
}

#[derive(Debug, Deserialize)]
struct ScopusAuthor {
    #[serde(rename = "authname", default)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_adjacent_proximity_operators() {
        assert!(validate_scopus_query("TITLE-ABS-KEY(x W/5 PRE/2 y)").is_err());
    }

    #[test]
    fn rejects_and_not_and() {
        assert!(validate_scopus_query("TITLE(a) AND NOT AND TITLE(b)").is_err());
    }

    #[test]
    fn rejects_bare_wildcard() {
        assert!(validate_scopus_query("TITLE-ABS-KEY(a) AND * ").is_err());
    }

    #[test]
    fn accepts_well_formed_query() {
        assert!(validate_scopus_query("TITLE-ABS-KEY(\"deep learning\" W/5 diagnosis)").is_ok());
    }
}
