//! Semantic Scholar backend adapter. Generalizes `semanticscholar.rs`'s
//! batch-by-DOI lookup into a search-by-query adapter: same typed-response
//! shapes (`externalIds`/`openAccessPdf`/`isOpenAccess`), same optional
//! `x-api-key` header for a higher rate limit, offset/next pagination
//! capped at Semantic Scholar's 1000-result search window.

use super::retry::{with_backoff, Attempt};
use super::BackendAdapter;
use crate::config::BackendLimits;
use crate::model::Paper;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

const SS_SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const MAX_OFFSET: usize = 1000;
const FIELDS: &str =
    "title,abstract,year,externalIds,citationCount,authors,isOpenAccess,openAccessPdf";

pub struct SemanticScholarAdapter {
    client: Client,
    api_key: Option<String>,
    limits: BackendLimits,
    search_semaphore: Arc<Semaphore>,
    pdf_semaphore: Arc<Semaphore>,
}

impl SemanticScholarAdapter {
    pub fn new(api_key: Option<String>, limits: BackendLimits) -> Self {
        let client = Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default();
        let search_semaphore = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        Self { client, api_key, limits, search_semaphore, pdf_semaphore: Arc::new(Semaphore::new(8)) }
    }

    async fn fetch_page(&self, query: &str, offset: usize, limit: usize) -> Option<SsSearchResponse> {
        let _permit = self.search_semaphore.acquire().await.ok()?;
        let api_key = self.api_key.clone();
        with_backoff(
            "semantic_scholar",
            self.limits.max_retries,
            self.limits.base_backoff(),
            self.limits.max_backoff(),
            |_attempt| {
                let client = self.client.clone();
                let api_key = api_key.clone();
                let query = query.to_string();
                async move {
                    let mut req = client.get(SS_SEARCH_URL).query(&[
                        ("query", query.as_str()),
                        ("offset", &offset.to_string()),
                        ("limit", &limit.to_string()),
                        ("fields", FIELDS),
                    ]);
                    if let Some(key) = &api_key {
                        req = req.header("x-api-key", key);
                    }
                    let response = match req.send().await {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "Semantic Scholar request failed");
                            return Attempt::Retry;
                        }
                    };
                    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        return Attempt::RetryAfter(10);
                    }
                    if !response.status().is_success() {
                        warn!(status = %response.status(), "Semantic Scholar non-success status");
                        return Attempt::Retry;
                    }
                    match response.json::<SsSearchResponse>().await {
                        Ok(parsed) => Attempt::Done(parsed),
                        Err(e) => {
                            warn!(error = %e, "Semantic Scholar body did not parse");
                            Attempt::Retry
                        }
                    }
                }
            },
        )
        .await
    }

    async fn fetch_full_text(&self, pdf_url: &str) -> Option<String> {
        let _permit = self.pdf_semaphore.acquire().await.ok()?;
        let bytes = self.client.get(pdf_url).send().await.ok()?.bytes().await.ok()?;
        pdf_extract::extract_text_from_mem(&bytes).ok()
    }
}

#[async_trait]
impl BackendAdapter for SemanticScholarAdapter {
    fn name(&self) -> &'static str {
        "semantic_scholar"
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<Paper> {
        let mut papers_data = Vec::new();
        let mut offset = 0usize;

        while papers_data.len() < limit && offset < MAX_OFFSET {
            let page_limit = (limit - papers_data.len()).min(100);
            let Some(page) = self.fetch_page(query, offset, page_limit).await else {
                break;
            };
            let got = page.data.len();
            papers_data.extend(page.data);
            match page.next {
                Some(next) if got > 0 => offset = next,
                _ => break,
            }
        }

        let adapter = self;
        stream::iter(papers_data.into_iter().take(limit))
            .map(|p| async move {
                let pdf_url = p.open_access_pdf.as_ref().and_then(|o| o.url.clone());
                let full_text = match &pdf_url {
                    Some(url) => adapter.fetch_full_text(url).await,
                    None => None,
                };
                paper_to_paper(p, full_text)
            })
            .buffer_unordered(8)
            .filter_map(|p| async move { p })
            .collect()
            .await
    }
}

fn paper_to_paper(paper: SsPaper, full_text: Option<String>) -> Option<Paper> {
    let doi = paper.external_ids.and_then(|ids| ids.doi).unwrap_or_default();
    let authors = paper.authors.unwrap_or_default().into_iter().map(|a| a.name).collect();
    let pdf_url = paper.open_access_pdf.and_then(|o| o.url);

    let mut result = Paper::new(
        doi,
        paper.title.unwrap_or_default(),
        authors,
        paper.year,
        paper.abstract_text,
        full_text,
        pdf_url,
        "semantic_scholar",
    )?;
    result.citation_count = paper.citation_count.unwrap_or(crate::model::UNKNOWN);
    Some(result)
}

#[derive(Debug, Deserialize)]
struct SsSearchResponse {
    #[serde(default)]
    data: Vec<SsPaper>,
    next: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SsPaper {
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    #[serde(rename = "citationCount")]
    citation_count: Option<i32>,
    #[serde(rename = "externalIds")]
    external_ids: Option<SsExternalIds>,
    authors: Option<Vec<SsAuthor>>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<SsOpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct SsExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SsAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SsOpenAccessPdf {
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_without_title_is_dropped() {
        let paper = SsPaper {
            title: None,
            abstract_text: Some("abs".into()),
            year: Some(2020),
            citation_count: Some(1),
            external_ids: None,
            authors: None,
            open_access_pdf: None,
        };
        assert!(paper_to_paper(paper, None).is_none());
    }

    #[test]
    fn paper_with_doi_is_normalized() {
        let paper = SsPaper {
            title: Some("T".into()),
            abstract_text: Some("abs".into()),
            year: Some(2020),
            citation_count: Some(5),
            external_ids: Some(SsExternalIds { doi: Some("https://doi.org/10.1/x".into()) }),
            authors: Some(vec![SsAuthor { name: "Jane".into() }]),
            open_access_pdf: None,
        };
        let result = paper_to_paper(paper, None).unwrap();
        assert_eq!(result.doi, "10.1/x");
        assert_eq!(result.citation_count, 5);
    }
}
