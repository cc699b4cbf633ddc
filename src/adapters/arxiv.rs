//! arXiv backend adapter. Atom-feed parsing follows the event-loop shape
//! used for arXiv's feed in the broader pack (title/author/summary/link/
//! category fields tracked via a `current_field` cursor), adapted to this
//! crate's error/backoff conventions. Full text is harvested by downloading
//! the entry's own PDF link and running it through the same `pdf-extract`
//! path [`crate::fulltext::HttpFullTextFetcher`] uses. Every network call,
//! feed or PDF, passes through the same rate gate and concurrency permit.

use super::retry::{with_backoff, Attempt};
use super::BackendAdapter;
use crate::config::BackendLimits;
use crate::model::Paper;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::str;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

const ARXIV_API_BASE: &str = "http://export.arxiv.org/api/query";
/// arXiv's usage policy asks for no more than one request every three
/// seconds from a single client.
const MIN_INTERVAL: Duration = Duration::from_millis(3000);

pub struct ArxivAdapter {
    client: reqwest::Client,
    limits: BackendLimits,
    last_request: Mutex<Option<Instant>>,
    concurrency: Arc<Semaphore>,
}

impl ArxivAdapter {
    pub fn new(limits: BackendLimits) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("paper-research-pipeline/0.1")
            .build()
            .unwrap_or_default();
        let concurrency = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        Self { client, limits, last_request: Mutex::new(None), concurrency }
    }

    async fn wait_for_rate_gate(&self) {
        let wait = {
            let mut guard = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let wait = guard
                .map(|last| MIN_INTERVAL.saturating_sub(now.duration_since(last)))
                .unwrap_or(Duration::ZERO);
            *guard = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_feed(&self, query: &str, limit: usize) -> Option<String> {
        let _permit = self.concurrency.acquire().await.ok()?;
        self.wait_for_rate_gate().await;

        let url = format!(
            "{base}?search_query=all:{q}&start=0&max_results={limit}&sortBy=relevance&sortOrder=descending",
            base = ARXIV_API_BASE,
            q = urlencoding::encode(query),
            limit = limit,
        );

        with_backoff(
            "arxiv",
            self.limits.max_retries,
            self.limits.base_backoff(),
            self.limits.max_backoff(),
            |_attempt| {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    match client.get(&url).send().await {
                        Ok(response) if response.status().is_success() => match response.text().await {
                            Ok(body) => Attempt::Done(body),
                            Err(e) => {
                                warn!(error = %e, "arXiv body read failed");
                                Attempt::Retry
                            }
                        },
                        Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                            Attempt::RetryAfter(5)
                        }
                        Ok(response) => {
                            warn!(status = %response.status(), "arXiv non-success status");
                            Attempt::Retry
                        }
                        Err(e) => {
                            warn!(error = %e, "arXiv request failed");
                            Attempt::Retry
                        }
                    }
                }
            },
        )
        .await
    }

    async fn fetch_full_text(&self, pdf_url: &str) -> Option<String> {
        let _permit = self.concurrency.acquire().await.ok()?;
        self.wait_for_rate_gate().await;
        let bytes = self.client.get(pdf_url).send().await.ok()?.bytes().await.ok()?;
        pdf_extract::extract_text_from_mem(&bytes).ok()
    }
}

#[async_trait]
impl BackendAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<Paper> {
        let Some(feed) = self.fetch_feed(query, limit).await else {
            return Vec::new();
        };

        let entries = match parse_atom_feed(&feed) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "arXiv feed did not parse");
                return Vec::new();
            }
        };

        let mut papers = Vec::with_capacity(entries.len());
        for entry in entries.into_iter().take(limit) {
            let full_text = match &entry.pdf_url {
                Some(pdf) => self.fetch_full_text(pdf).await,
                None => None,
            };
            if let Some(paper) = entry_to_paper(entry, full_text) {
                papers.push(paper);
            }
        }
        papers
    }
}

#[derive(Debug, Default)]
struct ArxivEntry {
    title: String,
    authors: Vec<String>,
    summary: String,
    pdf_url: Option<String>,
    published: Option<String>,
}

fn parse_atom_feed(xml: &str) -> Result<Vec<ArxivEntry>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut field: Option<&str> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => current = Some(ArxivEntry::default()),
                b"title" if current.is_some() => field = Some("title"),
                b"name" if current.is_some() => field = Some("author"),
                b"summary" if current.is_some() => field = Some("summary"),
                b"published" if current.is_some() => field = Some("published"),
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(entry) = current.as_mut() {
                        let mut title_attr = None;
                        let mut href = None;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"title" => title_attr = str::from_utf8(&attr.value).ok().map(String::from),
                                b"href" => href = str::from_utf8(&attr.value).ok().map(String::from),
                                _ => {}
                            }
                        }
                        if title_attr.as_deref() == Some("pdf") {
                            entry.pdf_url = href;
                        }
                    }
                }
            }
            Event::Text(e) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = e.unescape().unwrap_or_default().into_owned();
                    match f {
                        "title" => entry.title = text,
                        "author" => entry.authors.push(text),
                        "summary" => entry.summary = text,
                        "published" => entry.published = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn entry_to_paper(entry: ArxivEntry, full_text: Option<String>) -> Option<Paper> {
    let year = entry.published.as_deref().and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok());
    Paper::new(
        String::new(),
        entry.title,
        entry.authors,
        year,
        Some(entry.summary),
        full_text,
        entry.pdf_url,
        "arxiv",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>Graph Neural Networks for Molecules</title>
    <summary>We study graph neural networks.</summary>
    <published>2021-05-01T00:00:00Z</published>
    <author><name>Jane Doe</name></author>
    <author><name>John Smith</name></author>
    <link title="pdf" href="http://arxiv.org/pdf/2105.00001" rel="related"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_title_authors_and_pdf_link() {
        let entries = parse_atom_feed(SAMPLE_FEED).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.title, "Graph Neural Networks for Molecules");
        assert_eq!(entry.authors, vec!["Jane Doe", "John Smith"]);
        assert_eq!(entry.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2105.00001"));
        assert_eq!(entry.published.as_deref(), Some("2021-05-01T00:00:00Z"));
    }

    #[test]
    fn entry_without_summary_is_dropped() {
        let entry = ArxivEntry {
            title: "Title".into(),
            authors: vec![],
            summary: String::new(),
            pdf_url: None,
            published: None,
        };
        assert!(entry_to_paper(entry, None).is_none());
    }
}
