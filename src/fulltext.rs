//! The `FullTextFetcher` capability: best-effort extracted text for a DOI or
//! URL. Never raises to the caller; returns an empty string on total
//! failure. The headless-browser render strategy the spec describes as a
//! fallback is explicitly out of scope (browser automation is named an
//! external collaborator in spec.md §1) and is a documented no-op here.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait FullTextFetcher: Send + Sync {
    /// Return the best-effort extracted text for `target` (a DOI or URL),
    /// or `""` if nothing usable could be fetched.
    async fn fetch(&self, target: &str, min_words: usize) -> String;
}

/// Fetches via direct HTTP GET, extracting either HTML main-content text or
/// PDF text depending on the response's content type. Modeled on
/// `gscholar.rs::fetch_page_with_cookies`'s client construction.
pub struct HttpFullTextFetcher {
    client: Client,
}

impl Default for HttpFullTextFetcher {
    fn default() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .user_agent("paper-research-pipeline/0.1")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl HttpFullTextFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn resolve_url(target: &str) -> Option<String> {
        if target.starts_with("http://") || target.starts_with("https://") {
            Some(target.to_string())
        } else if !target.trim().is_empty() {
            Some(format!("https://doi.org/{}", target.trim()))
        } else {
            None
        }
    }
}

#[async_trait]
impl FullTextFetcher for HttpFullTextFetcher {
    async fn fetch(&self, target: &str, min_words: usize) -> String {
        let Some(url) = Self::resolve_url(target) else {
            return String::new();
        };

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(target = %target, error = %e, "full-text fetch failed");
                return String::new();
            }
        };

        if !response.status().is_success() {
            return String::new();
        }

        let is_pdf = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/pdf"))
            .unwrap_or(false)
            || url.ends_with(".pdf");

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(_) => return String::new(),
        };

        let text = if is_pdf {
            extract_pdf_text(&bytes)
        } else {
            let html = String::from_utf8_lossy(&bytes).to_string();
            extract_html_text(&html)
        };

        if text.split_whitespace().count() < min_words {
            warn!(
                target = %target,
                words = text.split_whitespace().count(),
                min_words,
                "full-text shorter than requested minimum, returning best effort"
            );
        }

        text
    }
}

/// Extract a rough main-content text from an HTML document: concatenate the
/// text of every `<p>` element, which is a reasonable proxy for body text
/// across most publisher landing pages.
fn extract_html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract UTF-8 text concatenated across PDF pages.
fn extract_pdf_text(bytes: &[u8]) -> String {
    pdf_extract::extract_text_from_mem(bytes).unwrap_or_default()
}

/// A fetcher that always returns empty text; used in tests and as a
/// fallback when full-text enrichment is disabled.
#[derive(Default)]
pub struct NullFullTextFetcher;

#[async_trait]
impl FullTextFetcher for NullFullTextFetcher {
    async fn fetch(&self, _target: &str, _min_words: usize) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paragraph_text() {
        let html = "<html><body><p>Hello</p><p>World</p></body></html>";
        let text = extract_html_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
    }

    #[test]
    fn resolve_url_prefixes_bare_doi() {
        assert_eq!(
            HttpFullTextFetcher::resolve_url("10.1/abc"),
            Some("https://doi.org/10.1/abc".to_string())
        );
        assert_eq!(
            HttpFullTextFetcher::resolve_url("https://example.com/paper"),
            Some("https://example.com/paper".to_string())
        );
        assert_eq!(HttpFullTextFetcher::resolve_url(""), None);
    }

    #[tokio::test]
    async fn null_fetcher_always_returns_empty() {
        let fetcher = NullFullTextFetcher;
        assert_eq!(fetcher.fetch("10.1/x", 200).await, "");
    }
}
