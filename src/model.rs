//! Paper model, ranked-paper extension and the request-analysis aggregate.
//!
//! `Paper` is the atom the rest of the pipeline passes around. Construction
//! is funneled through [`Paper::new`] so the title/abstract-or-full_text
//! invariant can never be bypassed, the same way the backend adapters only
//! push a record onto their result vector after checking `!title.is_empty()`.

use crate::schema::CompiledSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Lower bound of a plausible publication year.
pub const MIN_YEAR: i32 = 1900;
/// Upper bound of a plausible publication year.
pub const MAX_YEAR: i32 = 2100;
/// Sentinel for an unknown year or citation count.
pub const UNKNOWN: i32 = -1;

/// A single candidate paper harvested from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: Option<String>,
    pub doi: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub full_text: Option<String>,
    pub pdf_link: Option<String>,
    pub source: String,
    pub bibtex: String,
    pub citation_count: i32,
    pub metadata: HashMap<String, Value>,
}

impl Paper {
    /// Build a new paper, normalizing the DOI/year/authors and enforcing the
    /// Paper invariant (non-empty title AND (abstract OR full_text)).
    /// Returns `None` rather than panicking when the invariant can't be met,
    /// mirroring the `if !result.title.is_empty()` guard backend adapters
    /// already apply to raw parsed records.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doi: impl Into<String>,
        title: impl Into<String>,
        authors: Vec<String>,
        year: Option<i32>,
        abstract_text: Option<String>,
        full_text: Option<String>,
        pdf_link: Option<String>,
        source: impl Into<String>,
    ) -> Option<Self> {
        let title = title.into().trim().to_string();
        let abstract_text = abstract_text.filter(|s| !s.trim().is_empty());
        let full_text = full_text.filter(|s| !s.trim().is_empty());

        if title.is_empty() || (abstract_text.is_none() && full_text.is_none()) {
            return None;
        }

        let authors = if authors.is_empty() {
            vec!["Unknown Author".to_string()]
        } else {
            authors
        };

        Some(Self {
            id: None,
            doi: normalize_doi(&doi.into()),
            title,
            authors,
            year: year.map(clamp_year).unwrap_or(UNKNOWN),
            abstract_text,
            full_text,
            pdf_link,
            source: source.into(),
            bibtex: String::new(),
            citation_count: UNKNOWN,
            metadata: HashMap::new(),
        })
    }

    /// Satisfies the Paper invariant independently of how the value was
    /// constructed (used by callers that deserialize papers, e.g. tests).
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
            && (self
                .abstract_text
                .as_ref()
                .is_some_and(|s| !s.trim().is_empty())
                || self.full_text.as_ref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Normalized title used as the dedup key: lowercased, whitespace-trimmed
    /// and collapsed.
    pub fn title_key(&self) -> String {
        normalize_title(&self.title)
    }

    /// Word count of `full_text`, tokenized by whitespace. Used by the
    /// ranker's pre-filter.
    pub fn full_text_word_count(&self) -> usize {
        self.full_text
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}

/// Normalize a DOI: strip a leading doi.org scheme prefix and trim whitespace.
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim();
    trimmed
        .strip_prefix("https://doi.org/")
        .or_else(|| trimmed.strip_prefix("http://doi.org/"))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Normalize a title for dedup comparison: lowercase, trim, collapse
/// interior whitespace runs to a single space.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Clamp a year to `[MIN_YEAR, MAX_YEAR]`, else the `UNKNOWN` sentinel.
pub fn clamp_year(year: i32) -> i32 {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        year
    } else {
        UNKNOWN
    }
}

/// Parse a year out of a loosely formatted string (e.g. `"2021-05-01"` or
/// `"2021"`), returning the `UNKNOWN` sentinel when it can't be parsed or is
/// out of range.
pub fn parse_year(raw: &str) -> i32 {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<i32>()
        .map(clamp_year)
        .unwrap_or(UNKNOWN)
}

/// A `Paper` enriched with the ranker's verdict: relevance score, prose
/// analysis, supporting quotes, and the exclusion/extraction schema results
/// recorded for it by the adjudicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedPaper {
    #[serde(flatten)]
    pub paper: Paper,
    pub relevance_score: f64,
    pub analysis: String,
    pub relevant_quotes: Vec<String>,
    pub exclusion_criteria_result: HashMap<String, bool>,
    pub extraction_result: HashMap<String, Value>,
}

impl RankedPaper {
    pub fn new(paper: Paper, relevance_score: f64) -> Self {
        Self {
            paper,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            analysis: String::new(),
            relevant_quotes: Vec::new(),
            exclusion_criteria_result: HashMap::new(),
            extraction_result: HashMap::new(),
        }
    }

    pub fn title_key(&self) -> String {
        self.paper.title_key()
    }
}

/// A (query text, backend tag, timestamp) triple; insertion order within the
/// analysis is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub backend: String,
    pub timestamp: String,
}

/// Either a single query string or a sequence of them (multi-query mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    Single(String),
    Multi(Vec<String>),
}

impl QueryInput {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            QueryInput::Single(s) => vec![s.clone()],
            QueryInput::Multi(v) => v.clone(),
        }
    }
}

/// Tunable counts and platform selection for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParameters {
    pub num_queries: usize,
    pub papers_per_query: usize,
    pub num_papers_to_return: usize,
    pub enabled_platforms: Vec<String>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            num_queries: 2,
            papers_per_query: 2,
            num_papers_to_return: 2,
            enabled_platforms: vec![
                "openalex".to_string(),
                "scopus".to_string(),
                "core".to_string(),
                "arxiv".to_string(),
                "semantic_scholar".to_string(),
            ],
            min_year: None,
            max_year: None,
        }
    }
}

/// The mutable aggregate owned by a single request. Created at pipeline
/// entry, mutated only by the orchestrator and the components it drives, and
/// serialized back to the caller at exit.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub query: QueryInput,
    pub ranking_guidance: String,
    pub parameters: PipelineParameters,
    pub exclusion_schema: Option<CompiledSchema>,
    pub data_extraction_schema: Option<CompiledSchema>,
    pub queries: Vec<SearchQuery>,
    pub search_results: Vec<Paper>,
    pub ranked_papers: Vec<RankedPaper>,
    pub metadata: HashMap<String, Value>,
    pub timestamp: String,

    /// Dedup index over `search_results`' normalized titles. Skipped by
    /// serde; rebuilt as needed, never observed by callers.
    #[serde(skip)]
    search_title_index: std::collections::HashSet<String>,
    #[serde(skip)]
    ranked_title_index: std::collections::HashSet<String>,
}

impl RequestAnalysis {
    pub fn new(
        query: QueryInput,
        ranking_guidance: String,
        parameters: PipelineParameters,
        exclusion_schema: Option<CompiledSchema>,
        data_extraction_schema: Option<CompiledSchema>,
        timestamp: String,
    ) -> Self {
        Self {
            query,
            ranking_guidance,
            parameters,
            exclusion_schema,
            data_extraction_schema,
            queries: Vec::new(),
            search_results: Vec::new(),
            ranked_papers: Vec::new(),
            metadata: HashMap::new(),
            timestamp,
            search_title_index: std::collections::HashSet::new(),
            ranked_title_index: std::collections::HashSet::new(),
        }
    }

    pub fn add_query(&mut self, text: String, backend: String, timestamp: String) {
        self.queries.push(SearchQuery {
            text,
            backend,
            timestamp,
        });
    }

    /// Insert a paper, deduplicating by normalized title. Returns `true` if
    /// the paper was newly inserted.
    pub fn add_search_result(&mut self, paper: Paper) -> bool {
        let key = paper.title_key();
        if self.search_title_index.contains(&key) {
            return false;
        }
        self.search_title_index.insert(key);
        self.search_results.push(paper);
        true
    }

    /// Insert a ranked paper, deduplicating by normalized title.
    pub fn add_ranked_paper(&mut self, ranked: RankedPaper) -> bool {
        let key = ranked.title_key();
        if self.ranked_title_index.contains(&key) {
            return false;
        }
        self.ranked_title_index.insert(key);
        self.ranked_papers.push(ranked);
        true
    }

    /// Apply the optional `min_year`/`max_year` config filters to
    /// `search_results` in place. Papers with `year == UNKNOWN` are kept
    /// (a missing year is not evidence the paper is out of range).
    pub fn apply_year_filter(&mut self) {
        let (min_year, max_year) = (self.parameters.min_year, self.parameters.max_year);
        if min_year.is_none() && max_year.is_none() {
            return;
        }
        self.search_results.retain(|p| {
            if p.year == UNKNOWN {
                return true;
            }
            min_year.map(|min| p.year >= min).unwrap_or(true)
                && max_year.map(|max| p.year <= max).unwrap_or(true)
        });
    }
}

/// Thread-safe handle to a `RequestAnalysis`, shared across the concurrent
/// adapter and adjudication tasks that mutate it. All mutation is funneled
/// through this lock per the "serialize mutations" requirement.
pub type SharedAnalysis = std::sync::Arc<tokio::sync::Mutex<RequestAnalysis>>;

/// Wrap a `RequestAnalysis` for concurrent sharing.
pub fn shared(analysis: RequestAnalysis) -> SharedAnalysis {
    std::sync::Arc::new(tokio::sync::Mutex::new(analysis))
}

/// A guarded score accumulator for the tournament ranker: `paper_id -> list
/// of per-round scores`. A plain `std::sync::Mutex` is sufficient because
/// the critical section never awaits.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    scores: Mutex<HashMap<String, Vec<f64>>>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, paper_id: &str, score: f64) {
        let mut guard = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(paper_id.to_string()).or_default().push(score);
    }

    /// Mean score per paper id; zero for ids with no recorded contribution.
    pub fn averages(&self, ids: &[String]) -> HashMap<String, f64> {
        let guard = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .map(|id| {
                let avg = guard
                    .get(id)
                    .filter(|v| !v.is_empty())
                    .map(|v| v.iter().sum::<f64>() / v.len() as f64)
                    .unwrap_or(0.0);
                (id.clone(), avg)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_paper_without_title() {
        let paper = Paper::new(
            "10.1/x",
            "   ",
            vec![],
            Some(2020),
            Some("abs".into()),
            None,
            None,
            "test",
        );
        assert!(paper.is_none());
    }

    #[test]
    fn rejects_paper_without_abstract_or_full_text() {
        let paper = Paper::new("10.1/x", "Title", vec![], Some(2020), None, None, None, "test");
        assert!(paper.is_none());
    }

    #[test]
    fn fills_unknown_author() {
        let paper = Paper::new(
            "10.1/x",
            "Title",
            vec![],
            Some(2020),
            Some("abs".into()),
            None,
            None,
            "test",
        )
        .unwrap();
        assert_eq!(paper.authors, vec!["Unknown Author".to_string()]);
    }

    #[test]
    fn normalizes_doi_prefix() {
        assert_eq!(normalize_doi("https://doi.org/10.1/x "), "10.1/x");
        assert_eq!(normalize_doi("http://doi.org/10.1/x"), "10.1/x");
        assert_eq!(normalize_doi("10.1/x"), "10.1/x");
    }

    #[test]
    fn clamps_out_of_range_years() {
        assert_eq!(clamp_year(1899), UNKNOWN);
        assert_eq!(clamp_year(2101), UNKNOWN);
        assert_eq!(clamp_year(2020), 2020);
    }

    #[test]
    fn parses_year_prefix_of_date_string() {
        assert_eq!(parse_year("2021-05-01"), 2021);
        assert_eq!(parse_year("not-a-year"), UNKNOWN);
    }

    #[test]
    fn dedup_by_normalized_title_is_idempotent() {
        let mut analysis = RequestAnalysis::new(
            QueryInput::Single("q".into()),
            String::new(),
            PipelineParameters::default(),
            None,
            None,
            "t".into(),
        );
        let p1 = Paper::new(
            "",
            "Some Title",
            vec![],
            None,
            Some("a".into()),
            None,
            None,
            "s1",
        )
        .unwrap();
        let p2 = Paper::new(
            "",
            "  some   title ",
            vec![],
            None,
            Some("b".into()),
            None,
            None,
            "s2",
        )
        .unwrap();
        assert!(analysis.add_search_result(p1));
        assert!(!analysis.add_search_result(p2));
        assert_eq!(analysis.search_results.len(), 1);
    }

    #[test]
    fn year_filter_keeps_unknown_years() {
        let mut analysis = RequestAnalysis::new(
            QueryInput::Single("q".into()),
            String::new(),
            PipelineParameters {
                min_year: Some(2015),
                max_year: Some(2020),
                ..Default::default()
            },
            None,
            None,
            "t".into(),
        );
        let known_old = Paper::new("", "Old", vec![], Some(2000), Some("a".into()), None, None, "s").unwrap();
        let unknown = Paper::new("", "Unknown Year", vec![], None, Some("a".into()), None, None, "s").unwrap();
        analysis.add_search_result(known_old);
        analysis.add_search_result(unknown);
        analysis.apply_year_filter();
        assert_eq!(analysis.search_results.len(), 1);
        assert_eq!(analysis.search_results[0].title, "Unknown Year");
    }

    #[test]
    fn scoreboard_averages_and_zero_fills() {
        let board = ScoreBoard::new();
        board.record("paper_1", 0.5);
        board.record("paper_1", 1.0);
        let avgs = board.averages(&["paper_1".to_string(), "paper_2".to_string()]);
        assert_eq!(avgs["paper_1"], 0.75);
        assert_eq!(avgs["paper_2"], 0.0);
    }
}
