//! Tournament ranker (C8): repeatedly shuffle the surviving papers into
//! small groups, ask the LLM to rank each group, accumulate per-round
//! scores, then run a deep-analysis + citation-enrichment pass over the
//! top N. A paper whose deep-analysis call fails or returns an unparseable
//! response is dropped from the final output rather than kept with an
//! empty analysis. A group ranking response whose ranks aren't exactly a
//! `1..=group.len()` permutation is discarded wholesale for that round. No
//! teacher module ranks paper-vs-paper (`rankings.rs` only looks up a
//! venue's impact-factor row); this is grounded in the teacher's
//! concurrency idiom instead — `futures::stream::buffer_unordered` fired
//! per unit of work, the same shape `llm_filter.rs::filter_papers` uses per
//! paper, applied here per round/group.

use crate::citation::CitationResolver;
use crate::llm::StructuredLlm;
use crate::model::{RankedPaper, ScoreBoard};
use crate::prompts::ranking::{build_group_prompt, RankingPaperEntry, SYSTEM_PROMPT as RANKING_SYSTEM_PROMPT};
use crate::prompts::analysis::{build_user_prompt as build_analysis_prompt, SYSTEM_PROMPT as ANALYSIS_SYSTEM_PROMPT};
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Papers whose full text is shorter than this are dropped before ranking:
/// too little signal to judge relevance against.
const MIN_FULL_TEXT_WORDS: usize = 200;

/// Run the full tournament: pre-filter, round-robin group ranking, top-N
/// selection, deep analysis, citation enrichment.
pub async fn rank(
    papers: Vec<RankedPaper>,
    query: &str,
    ranking_guidance: &str,
    llm: &Arc<dyn StructuredLlm>,
    citations: &Arc<dyn CitationResolver>,
    num_to_return: usize,
    group_concurrency: usize,
) -> Vec<RankedPaper> {
    let mut candidates: Vec<RankedPaper> =
        papers.into_iter().filter(|p| p.paper.full_text_word_count() >= MIN_FULL_TEXT_WORDS).collect();

    if candidates.is_empty() {
        return Vec::new();
    }

    let k = candidates.len();
    let rounds = round_count(k);
    let board = ScoreBoard::new();
    let ids: Vec<String> = (0..k).map(|i| format!("paper_{i}")).collect();

    for round in 0..rounds {
        run_round(&candidates, &ids, query, ranking_guidance, llm, &board, group_concurrency, round).await;
    }

    let averages = board.averages(&ids);
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| {
        let sa = averages.get(&ids[a]).copied().unwrap_or(0.0);
        let sb = averages.get(&ids[b]).copied().unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });

    for (rank_idx, &i) in order.iter().enumerate() {
        candidates[i].relevance_score = averages.get(&ids[i]).copied().unwrap_or(0.0);
        let _ = rank_idx;
    }

    let top_indices: Vec<usize> = order.into_iter().take(num_to_return).collect();
    let top: Vec<RankedPaper> = top_indices.into_iter().map(|i| candidates[i].clone()).collect();

    deep_analyze_and_enrich(top, query, ranking_guidance, llm, citations, group_concurrency).await
}

/// `clamp(floor(log_1.4(k)) + 2, 3, 8)` for `k > 8`, else `3`.
fn round_count(k: usize) -> usize {
    if k <= 8 {
        return 3;
    }
    let raw = (k as f64).ln() / 1.4_f64.ln();
    let computed = raw.floor() as i64 + 2;
    computed.clamp(3, 8) as usize
}

/// `clamp(k / max(1, k/5), 2, 5)`.
fn group_size(k: usize) -> usize {
    let divisor = (k / 5).max(1);
    let size = k / divisor;
    size.clamp(2, 5)
}

/// Shuffle the candidate indices and partition them into contiguous groups
/// of `group_size(k)`. A final group smaller than 2 is redistributed
/// round-robin across the other groups so every group ranking call is
/// still a meaningful comparison.
fn partition_into_groups(k: usize) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..k).collect();
    indices.shuffle(&mut rand::thread_rng());

    let size = group_size(k);
    let mut groups: Vec<Vec<usize>> = indices.chunks(size).map(|c| c.to_vec()).collect();

    if groups.len() > 1 {
        if let Some(last) = groups.last() {
            if last.len() < 2 {
                let tail = groups.pop().unwrap();
                let num_groups = groups.len();
                for (i, idx) in tail.into_iter().enumerate() {
                    groups[i % num_groups].push(idx);
                }
            }
        }
    }

    groups
}

async fn run_round(
    candidates: &[RankedPaper],
    ids: &[String],
    query: &str,
    ranking_guidance: &str,
    llm: &Arc<dyn StructuredLlm>,
    board: &ScoreBoard,
    group_concurrency: usize,
    round: usize,
) {
    let groups = partition_into_groups(candidates.len());

    stream::iter(groups)
        .map(|group_indices| {
            let llm = llm.clone();
            async move {
                score_group(candidates, ids, &group_indices, query, ranking_guidance, &llm, board).await;
            }
        })
        .buffer_unordered(group_concurrency.max(1))
        .for_each(|_| async {})
        .await;
    let _ = round;
}

async fn score_group(
    candidates: &[RankedPaper],
    ids: &[String],
    group_indices: &[usize],
    query: &str,
    ranking_guidance: &str,
    llm: &Arc<dyn StructuredLlm>,
    board: &ScoreBoard,
) {
    let entries: Vec<RankingPaperEntry> = group_indices
        .iter()
        .map(|&i| RankingPaperEntry {
            paper_id: &ids[i],
            title: &candidates[i].paper.title,
            full_text: candidates[i].paper.full_text.as_deref().unwrap_or(""),
        })
        .collect();

    let prompt = build_group_prompt(query, ranking_guidance, &entries);
    let group_size = group_indices.len() as f64;

    let response = match llm.process(RANKING_SYSTEM_PROMPT, &prompt).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "group ranking call failed, skipping this round for this group");
            return;
        }
    };

    let parsed: RankingResponse = match serde_json::from_value(response) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "group ranking response did not match schema");
            return;
        }
    };

    let group_ids: std::collections::HashSet<&str> = group_indices.iter().map(|&i| ids[i].as_str()).collect();
    if !is_valid_permutation(&parsed.rankings, &group_ids) {
        warn!(group_size = group_indices.len(), "group ranking response is not a valid permutation, discarding group");
        return;
    }

    for entry in parsed.rankings {
        let score = (group_size - entry.rank as f64 + 1.0) / group_size;
        board.record(&entry.paper_id, score.clamp(0.0, 1.0));
    }
}

/// A ranking response is only trusted when it covers exactly the group's
/// paper ids once each and its ranks are exactly `1..=group.len()` with no
/// duplicates; anything else (missing/extra ids, out-of-range or repeated
/// ranks) discards the whole group rather than recording a corrupt score.
fn is_valid_permutation(rankings: &[RankingEntry], group_ids: &std::collections::HashSet<&str>) -> bool {
    if rankings.len() != group_ids.len() {
        return false;
    }

    let mut seen_ids = std::collections::HashSet::with_capacity(rankings.len());
    let mut seen_ranks = std::collections::HashSet::with_capacity(rankings.len());
    for entry in rankings {
        if !group_ids.contains(entry.paper_id.as_str()) {
            return false;
        }
        if entry.rank < 1 || entry.rank as usize > rankings.len() {
            return false;
        }
        if !seen_ids.insert(entry.paper_id.as_str()) {
            return false;
        }
        if !seen_ranks.insert(entry.rank) {
            return false;
        }
    }

    true
}

async fn deep_analyze_and_enrich(
    top: Vec<RankedPaper>,
    query: &str,
    ranking_guidance: &str,
    llm: &Arc<dyn StructuredLlm>,
    citations: &Arc<dyn CitationResolver>,
    concurrency: usize,
) -> Vec<RankedPaper> {
    let results: Vec<Option<RankedPaper>> = stream::iter(top)
        .map(|mut ranked| {
            let llm = llm.clone();
            let citations = citations.clone();
            async move {
                let full_text = ranked.paper.full_text.as_deref().unwrap_or_default();
                let prompt = build_analysis_prompt(query, ranking_guidance, &ranked.paper.title, full_text);

                match llm.process(ANALYSIS_SYSTEM_PROMPT, &prompt).await {
                    Ok(value) => match serde_json::from_value::<AnalysisResponse>(value) {
                        Ok(parsed) => {
                            ranked.analysis = parsed.analysis;
                            ranked.relevant_quotes = parsed.relevant_quotes;
                        }
                        Err(e) => {
                            warn!(title = %ranked.paper.title, error = %e, "deep analysis response did not match schema, dropping paper");
                            return None;
                        }
                    },
                    Err(e) => {
                        warn!(title = %ranked.paper.title, error = %e, "deep analysis call failed, dropping paper");
                        return None;
                    }
                }

                if ranked.paper.bibtex.is_empty() {
                    let bib = if !ranked.paper.doi.is_empty() {
                        citations.by_doi(&ranked.paper.doi).await
                    } else {
                        String::new()
                    };
                    let bib = if bib.is_empty() {
                        citations.by_title(&ranked.paper.title, &ranked.paper.authors, ranked.paper.year).await
                    } else {
                        bib
                    };
                    if !bib.is_empty() {
                        ranked.paper.bibtex = bib;
                    }
                }

                Some(ranked)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.into_iter().flatten().collect()
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    #[serde(default)]
    rankings: Vec<RankingEntry>,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    paper_id: String,
    rank: u32,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisResponse {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    relevant_quotes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_count_is_three_below_threshold() {
        assert_eq!(round_count(5), 3);
        assert_eq!(round_count(8), 3);
    }

    #[test]
    fn round_count_grows_and_caps_at_eight() {
        assert!(round_count(50) >= 3);
        assert!(round_count(1_000_000) <= 8);
    }

    #[test]
    fn group_size_stays_within_bounds() {
        for k in 1..200 {
            let size = group_size(k);
            assert!((2..=5).contains(&size));
        }
    }

    #[test]
    fn partition_covers_every_index_exactly_once() {
        let groups = partition_into_groups(17);
        let mut seen: Vec<usize> = groups.into_iter().flatten().collect();
        seen.sort();
        assert_eq!(seen, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn partition_never_leaves_a_singleton_group_when_more_than_one_group_exists() {
        let groups = partition_into_groups(11);
        if groups.len() > 1 {
            for g in &groups {
                assert!(g.len() >= 2);
            }
        }
    }

    #[test]
    fn permutation_check_accepts_a_well_formed_ranking() {
        let ids: std::collections::HashSet<&str> = ["paper_0", "paper_1", "paper_2"].into_iter().collect();
        let rankings = vec![
            RankingEntry { paper_id: "paper_0".to_string(), rank: 2 },
            RankingEntry { paper_id: "paper_1".to_string(), rank: 1 },
            RankingEntry { paper_id: "paper_2".to_string(), rank: 3 },
        ];
        assert!(is_valid_permutation(&rankings, &ids));
    }

    #[test]
    fn permutation_check_rejects_duplicate_ranks() {
        let ids: std::collections::HashSet<&str> = ["paper_0", "paper_1", "paper_2"].into_iter().collect();
        let rankings = vec![
            RankingEntry { paper_id: "paper_0".to_string(), rank: 1 },
            RankingEntry { paper_id: "paper_1".to_string(), rank: 1 },
            RankingEntry { paper_id: "paper_2".to_string(), rank: 3 },
        ];
        assert!(!is_valid_permutation(&rankings, &ids));
    }

    #[test]
    fn permutation_check_rejects_out_of_range_rank() {
        let ids: std::collections::HashSet<&str> = ["paper_0", "paper_1"].into_iter().collect();
        let rankings = vec![
            RankingEntry { paper_id: "paper_0".to_string(), rank: 1 },
            RankingEntry { paper_id: "paper_1".to_string(), rank: 5 },
        ];
        assert!(!is_valid_permutation(&rankings, &ids));
    }

    #[test]
    fn permutation_check_rejects_unknown_paper_id() {
        let ids: std::collections::HashSet<&str> = ["paper_0", "paper_1"].into_iter().collect();
        let rankings = vec![
            RankingEntry { paper_id: "paper_0".to_string(), rank: 1 },
            RankingEntry { paper_id: "paper_99".to_string(), rank: 2 },
        ];
        assert!(!is_valid_permutation(&rankings, &ids));
    }
}
