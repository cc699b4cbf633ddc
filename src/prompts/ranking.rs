//! Prompts for the tournament ranker's per-group ranking call (C8).

/// System prompt asking for a strict permutation ranking within a group.
pub const SYSTEM_PROMPT: &str = r#"You rank a small group of academic papers by relevance to a research query.

Rules you MUST follow:
- Assign every paper a unique rank from 1 to the group size; 1 is the most relevant.
- Base judgments only on the provided title/full text, the query, and the ranking guidance (if any).
- Output MUST be exactly one JSON object, no prose, no markdown code fences:
{"rankings": [{"paper_id": "paper_3", "rank": 1, "explanation": "..."}, ...]}
"#;

/// One paper entry embedded in a group-ranking prompt.
pub struct RankingPaperEntry<'a> {
    pub paper_id: &'a str,
    pub title: &'a str,
    pub full_text: &'a str,
}

/// Build the user prompt for ranking one group of papers.
pub fn build_group_prompt(query: &str, ranking_guidance: &str, group: &[RankingPaperEntry]) -> String {
    let papers_json: Vec<serde_json::Value> = group
        .iter()
        .map(|p| {
            serde_json::json!({
                "paper_id": p.paper_id,
                "title": p.title,
                "full_text": p.full_text,
            })
        })
        .collect();

    let papers_str =
        serde_json::to_string_pretty(&papers_json).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Research query:\n{query}\n\nRanking guidance (may be empty):\n{guidance}\n\n\
         Papers to rank (group size {size}):\n{papers}\n\n\
         Return exactly one JSON object: {{\"rankings\": [{{\"paper_id\": ..., \"rank\": ..., \"explanation\": ...}}, ...]}} \
         with ranks forming a permutation of 1..{size}.",
        query = query,
        guidance = ranking_guidance,
        size = group.len(),
        papers = papers_str,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_prompt_embeds_all_paper_ids() {
        let group = vec![
            RankingPaperEntry {
                paper_id: "paper_1",
                title: "A",
                full_text: "text a",
            },
            RankingPaperEntry {
                paper_id: "paper_2",
                title: "B",
                full_text: "text b",
            },
        ];
        let prompt = build_group_prompt("query", "guidance", &group);
        assert!(prompt.contains("paper_1"));
        assert!(prompt.contains("paper_2"));
        assert!(prompt.contains("1..2"));
    }
}
