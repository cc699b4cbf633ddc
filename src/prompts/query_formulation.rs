//! Query-formulation prompts: ask the LLM for N backend-syntax-correct query
//! strings for a given backend, given the user's natural-language request.
//!
//! Structured the same way `relevance_filter.rs` paired a `SYSTEM_PROMPT`
//! constant with a `build_user_prompt` function — one cheat-sheet block per
//! backend instead of one shared system prompt, since each backend's wire
//! syntax is different enough to need its own worked examples.

/// Per-backend syntax cheat sheet embedded in the system prompt.
pub fn backend_cheat_sheet(backend: &str) -> &'static str {
    match backend {
        "scopus" => {
            "Scopus Advanced Search syntax: use field codes like TITLE-ABS-KEY(...), \
             proximity operators W/n (unordered, within n words) and PRE/n (ordered), \
             braces {...} for exact phrases, and AND/OR/AND NOT boolean connectors. \
             Example: TITLE-ABS-KEY(\"deep learning\" W/5 diagnosis) AND PUBYEAR > 2018"
        }
        "openalex" => {
            "OpenAlex works query: a fully formed URL of the form \
             https://api.openalex.org/works?search=<url-encoded terms>&sort=relevance_score:desc \
             Example: https://api.openalex.org/works?search=coffee%20diabetes%20risk&sort=relevance_score:desc"
        }
        "arxiv" => {
            "arXiv natural-language query: plain keywords, no field codes required. \
             Example: graph neural networks for molecular property prediction"
        }
        "core" => {
            "CORE boolean query: plain keywords combined with AND/OR/NOT, quoted phrases \
             for exact matches. Example: \"climate adaptation\" AND agriculture"
        }
        "semantic_scholar" => {
            "Semantic Scholar natural-language query: plain keywords, same style as a web \
             search. Example: transformer attention mechanisms efficiency"
        }
        _ => "Plain natural-language keyword query.",
    }
}

/// System prompt for query formulation, parameterized by backend.
pub fn system_prompt(backend: &str) -> String {
    format!(
        "You generate search queries in the exact wire syntax of one academic \
         search backend. You MUST follow the backend's syntax rules exactly; \
         a syntactically invalid query will be rejected before it ever reaches \
         the backend. Output strict JSON only, no markdown, no prose.\n\n\
         Target backend: {backend}\n\
         Syntax cheat sheet:\n{sheet}\n\n\
         Output format:\n{{\"queries\": [\"query 1\", \"query 2\", ...]}}",
        backend = backend,
        sheet = backend_cheat_sheet(backend)
    )
}

/// User prompt requesting `num` queries for `user_query`.
pub fn user_prompt(user_query: &str, num: usize) -> String {
    format!(
        "User's research request:\n{user_query}\n\n\
         Generate exactly {num} distinct queries for this backend that would \
         surface papers relevant to the request above. Vary phrasing/scope \
         across the {num} queries rather than repeating the same terms.\n\n\
         Output strict JSON only:\n{{\"queries\": [...]}}",
        user_query = user_query,
        num = num
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_embeds_backend_name_and_cheat_sheet() {
        let prompt = system_prompt("scopus");
        assert!(prompt.contains("scopus"));
        assert!(prompt.contains("TITLE-ABS-KEY"));
    }

    #[test]
    fn user_prompt_embeds_query_and_count() {
        let prompt = user_prompt("coffee and diabetes", 3);
        assert!(prompt.contains("coffee and diabetes"));
        assert!(prompt.contains("exactly 3"));
    }
}
