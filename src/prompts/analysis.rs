//! Prompts for the top-N deep-analysis pass (C8's second LLM call per
//! surviving paper): produce prose analysis plus 3-5 supporting quotes.

pub const SYSTEM_PROMPT: &str = r#"You write a focused analysis of one academic paper for a research request.

Rules you MUST follow:
- Cover methodology, evidence, limitations, and relevance to the query/guidance.
- Every quote in "relevant_quotes" MUST be copied verbatim from the provided full text.
- Provide between 3 and 5 quotes.
- Output MUST be exactly one JSON object, no prose, no markdown code fences:
{"analysis": "...", "relevant_quotes": ["...", "..."]}
"#;

pub fn build_user_prompt(query: &str, ranking_guidance: &str, title: &str, full_text: &str) -> String {
    format!(
        "Research query:\n{query}\n\nRanking guidance (may be empty):\n{guidance}\n\n\
         Paper title:\n{title}\n\nPaper full text:\n{full_text}\n\n\
         Return exactly one JSON object: {{\"analysis\": \"...\", \"relevant_quotes\": [\"...\"]}}",
        query = query,
        guidance = ranking_guidance,
        title = title,
        full_text = full_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_embeds_title_and_query() {
        let prompt = build_user_prompt("q", "g", "Title X", "body text");
        assert!(prompt.contains("Title X"));
        assert!(prompt.contains("q"));
    }
}
