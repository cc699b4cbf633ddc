//! Prompts for the exclusion/extraction adjudicator (C7): fill a
//! caller-supplied schema from a paper's title/full text, flagging
//! exclusion conditions as booleans and extraction fields as typed values.
//!
//! Directly descended from `relevance_filter.rs`'s `SYSTEM_PROMPT`/
//! `build_user_prompt` pair, generalized from a fixed relevant/irrelevant/
//! uncertain label into an arbitrary caller-supplied schema.

use crate::schema::CompiledSchema;

/// System prompt instructing strict-JSON, evidence-only, silence-means-false
/// adjudication.
pub const SYSTEM_PROMPT: &str = r#"You are an academic paper adjudicator. Given a paper's title and full text, you fill in every field of the requested schema.

Rules you MUST follow:
- Do NOT fabricate content; base every field only on the provided text.
- For boolean exclusion fields: if the text does not mention the condition at all, the field MUST be false. Silence is not evidence of exclusion.
- For extraction fields: if the value cannot be found in the text, use the field's stated default.
- Output MUST be exactly one JSON object matching the schema: no extra keys, no prose, no markdown code fences.
"#;

/// Build the user prompt for one paper against one compiled schema.
pub fn build_user_prompt(title: &str, full_text: &str, schema: &CompiledSchema) -> String {
    let schema_json = serde_json::to_string_pretty(&schema.prompt_description())
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        "Paper title:\n{title}\n\nPaper full text:\n{full_text}\n\n\
         Schema (field name -> kind and description):\n{schema_json}\n\n\
         Return exactly one JSON object matching the schema above, no extra keys, no prose.",
        title = title,
        full_text = full_text,
        schema_json = schema_json,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind};
    use indexmap::IndexMap;

    #[test]
    fn user_prompt_embeds_title_and_schema() {
        let mut map = IndexMap::new();
        map.insert(
            "small_dataset".to_string(),
            FieldDef {
                kind: FieldKind::Boolean,
                description: "true if n < 100".to_string(),
            },
        );
        let schema = CompiledSchema::compile(&map);
        let prompt = build_user_prompt("Some Title", "full text here", &schema);
        assert!(prompt.contains("Some Title"));
        assert!(prompt.contains("small_dataset"));
    }
}
