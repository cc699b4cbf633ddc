//! The `StructuredLlm` capability: given a prompt and a schema hint, return
//! either a typed JSON object or an error. Treated as an external
//! collaborator by the spec; this module carries the trait plus one
//! concrete OpenAI-compatible implementation, generalizing the
//! chat-completions call the teacher already made per paper in
//! `llm_filter.rs::filter_single_paper` into a reusable client any
//! component (query formulator, adjudicator, ranker) can share.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Accepts a prompt and a schema hint (embedded as JSON text in the prompt
/// by the caller), returns a parsed JSON object or an error. Implementations
/// must never panic; a malformed LLM response is a `PipelineError::Llm`, not
/// a crash.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn process(&self, system_prompt: &str, user_prompt: &str) -> Result<Value>;
}

/// Token usage reported by the LLM provider for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Configuration for the OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn from_env(default_model: &str) -> Self {
        Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            model: std::env::var("DEFAULT_LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
            temperature: 0.1,
            max_tokens: 20000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[allow(dead_code)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[allow(dead_code)]
    prompt_tokens: u64,
    #[allow(dead_code)]
    completion_tokens: u64,
    #[allow(dead_code)]
    total_tokens: u64,
}

/// Talks to any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatibleLlm {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiCompatibleLlm {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl StructuredLlm for OpenAiCompatibleLlm {
    async fn process(&self, system_prompt: &str, user_prompt: &str) -> Result<Value> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let api_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(PipelineError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| PipelineError::Llm("empty choices in LLM response".to_string()))?;

        let json_str = extract_json(&content);
        debug!(chars = json_str.len(), "Parsing LLM JSON response");

        serde_json::from_str(&json_str)
            .map_err(|e| PipelineError::Llm(format!("non-JSON LLM output: {}", e)))
    }
}

/// Extract JSON from an LLM response, stripping a markdown code fence or
/// surrounding prose if present.
pub fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let start = if lines[0].starts_with("```json") || lines[0] == "```" {
                1
            } else {
                0
            };
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[start..end].join("\n");
        }
    }

    if let Some(start) = trimmed.find(['{', '[']) {
        if let Some(end) = trimmed.rfind(['}', ']']) {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_plain() {
        let input = r#"{"label": "relevant"}"#;
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn extract_json_code_block() {
        let input = "```json\n{\"label\": \"relevant\"}\n```";
        assert_eq!(extract_json(input), "{\"label\": \"relevant\"}");
    }

    #[test]
    fn extract_json_surrounded_by_prose() {
        let input = "Here is the result: {\"label\": \"irrelevant\"} thanks";
        assert_eq!(extract_json(input), "{\"label\": \"irrelevant\"}");
    }
}
