//! News post writer backed by the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::broadcast::error::GenerationError;
use crate::broadcast::traits::ContentGenerator;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 400;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

const SYSTEM_PROMPT: &str = "You write short, punchy news posts for a group chat. \
Each post is one headline-style paragraph of at most three sentences, written \
in the language the chat uses. Riff on what people in the chat have been talking \
about; invent the news freely but keep it plausible. Output only the post.";

pub struct NewsWriter {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl NewsWriter {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

/// User turn for the model, quoting the recent chat.
fn build_prompt(history: &[String]) -> String {
    if history.is_empty() {
        return "Nobody has said anything yet. Write a post about whatever is in the news today.".to_string();
    }
    let mut prompt = String::from("Recent messages in the chat, oldest first:\n");
    for line in history {
        prompt.push_str("- ");
        prompt.push_str(&line.replace('\n', " "));
        prompt.push('\n');
    }
    prompt.push_str("\nWrite the next news post.");
    prompt
}

#[async_trait]
impl ContentGenerator for NewsWriter {
    async fn generate(&self, history: &[String]) -> Result<String, GenerationError> {
        debug!("Writing post from {} message(s) of history", history.len());
        let request = ApiRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![ApiMessage {
                role: "user",
                content: build_prompt(history),
            }],
        };

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let post = api_response
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string();

        if post.is_empty() {
            return Err(GenerationError::Empty);
        }
        info!("Wrote post ({} chars)", post.chars().count());
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_history() {
        assert!(build_prompt(&[]).contains("Nobody has said anything"));
    }

    #[test]
    fn test_prompt_quotes_history_in_order() {
        let history = vec!["first".to_string(), "second\nline".to_string()];
        let prompt = build_prompt(&history);
        let first = prompt.find("- first").unwrap();
        let second = prompt.find("- second line").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_response_parsing_skips_non_text_blocks() {
        let json = r#"{"content":[{"type":"text","text":"Breaking: "},{"type":"tool_use"},{"type":"text","text":"cats"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed.content.into_iter().map(|b| b.text).collect();
        assert_eq!(text, "Breaking: cats");
    }
}
