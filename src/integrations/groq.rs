//! Groq chat completions (OpenAI-compatible API).

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::GroqConfig,
    error::{AppError, AppResult},
};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[instrument(skip(http, config, messages), fields(model = %config.model, turns = messages.len()))]
pub async fn chat(
    http: &reqwest::Client,
    config: &GroqConfig,
    messages: &[ChatMessage],
) -> AppResult<String> {
    let request = CompletionRequest {
        model: &config.model,
        messages,
        max_tokens: DEFAULT_MAX_TOKENS,
        temperature: TEMPERATURE,
    };

    let response = http
        .post(GROQ_API_URL)
        .bearer_auth(&config.api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, body = %body, "groq request failed");
        return Err(AppError::ServiceUnavailable("Assistant is unavailable".into()));
    }

    let completion: CompletionResponse = response.json().await?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| AppError::ServiceUnavailable("Assistant returned no answer".into()))
}
