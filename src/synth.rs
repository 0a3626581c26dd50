//! Caption synthesizer: one chat-completion call against an
//! OpenAI-compatible endpoint (DeepSeek via SiliconFlow by default).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::choices::{Mood, Weather};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed chat response: {0}")]
    Malformed(String),
}

/// Generates caption text from a system prompt and a user message.
#[async_trait]
pub trait CaptionSynthesizer: Send + Sync {
    async fn synthesize(&self, system_prompt: &str, user_message: &str)
        -> Result<String, SynthesisError>;
}

/// The labeled layout the style templates are written against.
pub fn compose_user_message(description: &str, weather: Weather, mood: Mood) -> String {
    format!(
        "[Qwen 物理碎语]：{}\n[环境]：{}\n[心情]：{}",
        description,
        weather.label(),
        mood.label()
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct ChatSynthesizer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatSynthesizer {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CaptionSynthesizer for ChatSynthesizer {
    async fn synthesize(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, SynthesisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
        };

        debug!(model = %self.model, "sending chat completion request");

        let response = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            warn!(status = status.as_u16(), "chat API error");
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| SynthesisError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SynthesisError::Malformed("no choices".to_string()))?
            .message
            .content
            .ok_or_else(|| SynthesisError::Malformed("choice has no content".to_string()))?;

        debug!(chars = text.chars().count(), "caption received");
        Ok(text)
    }
}
