//! Vision describer backed by the DashScope multimodal-generation API
//! (Qwen-VL).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::upload::UploadedImage;

/// Why no description came back. Callers treat every variant the same way
/// (abort the pipeline); the variants exist for the log line.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("vision API returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed vision response: {0}")]
    Malformed(String),

    #[error("vision response carried no text")]
    Empty,
}

/// Turns an image into a terse physical description.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn describe(&self, image: &UploadedImage) -> Result<String, VisionError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput<'a>,
}

#[derive(Debug, Serialize)]
struct GenerationInput<'a> {
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

/// DashScope content parts are keyed by kind, not tagged with `type`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart<'a> {
    Image { image: String },
    Text { text: &'a str },
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<GenerationChoice>,
}

#[derive(Debug, Deserialize)]
struct GenerationChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl GenerationResponse {
    /// First text block of the first choice.
    fn into_text(self) -> Result<String, VisionError> {
        let choice = self
            .output
            .ok_or_else(|| VisionError::Malformed("missing output".to_string()))?
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::Malformed("no choices".to_string()))?;

        let text = choice
            .message
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| VisionError::Malformed("no text content block".to_string()))?;

        if text.trim().is_empty() {
            return Err(VisionError::Empty);
        }
        Ok(text)
    }
}

pub struct QwenVision {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    instruction: String,
}

impl QwenVision {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            instruction: instruction.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/services/aigc/multimodal-generation/generation",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl VisionDescriber for QwenVision {
    async fn describe(&self, image: &UploadedImage) -> Result<String, VisionError> {
        let payload = GenerationRequest {
            model: &self.model,
            input: GenerationInput {
                messages: vec![UserMessage {
                    role: "user",
                    content: vec![
                        ContentPart::Image {
                            image: image.data_uri(),
                        },
                        ContentPart::Text {
                            text: &self.instruction,
                        },
                    ],
                }],
            },
        };

        debug!(model = %self.model, mime = %image.mime(), bytes = image.byte_len(), "sending vision request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            warn!(status = status.as_u16(), code = ?err.code, "vision API error");
            return Err(VisionError::Status {
                status: status.as_u16(),
                code: err.code.unwrap_or_else(|| "unknown".to_string()),
                message: err.message.unwrap_or_default(),
            });
        }

        let parsed: GenerationResponse =
            serde_json::from_str(&body).map_err(|e| VisionError::Malformed(e.to_string()))?;
        let text = parsed.into_text()?;

        debug!(chars = text.chars().count(), "vision description received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::tests::PNG_MAGIC;
    use axum::body::Bytes;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/services/aigc/multimodal-generation/generation";

    fn png() -> UploadedImage {
        UploadedImage::from_upload(Bytes::from_static(PNG_MAGIC), Some("image/png"), None).unwrap()
    }

    fn describer(server: &mockito::Server) -> QwenVision {
        QwenVision::new(
            Client::new(),
            format!("{}/", server.url()),
            "qwen-key",
            "qwen-vl-max",
            "describe coldly",
        )
    }

    #[tokio::test]
    async fn sends_data_uri_and_instruction() {
        let mut server = mockito::Server::new_async().await;
        let image = png();
        let mock = server
            .mock("POST", PATH)
            .match_header("authorization", "Bearer qwen-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen-vl-max",
                "input": {"messages": [{
                    "role": "user",
                    "content": [{"image": image.data_uri()}, {"text": "describe coldly"}]
                }]}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "output": {"choices": [{
                        "finish_reason": "stop",
                        "message": {"role": "assistant", "content": [{"text": "冷瓷白, 侧逆光"}]}
                    }]},
                    "request_id": "req-1"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let text = describer(&server).describe(&image).await.unwrap();
        assert_eq!(text, "冷瓷白, 侧逆光");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn skips_leading_blocks_without_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(
                json!({"output": {"choices": [{"message": {"content": [
                    {"box": "[1,2,3,4]"},
                    {"text": "发丝左飘"}
                ]}}]}})
                .to_string(),
            )
            .create_async()
            .await;

        let text = describer(&server).describe(&png()).await.unwrap();
        assert_eq!(text, "发丝左飘");
    }

    #[tokio::test]
    async fn non_ok_status_is_reported_with_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(401)
            .with_body(
                json!({"code": "InvalidApiKey", "message": "Invalid API-key provided.", "request_id": "r"})
                    .to_string(),
            )
            .create_async()
            .await;

        let err = describer(&server).describe(&png()).await.unwrap_err();
        match err {
            VisionError::Status { status, code, .. } => {
                assert_eq!(status, 401);
                assert_eq!(code, "InvalidApiKey");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_still_yields_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(503)
            .with_body("upstream overloaded")
            .create_async()
            .await;

        let err = describer(&server).describe(&png()).await.unwrap_err();
        assert!(matches!(err, VisionError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(json!({"output": {"choices": []}}).to_string())
            .create_async()
            .await;

        let err = describer(&server).describe(&png()).await.unwrap_err();
        assert!(matches!(err, VisionError::Malformed(_)));
    }

    #[tokio::test]
    async fn blank_text_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(json!({"output": {"choices": [{"message": {"content": [{"text": "  "}]}}]}}).to_string())
            .create_async()
            .await;

        let err = describer(&server).describe(&png()).await.unwrap_err();
        assert!(matches!(err, VisionError::Empty));
    }
}
