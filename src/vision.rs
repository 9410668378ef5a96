//! Multimodal description service.
//!
//! Images (and PDFs without a usable text layer) are turned into text by a
//! vision model behind the [`Describer`] trait. Callers mask any
//! [`DescribeError`] as placeholder text, so a slow or failing service never
//! aborts an ingestion.

use async_trait::async_trait;
use base64::Engine as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{VisionConfig, OPENAI_API_KEY_ENV};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Prompt used for raster images.
pub const IMAGE_PROMPT: &str = "Describe this image in detail for a searchable knowledge base. \
Include: 1) all visible text, transcribed exactly; 2) the main objects and their arrangement; \
3) any people and what they are doing; 4) notable colors; 5) the data shown in any chart, \
table or diagram; 6) the overall context or purpose of the image.";

/// Prompt used for scanned PDFs.
pub const OCR_PROMPT: &str = "Extract all text from this document verbatim. Preserve table \
structure using tab-separated columns and mark page breaks with '--- Page N ---'. Do not \
summarize or add commentary.";

#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("vision provider is disabled")]
    Disabled,

    #[error("vision request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vision API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid vision response: {0}")]
    InvalidResponse(String),
}

/// Turns binary content into descriptive text.
#[async_trait]
pub trait Describer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn describe(&self, bytes: &[u8], mime: &str, prompt: &str)
        -> Result<String, DescribeError>;
}

/// Describer used when `vision.provider = "disabled"`.
pub struct DisabledDescriber;

#[async_trait]
impl Describer for DisabledDescriber {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn describe(&self, _bytes: &[u8], _mime: &str, _prompt: &str) -> Result<String, DescribeError> {
        Err(DescribeError::Disabled)
    }
}

/// OpenAI chat-completions vision client. Content is sent inline as base64.
pub struct OpenAiDescriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiDescriber {
    pub fn new(config: &VisionConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", OPENAI_API_KEY_ENV))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

/// Build the user message content for `mime`.
fn content_part(bytes: &[u8], mime: &str) -> serde_json::Value {
    let data_url = format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    );
    if mime == "application/pdf" {
        serde_json::json!({
            "type": "file",
            "file": { "filename": "document.pdf", "file_data": data_url }
        })
    } else {
        serde_json::json!({
            "type": "image_url",
            "image_url": { "url": data_url }
        })
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, DescribeError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DescribeError::InvalidResponse("missing choices[0].message.content".into()))
}

#[async_trait]
impl Describer for OpenAiDescriber {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn describe(&self, bytes: &[u8], mime: &str, prompt: &str) -> Result<String, DescribeError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    content_part(bytes, mime)
                ]
            }]
        });

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DescribeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Create the [`Describer`] selected by `vision.provider`.
pub fn create_describer(config: &VisionConfig) -> anyhow::Result<Arc<dyn Describer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledDescriber)),
        "openai" => Ok(Arc::new(OpenAiDescriber::new(config)?)),
        other => anyhow::bail!("Unknown vision provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_part_by_mime() {
        let img = content_part(b"abc", "image/png");
        assert_eq!(img["type"], "image_url");
        assert_eq!(img["image_url"]["url"], "data:image/png;base64,YWJj");

        let pdf = content_part(b"abc", "application/pdf");
        assert_eq!(pdf["type"], "file");
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "  A red bicycle.  "}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "A red bicycle.");
        assert!(parse_chat_response(&serde_json::json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_describer_errors() {
        let d = create_describer(&VisionConfig::default()).unwrap();
        assert!(matches!(
            d.describe(b"x", "image/png", IMAGE_PROMPT).await,
            Err(DescribeError::Disabled)
        ));
    }
}
