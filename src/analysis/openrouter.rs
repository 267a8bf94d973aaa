//! OpenRouter chat-completions client for vision models
//!
//! Frames are PNG-encoded and sent inline as a base64 data URL together with
//! the analysis prompt. The API key is read from the environment on every
//! call so it can be rotated without restarting.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{AnalysisError, Analyzer};
use crate::capture::Frame;
use crate::pipeline::PipelineError;
use crate::storage::encode_png;
use crate::{AnalysisConfig, ConfigError};

pub struct OpenRouterAnalyzer {
    client: reqwest::Client,
    config: AnalysisConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    max_tokens: u32,
}

impl OpenRouterAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn request_body(&self, png: &[u8]) -> ChatRequest<'_> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        ChatRequest {
            model: &self.config.model,
            messages: vec![json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": self.config.prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{encoded}") }
                    }
                ]
            })],
            max_tokens: self.config.max_tokens,
        }
    }
}

/// Pull the assistant text out of a chat-completions body
fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AnalysisError::InvalidResponse("no choices in response".into()))
}

#[async_trait]
impl Analyzer for OpenRouterAnalyzer {
    fn preflight(&self) -> Result<(), PipelineError> {
        self.config.api_key()?;
        Ok(())
    }

    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    async fn analyze(&self, frame: &Frame) -> Result<String, AnalysisError> {
        let api_key = self.config.api_key().map_err(|e| match e {
            ConfigError::MissingCredential(name) => AnalysisError::MissingCredential(name),
            other => AnalysisError::Transport(other.to_string()),
        })?;

        let png = {
            let frame = frame.clone();
            tokio::task::spawn_blocking(move || encode_png(&frame))
                .await
                .map_err(|e| AnalysisError::Encode(e.to_string()))?
                .map_err(|e| AnalysisError::Encode(e.to_string()))?
        };
        debug!("Encoded frame as {} byte PNG", png.len());

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(&png))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(self.config.timeout())
                } else {
                    AnalysisError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AnalysisError::Http {
                status: status.as_u16(),
                body,
            });
        }

        extract_content(&body)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
