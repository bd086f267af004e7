//! OpenAI-compatible chat completions client.
//!
//! Works with OpenAI and any server exposing `/chat/completions` with the
//! same request shape (vLLM, Ollama, gateways).

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{LanguageModel, ModelRequest, PromptPart};
use crate::config::ModelConfig;
use crate::error::{Error, Result};

pub struct OpenAIModel {
    client: Client,
    config: ModelConfig,
}

impl OpenAIModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    async fn complete(&self, request: ModelRequest) -> Result<String> {
        let model = request.model.clone();
        let api_request = OpenAIRequest::from(request);

        let mut req = self.client.post(self.endpoint()).json(&api_request);
        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.bearer_auth(api_key);
            }
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::ModelError(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => Error::ModelError("authentication failed".into()),
                429 => Error::ModelError("rate limited".into()),
                code => Error::ModelError(format!("API error ({code}): {text}")),
            });
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelError(format!("unparseable response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::ModelError("no content in response".into()))?;

        if let Some(usage) = api_response.usage {
            tracing::debug!(
                model = %model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "model call complete"
            );
        }

        Ok(content)
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl From<ModelRequest> for OpenAIRequest {
    fn from(request: ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(OpenAIMessage {
                role: "system".into(),
                content: OpenAIContent::Text(system),
            });
        }

        // Plain string content unless an image forces the parts form.
        let has_image = request
            .parts
            .iter()
            .any(|p| matches!(p, PromptPart::Image { .. }));
        let content = if has_image {
            OpenAIContent::Parts(request.parts.into_iter().map(OpenAIContentPart::from).collect())
        } else {
            let text = request
                .parts
                .into_iter()
                .filter_map(|p| match p {
                    PromptPart::Text(t) => Some(t),
                    PromptPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            OpenAIContent::Text(text)
        };
        messages.push(OpenAIMessage {
            role: "user".into(),
            content,
        });

        Self {
            model: request.model,
            messages,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

impl From<PromptPart> for OpenAIContentPart {
    fn from(part: PromptPart) -> Self {
        match part {
            PromptPart::Text(text) => OpenAIContentPart::Text { text },
            PromptPart::Image { media_type, data } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                OpenAIContentPart::ImageUrl {
                    image_url: OpenAIImageUrl {
                        url: format!("data:{media_type};base64,{encoded}"),
                    },
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
