//! # Generative model collaborator
//!
//! The agent talks to its model through [`LanguageModel`], a single
//! request/response call. Replies are plain text with no guaranteed shape;
//! callers parse them defensively.

pub mod openai;

pub use openai::OpenAIModel;

use async_trait::async_trait;

use crate::error::Result;

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image { media_type: String, data: Vec<u8> },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        PromptPart::Text(text.into())
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        PromptPart::Image {
            media_type: "image/jpeg".into(),
            data,
        }
    }
}

/// A single-turn request: optional system instructions plus user parts.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub model: String,
    pub system: Option<String>,
    pub parts: Vec<PromptPart>,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Concatenated text parts, images skipped.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, PromptPart::Image { .. }))
    }
}

/// A text-producing model endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the request and return the reply text.
    async fn complete(&self, request: ModelRequest) -> Result<String>;
}
