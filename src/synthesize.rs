//! Ask the model for a script that solves the rendered page.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Identity;
use crate::error::{Error, Result};
use crate::model::{LanguageModel, ModelRequest, PromptPart};
use crate::render::PageSnapshot;

const SYSTEM_PROMPT: &str = "You are a meticulous Python data analyst. \
You answer with a single runnable script and nothing else.";

/// Source text of a candidate analysis script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    pub source: String,
    /// False when the reply had no fenced block and was taken verbatim.
    pub fenced: bool,
}

pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    model_name: String,
    share_secret: bool,
}

impl Synthesizer {
    /// `share_secret` embeds the shared secret so the script can submit on
    /// its own; otherwise only the email is disclosed.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        model_name: impl Into<String>,
        share_secret: bool,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            share_secret,
        }
    }

    pub async fn synthesize(
        &self,
        snapshot: &PageSnapshot,
        current_url: &str,
        identity: &Identity,
    ) -> Result<GeneratedScript> {
        let prompt = build_prompt(snapshot, current_url, identity, self.share_secret);
        let mut request = ModelRequest::new(&self.model_name)
            .with_system(SYSTEM_PROMPT)
            .with_part(PromptPart::text(prompt));
        if let Some(image) = &snapshot.screenshot {
            request = request
                .with_part(PromptPart::text(
                    "A screenshot of the page follows, in case the task is only visible there.",
                ))
                .with_part(PromptPart::jpeg(image.clone()));
        }

        let reply = self.model.complete(request).await?;
        let script = extract_code_block(&reply);
        if script.source.trim().is_empty() {
            return Err(Error::ModelError("model returned an empty script".into()));
        }
        if !script.fenced {
            warn!(url = current_url, "no fenced code block in reply, using raw reply as script");
        }
        info!(url = current_url, lines = script.source.lines().count(), "script synthesized");
        Ok(script)
    }
}

fn build_prompt(
    snapshot: &PageSnapshot,
    current_url: &str,
    identity: &Identity,
    share_secret: bool,
) -> String {
    let secret_line = if share_secret {
        format!("- Secret: {}\n", identity.secret)
    } else {
        String::new()
    };
    format!(
        r#"Here is the visible text of a task page:

"""
{text}
"""

Page URL (resolve every relative link against it): {url}

Identity to use wherever the task asks for it (these are real values, not placeholders):
- Email: {email}
{secret_line}
Write a COMPLETE Python script that:
1. Finds the question and any data source it references.
2. Downloads and processes that data itself (requests, pandas, etc.) and computes the answer. Never just echo the page text.
3. Prints the final answer to stdout. If the answer is structured, print valid JSON.

Rules:
- Do not use input().
- Do not use browser automation (selenium, playwright); the script runs without a browser.
- Reply with exactly one ```python fenced code block and nothing else."#,
        text = snapshot.visible_text,
        url = current_url,
        email = identity.email,
        secret_line = secret_line,
    )
}

/// Take the first fenced code block out of a model reply.
///
/// Accepts `python`, `py` or untagged fences. Without any fence the whole
/// reply is returned as-is with `fenced == false`.
pub fn extract_code_block(reply: &str) -> GeneratedScript {
    if let Some(open) = reply.find("```") {
        let after_fence = &reply[open + 3..];
        // Skip the info string up to the end of the opening line.
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        if let Some(close) = body.find("```") {
            return GeneratedScript {
                source: body[..close].trim_end().to_string() + "\n",
                fenced: true,
            };
        }
    }
    GeneratedScript {
        source: reply.trim().to_string(),
        fenced: false,
    }
}
