//! Decide where an answer goes, post it, and read the server's verdict.

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use crate::config::{AgentConfig, Identity};
use crate::error::{Error, Result};
use crate::executor::ExecutionResult;
use crate::extract::{balanced_object_spans, extract_json, Extracted};
use crate::model::{LanguageModel, ModelRequest, PromptPart};

/// Keys the model may use for the submission target.
const TARGET_KEYS: &[&str] = &["post_url", "submit_url", "submission_url"];

/// The server's judgement of a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerVerdict {
    pub correct: bool,
    #[serde(default, rename = "url")]
    pub next_url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ServerVerdict {
    fn normalized(mut self) -> Self {
        if self.next_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.next_url = None;
        }
        self
    }
}

/// Where and what to post. Identity fields in `payload` always come from
/// process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionDecision {
    pub post_url: Url,
    pub payload: Map<String, Value>,
}

impl SubmissionDecision {
    /// Build a decision from the model's JSON reply.
    ///
    /// The target comes from one of the target keys, or failing that from a
    /// submit URL written in `task_text`, and is resolved against
    /// `current_url`. The payload is the `payload` object, or the rest of the
    /// reply when the model answered flat. `email` and `secret` are
    /// overwritten with `identity`; `url` and `answer` are filled in when the
    /// model left them out.
    pub fn from_reply(
        reply: &Map<String, Value>,
        current_url: &str,
        task_text: &str,
        execution_output: &str,
        identity: &Identity,
    ) -> Result<Self> {
        let target = TARGET_KEYS
            .iter()
            .find_map(|k| reply.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| submit_url_in(task_text))
            .ok_or_else(|| Error::Submission("no submission target in decision or page".into()))?;

        let post_url = resolve_url(current_url, target)?;

        let mut payload = match reply.get("payload") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(Error::Submission("payload is not an object".into())),
            None => {
                let mut flat = reply.clone();
                for key in TARGET_KEYS {
                    flat.remove(*key);
                }
                flat
            }
        };

        payload.insert("email".into(), Value::String(identity.email.clone()));
        payload.insert("secret".into(), Value::String(identity.secret.clone()));
        payload
            .entry("url")
            .or_insert_with(|| Value::String(current_url.to_string()));
        payload
            .entry("answer")
            .or_insert_with(|| answer_value(execution_output));

        Ok(Self { post_url, payload })
    }
}

/// First absolute submit endpoint mentioned in page text.
fn submit_url_in(text: &str) -> Option<&str> {
    let re = Regex::new(r"https?://[^\s]+submit").ok()?;
    re.find(text).map(|m| m.as_str())
}

/// Resolve a possibly relative target against the page it was found on.
pub fn resolve_url(base: &str, target: &str) -> Result<Url> {
    let base = Url::parse(base)
        .map_err(|e| Error::Submission(format!("current URL {base:?} is invalid: {e}")))?;
    let url = base
        .join(target)
        .map_err(|e| Error::Submission(format!("cannot resolve {target:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Submission(format!("unsupported submission scheme {other:?}"))),
    }
}

/// Script output as an answer: parsed JSON when it is JSON, text otherwise.
fn answer_value(output: &str) -> Value {
    let trimmed = output.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Look for a script's own report that it already submitted correctly.
///
/// Scripts often print what they sent before the server's reply, so every
/// object in the output is considered. The last one carrying a boolean
/// `correct` is the report, and only `true` counts.
pub fn self_reported_verdict(output: &str) -> Option<ServerVerdict> {
    let report = balanced_object_spans(output)
        .filter_map(|span| serde_json::from_str::<Map<String, Value>>(span).ok())
        .filter(|map| map.get("correct").is_some_and(Value::is_boolean))
        .last()?;
    if report.get("correct") != Some(&Value::Bool(true)) {
        return None;
    }
    serde_json::from_value::<ServerVerdict>(Value::Object(report))
        .ok()
        .map(ServerVerdict::normalized)
}

pub struct SubmissionController {
    http: reqwest::Client,
    model: Arc<dyn LanguageModel>,
    config: Arc<AgentConfig>,
}

impl SubmissionController {
    pub fn new(model: Arc<dyn LanguageModel>, config: Arc<AgentConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.submit_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, model, config })
    }

    /// Turn an execution result into a server verdict.
    pub async fn decide_and_submit(
        &self,
        execution: &ExecutionResult,
        task_text: &str,
        current_url: &str,
    ) -> Result<ServerVerdict> {
        if self.config.self_report_shortcut {
            if let Some(verdict) = self_reported_verdict(&execution.output) {
                info!(
                    url = current_url,
                    next_url = ?verdict.next_url,
                    "script reported its own correct submission"
                );
                return Ok(verdict);
            }
        }

        let decision = self.decide(execution, task_text, current_url).await?;
        self.submit(&decision).await
    }

    /// Ask the model where and what to submit.
    pub async fn decide(
        &self,
        execution: &ExecutionResult,
        task_text: &str,
        current_url: &str,
    ) -> Result<SubmissionDecision> {
        let request = ModelRequest::new(&self.config.model.decision_model)
            .with_part(PromptPart::text(decision_prompt(execution, task_text, current_url)))
            .with_temperature(0.0);
        let reply = self.model.complete(request).await?;

        let map = match extract_json(&reply) {
            Extracted::Object(map) => map,
            Extracted::NotFound => {
                return Err(Error::DecisionParse("no JSON object in model reply".into()))
            }
            Extracted::Malformed { reason, .. } => return Err(Error::DecisionParse(reason)),
        };

        let decision = SubmissionDecision::from_reply(
            &map,
            current_url,
            task_text,
            &execution.output,
            &self.config.identity,
        )?;
        info!(post_url = %decision.post_url, "submission decided");
        Ok(decision)
    }

    /// POST the payload and parse the verdict.
    pub async fn submit(&self, decision: &SubmissionDecision) -> Result<ServerVerdict> {
        let response = self
            .http
            .post(decision.post_url.clone())
            .json(&decision.payload)
            .send()
            .await
            .map_err(|e| Error::Submission(format!("POST {} failed: {e}", decision.post_url)))?;

        let status = response.status();
        let body = response.text().await?;
        info!(
            post_url = %decision.post_url,
            status = status.as_u16(),
            body = %body,
            "submission response"
        );

        match serde_json::from_str::<ServerVerdict>(&body) {
            Ok(verdict) => Ok(verdict.normalized()),
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "unreadable verdict");
                Err(Error::Submission(format!(
                    "server replied {status} without a usable verdict: {e}"
                )))
            }
        }
    }
}

fn decision_prompt(execution: &ExecutionResult, task_text: &str, current_url: &str) -> String {
    format!(
        r#"An analysis script was run to solve the task below.

Task page URL: {url}
Task page text:
"""
{task}
"""

Script output{status}:
"""
{output}
"""

Decide where the answer must be submitted and what to send.
- Resolve relative submission paths against the task page URL.
- Use the script output as the "answer" value, keeping its type (number, string, boolean or JSON object).
- Include any other fields the task asks for. Use "email" and "secret" as placeholders; they are filled in later.

Reply with ONLY this JSON object:
{{"post_url": "<absolute or relative URL>", "payload": {{"email": "", "secret": "", "url": "{url}", "answer": <answer>}}}}"#,
        url = current_url,
        task = task_text,
        output = execution.output.trim(),
        status = if execution.timed_out {
            " (the script timed out)"
        } else if !execution.succeeded {
            " (the script exited with an error)"
        } else {
            ""
        },
    )
}
