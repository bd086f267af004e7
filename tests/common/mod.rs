#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_solver::{
    Agent, AgentConfig, Error, ExecutionResult, GeneratedScript, LanguageModel, ModelRequest,
    PageSnapshot, Renderer, Result, ScriptRunner,
};
use async_trait::async_trait;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};

pub const EMAIL: &str = "solver@example.com";
pub const SECRET: &str = "configured-secret";

/// Renderer that records every URL and serves canned page text.
#[derive(Default)]
pub struct ScriptedRenderer {
    pub visited: Mutex<Vec<String>>,
    pub fail: bool,
    pub notify: tokio::sync::Notify,
}

impl ScriptedRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, url: &str) -> Result<PageSnapshot> {
        self.visited.lock().unwrap().push(url.to_string());
        self.notify.notify_one();
        if self.fail {
            return Err(Error::NavigationError(format!("unreachable: {url}")));
        }
        Ok(PageSnapshot::text("Compute 2+2 and POST to /submit"))
    }
}

/// Model that writes a fixed script and replies to decision prompts with a
/// fixed decision.
pub struct ScriptedModel {
    pub decision: String,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(decision: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> Result<String> {
        let is_decision = request.model == "decision-model";
        self.requests.lock().unwrap().push(request);
        if is_decision {
            Ok(self.decision.clone())
        } else {
            Ok("```python\nprint(2 + 2)\n```".into())
        }
    }
}

/// Runner that returns a canned result instead of spawning anything.
pub struct CannedRunner {
    pub result: ExecutionResult,
    pub scripts: Mutex<Vec<GeneratedScript>>,
}

impl CannedRunner {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            scripts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScriptRunner for CannedRunner {
    async fn execute(&self, script: &GeneratedScript) -> ExecutionResult {
        self.scripts.lock().unwrap().push(script.clone());
        self.result.clone()
    }
}

/// Local submission endpoint that answers with queued verdicts (the last
/// one repeats) and records every payload.
#[derive(Clone)]
pub struct SubmissionTarget {
    pub base: String,
    pub received: Arc<Mutex<Vec<Value>>>,
    verdicts: Arc<Mutex<VecDeque<Value>>>,
}

impl SubmissionTarget {
    /// Replace the queued verdicts, e.g. once the target's own URL is known.
    pub fn set_verdicts(&self, verdicts: Vec<Value>) {
        *self.verdicts.lock().unwrap() = verdicts.into();
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[derive(Clone)]
struct TargetState {
    received: Arc<Mutex<Vec<Value>>>,
    verdicts: Arc<Mutex<VecDeque<Value>>>,
}

async fn submit_handler(State(state): State<TargetState>, Json(body): Json<Value>) -> Json<Value> {
    state.received.lock().unwrap().push(body);
    let mut verdicts = state.verdicts.lock().unwrap();
    let verdict = if verdicts.len() > 1 {
        verdicts.pop_front().unwrap()
    } else {
        verdicts.front().cloned().unwrap_or_else(|| json!({"correct": false}))
    };
    Json(verdict)
}

pub async fn spawn_target(verdicts: Vec<Value>) -> SubmissionTarget {
    let received = Arc::new(Mutex::new(Vec::new()));
    let verdicts = Arc::new(Mutex::new(VecDeque::from(verdicts)));
    let state = TargetState {
        received: received.clone(),
        verdicts: verdicts.clone(),
    };
    let router = Router::new()
        .route("/submit", post(submit_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    SubmissionTarget {
        base: format!("http://{addr}"),
        received,
        verdicts,
    }
}

pub fn config(max_steps: usize) -> Arc<AgentConfig> {
    let mut model = agentic_solver::ModelConfig::default();
    model.code_model = "code-model".into();
    model.decision_model = "decision-model".into();
    Arc::new(
        AgentConfig::builder()
            .identity(EMAIL, SECRET)
            .max_steps(max_steps)
            .submit_timeout(Duration::from_secs(5))
            .model(model)
            .build()
            .unwrap(),
    )
}

pub fn agent(
    config: Arc<AgentConfig>,
    renderer: Arc<ScriptedRenderer>,
    model: Arc<ScriptedModel>,
    runner: Arc<CannedRunner>,
) -> Agent {
    Agent::new(config, renderer, model, runner).unwrap()
}
