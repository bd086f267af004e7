//! The solve-and-submit loop.
//!
//! Each run is a small state machine: `Running` advances one challenge
//! stage per iteration until the server says stop, a stage fails, or the
//! step budget runs out.

use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::executor::{SandboxExecutor, ScriptRunner};
use crate::model::{LanguageModel, OpenAIModel};
use crate::render::{ChromeRenderer, Renderer};
use crate::submit::{resolve_url, ServerVerdict, SubmissionController};
use crate::synthesize::Synthesizer;

/// Position of a running agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    pub current_url: String,
    /// Iterations already completed.
    pub step: usize,
    pub step_limit: usize,
}

#[derive(Debug)]
pub enum AgentState {
    Running(LoopState),
    Done(Outcome),
}

impl AgentState {
    pub fn start(url: impl Into<String>, step_limit: usize) -> Self {
        AgentState::Running(LoopState {
            current_url: url.into(),
            step: 0,
            step_limit,
        })
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The last answer was correct and no further stage was offered.
    Success { steps: usize, last_url: String },
    Failure { steps: usize, reason: FailureReason },
}

#[derive(Debug)]
pub enum FailureReason {
    /// A pipeline stage failed (render, model, decision or submission).
    Stage(Error),
    /// The server rejected the answer.
    Incorrect { url: String, reason: Option<String> },
    /// The server kept handing out stages past the step limit.
    BudgetExhausted { next_url: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn steps(&self) -> usize {
        match self {
            Outcome::Success { steps, .. } | Outcome::Failure { steps, .. } => *steps,
        }
    }
}

pub struct Agent {
    config: Arc<AgentConfig>,
    renderer: Arc<dyn Renderer>,
    synthesizer: Synthesizer,
    executor: Arc<dyn ScriptRunner>,
    submitter: SubmissionController,
}

impl Agent {
    pub fn new(
        config: Arc<AgentConfig>,
        renderer: Arc<dyn Renderer>,
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn ScriptRunner>,
    ) -> Result<Self> {
        let synthesizer = Synthesizer::new(
            model.clone(),
            config.model.code_model.clone(),
            config.self_report_shortcut,
        );
        let submitter = SubmissionController::new(model, config.clone())?;
        Ok(Self {
            config,
            renderer,
            synthesizer,
            executor,
            submitter,
        })
    }

    /// Wire up Chrome, the configured model endpoint and the sandbox.
    pub fn from_config(config: Arc<AgentConfig>) -> Result<Self> {
        let renderer = Arc::new(ChromeRenderer::new(config.browser.clone()));
        let model = Arc::new(OpenAIModel::new(config.model.clone())?);
        let executor = Arc::new(SandboxExecutor::new(
            config.interpreter.clone(),
            config.execution_timeout,
        ));
        Self::new(config, renderer, model, executor)
    }

    /// Run a fresh state machine from `start_url` to a terminal outcome.
    pub async fn run(&self, start_url: &str) -> Outcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("agent_run", %run_id);
        async {
            info!(start_url, max_steps = self.config.max_steps, "agent started");
            let mut state = AgentState::start(start_url, self.config.max_steps);
            loop {
                state = match state {
                    AgentState::Running(current) => self.advance(current).await,
                    AgentState::Done(outcome) => {
                        log_outcome(&outcome);
                        return outcome;
                    }
                };
            }
        }
        .instrument(span)
        .await
    }

    /// Perform one transition.
    pub async fn advance(&self, state: LoopState) -> AgentState {
        if state.step >= state.step_limit {
            return AgentState::Done(Outcome::Failure {
                steps: state.step,
                reason: FailureReason::BudgetExhausted {
                    next_url: state.current_url,
                },
            });
        }

        let steps = state.step + 1;
        let span = info_span!("step", step = steps, url = %state.current_url);
        let verdict = match self.iterate(&state.current_url).instrument(span).await {
            Ok(verdict) => verdict,
            Err(e) => {
                return AgentState::Done(Outcome::Failure {
                    steps,
                    reason: FailureReason::Stage(e),
                })
            }
        };

        if !verdict.correct {
            return AgentState::Done(Outcome::Failure {
                steps,
                reason: FailureReason::Incorrect {
                    url: state.current_url,
                    reason: verdict.reason,
                },
            });
        }

        match verdict.next_url {
            None => AgentState::Done(Outcome::Success {
                steps,
                last_url: state.current_url,
            }),
            Some(next) => match resolve_url(&state.current_url, &next) {
                Ok(next) => {
                    info!(step = steps, next_url = %next, "answer accepted, moving on");
                    AgentState::Running(LoopState {
                        current_url: next.to_string(),
                        step: steps,
                        step_limit: state.step_limit,
                    })
                }
                Err(e) => AgentState::Done(Outcome::Failure {
                    steps,
                    reason: FailureReason::Stage(e),
                }),
            },
        }
    }

    async fn iterate(&self, url: &str) -> Result<ServerVerdict> {
        let snapshot = self.renderer.render(url).await?;
        info!(stage = "render", chars = snapshot.visible_text.len(), "page captured");

        let script = self
            .synthesizer
            .synthesize(&snapshot, url, &self.config.identity)
            .await?;

        let execution = self.executor.execute(&script).await;
        info!(
            stage = "execute",
            succeeded = execution.succeeded,
            timed_out = execution.timed_out,
            output = %truncate(&execution.output, 500),
            "script executed"
        );

        let verdict = self
            .submitter
            .decide_and_submit(&execution, &snapshot.visible_text, url)
            .await?;
        info!(
            stage = "submit",
            correct = verdict.correct,
            next_url = ?verdict.next_url,
            "verdict received"
        );
        Ok(verdict)
    }
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Success { steps, last_url } => {
            info!(steps, last_url = %last_url, "challenge completed")
        }
        Outcome::Failure { steps, reason } => match reason {
            FailureReason::Stage(e) => {
                error!(steps, stage = e.stage(), error = %e, "agent aborted")
            }
            FailureReason::Incorrect { url, reason } => {
                warn!(steps, url = %url, reason = ?reason, "answer rejected")
            }
            FailureReason::BudgetExhausted { next_url } => {
                warn!(steps, next_url = %next_url, "step budget exhausted")
            }
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
