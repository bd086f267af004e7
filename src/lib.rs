pub mod agent;
pub mod browser;
pub mod config;
pub mod element;
pub mod error;
pub mod executor;
pub mod extract;
pub mod model;
pub mod page;
pub mod render;
pub mod server;
pub mod submit;
pub mod synthesize;

pub use agent::{Agent, AgentState, FailureReason, LoopState, Outcome};
pub use config::{AgentConfig, BrowserConfig, Identity, ModelConfig};
pub use error::{Error, Result};
pub use executor::{ExecutionResult, SandboxExecutor, ScriptRunner};
pub use extract::{extract_json, Extracted};
pub use model::{LanguageModel, ModelRequest, PromptPart};
pub use render::{ChromeRenderer, PageSnapshot, Renderer};
pub use submit::{ServerVerdict, SubmissionController, SubmissionDecision};
pub use synthesize::{GeneratedScript, Synthesizer};
