//! # agentic-solver
//!
//! Usage:
//!   agentic-solver serve --bind 0.0.0.0:8000
//!   agentic-solver run --url https://quiz.example/start
//!
//! Credentials come from flags or the environment (`AGENT_EMAIL`,
//! `AGENT_SECRET`, `OPENAI_API_KEY`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentic_solver::config::BrowserBuilder;
use agentic_solver::server::{self, ServeState};
use agentic_solver::{Agent, AgentConfig, ModelConfig};

#[derive(Parser)]
#[command(name = "agentic-solver")]
#[command(author, version, about = "Render, solve and submit chained web challenges")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: Settings,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept start requests over HTTP
    Serve {
        #[arg(long, env = "AGENT_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
    /// Solve a single challenge chain in the foreground
    Run {
        /// Start URL of the challenge
        #[arg(long)]
        url: String,
    },
}

#[derive(Args)]
struct Settings {
    /// Email submitted with every answer
    #[arg(long, global = true, env = "AGENT_EMAIL")]
    email: Option<String>,

    /// Shared secret callers must present and submissions carry
    #[arg(long, global = true, env = "AGENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(
        long,
        global = true,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    base_url: String,

    #[arg(long, global = true, env = "AGENT_CODE_MODEL", default_value = "gpt-4o-mini")]
    code_model: String,

    #[arg(long, global = true, env = "AGENT_DECISION_MODEL", default_value = "gpt-4o")]
    decision_model: String,

    /// Maximum challenge stages per run
    #[arg(long, global = true, default_value = "5")]
    max_steps: usize,

    /// Hard limit for a generated script, in seconds
    #[arg(long, global = true, default_value = "60")]
    exec_timeout: u64,

    /// Interpreter used for generated scripts
    #[arg(long, global = true, env = "AGENT_PYTHON", default_value = "python3")]
    python: PathBuf,

    /// Always deliberate, even when a script reports its own correct submission
    #[arg(long, global = true)]
    no_self_report: bool,

    #[arg(long, global = true, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Page load and settle bound, in seconds
    #[arg(long, global = true, default_value = "15")]
    load_timeout: u64,

    /// Skip the page screenshot sent alongside the text
    #[arg(long, global = true)]
    no_screenshot: bool,

    #[arg(long, global = true)]
    low_resource: bool,

    /// Cap on Chrome's JavaScript heap, in megabytes
    #[arg(long, global = true, env = "AGENT_JS_HEAP_MB")]
    js_heap_mb: Option<u32>,
}

impl Settings {
    fn into_config(self) -> Result<AgentConfig> {
        let mut browser = BrowserBuilder::new()
            .load_timeout(Duration::from_secs(self.load_timeout))
            .capture_screenshot(!self.no_screenshot)
            .low_resource(self.low_resource);
        if let Some(path) = self.chrome_path {
            browser = browser.chrome_path(path);
        }
        if let Some(mb) = self.js_heap_mb {
            browser = browser.js_heap_size_mb(mb);
        }

        let model = ModelConfig {
            api_key: self.api_key,
            base_url: self.base_url,
            code_model: self.code_model,
            decision_model: self.decision_model,
            ..ModelConfig::default()
        };

        let config = AgentConfig::builder()
            .identity(
                self.email.context("caller email missing (--email or AGENT_EMAIL)")?,
                self.secret.context("shared secret missing (--secret or AGENT_SECRET)")?,
            )
            .max_steps(self.max_steps)
            .execution_timeout(Duration::from_secs(self.exec_timeout))
            .interpreter(self.python)
            .self_report_shortcut(!self.no_self_report)
            .model(model)
            .browser(browser.build())
            .build()?;
        Ok(config)
    }
}

fn init_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Arc::new(cli.settings.into_config()?);
    if config.model.api_key.is_none() {
        tracing::warn!("no model API key configured");
    }
    let agent = Arc::new(Agent::from_config(config.clone())?);

    match cli.command {
        Commands::Serve { bind } => {
            server::serve(bind, ServeState::new(config, agent)).await?;
        }
        Commands::Run { url } => {
            let outcome = agent.run(&url).await;
            if !outcome.is_success() {
                anyhow::bail!("agent did not complete the challenge: {outcome:?}");
            }
            println!("Completed in {} step(s)", outcome.steps());
        }
    }

    Ok(())
}
