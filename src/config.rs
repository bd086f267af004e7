use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Identity stamped onto every submission. Sourced from process
/// configuration only; model output never overrides it.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

impl Identity {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }

    /// Check a caller-supplied secret against the configured one.
    ///
    /// Runs in time independent of where the first mismatch is.
    pub fn verify_secret(&self, candidate: &str) -> bool {
        let expected = self.secret.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// Trim Chrome's memory and CPU footprint (small containers, ARM boards).
    pub low_resource: bool,
    /// V8 heap cap passed through `--js-flags`. Low-resource mode uses 256 MB
    /// when this is unset.
    pub js_heap_size_mb: Option<u32>,
    /// Upper bound for navigation, network quiescence and the `body` wait.
    pub load_timeout: Duration,
    /// How long the resource count must stay unchanged to count as idle.
    pub network_idle: Duration,
    /// Fixed pause after quiescence so deferred scripts can finish.
    pub settle_delay: Duration,
    pub capture_screenshot: bool,
    /// JPEG quality, 0-100.
    pub screenshot_quality: u8,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 900,
            chrome_path: None,
            low_resource: false,
            js_heap_size_mb: None,
            load_timeout: Duration::from_secs(15),
            network_idle: Duration::from_millis(500),
            settle_delay: Duration::from_secs(2),
            capture_screenshot: true,
            screenshot_quality: 40,
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn low_resource(mut self, enabled: bool) -> Self {
        self.config.low_resource = enabled;
        self
    }

    pub fn js_heap_size_mb(mut self, mb: u32) -> Self {
        self.config.js_heap_size_mb = Some(mb);
        self
    }

    /// Set the bound used for navigation, quiescence and the DOM readiness wait.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn capture_screenshot(mut self, enabled: bool) -> Self {
        self.config.capture_screenshot = enabled;
        self
    }

    pub fn screenshot_quality(mut self, quality: u8) -> Self {
        self.config.screenshot_quality = quality.min(100);
        self
    }

    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model that writes the analysis script.
    pub code_model: String,
    /// Model that decides where and what to submit.
    pub decision_model: String,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            code_model: "gpt-4o-mini".into(),
            decision_model: "gpt-4o".into(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("code_model", &self.code_model)
            .field("decision_model", &self.decision_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Process-wide agent configuration, built once at startup and shared by
/// reference with the orchestrator and the submission controller.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub identity: Identity,
    pub max_steps: usize,
    pub execution_timeout: Duration,
    pub submit_timeout: Duration,
    /// Interpreter used to run generated scripts.
    pub interpreter: PathBuf,
    /// Accept a script's own `"correct": true` report instead of deliberating.
    pub self_report_shortcut: bool,
    pub model: ModelConfig,
    pub browser: BrowserConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            identity: Identity::new("", ""),
            max_steps: 5,
            execution_timeout: Duration::from_secs(60),
            submit_timeout: Duration::from_secs(30),
            interpreter: PathBuf::from("python3"),
            self_report_shortcut: true,
            model: ModelConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }
}

pub struct AgentBuilder {
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    pub fn identity(mut self, email: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.identity = Identity::new(email, secret);
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.config.max_steps = steps;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.config.execution_timeout = timeout;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.interpreter = path.into();
        self
    }

    pub fn self_report_shortcut(mut self, enabled: bool) -> Self {
        self.config.self_report_shortcut = enabled;
        self
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.config.browser = browser;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<AgentConfig> {
        let config = self.config;
        if config.identity.email.trim().is_empty() {
            return Err(Error::Config("caller email is not set".into()));
        }
        if config.identity.secret.is_empty() {
            return Err(Error::Config("shared secret is not set".into()));
        }
        if config.max_steps == 0 {
            return Err(Error::Config("max_steps must be at least 1".into()));
        }
        Ok(config)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_missing_identity() {
        let err = AgentConfig::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = AgentConfig::builder()
            .identity("me@example.com", "")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn builder_defaults() {
        let config = AgentConfig::builder()
            .identity("me@example.com", "s3cret")
            .build()
            .unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.execution_timeout, Duration::from_secs(60));
        assert!(config.self_report_shortcut);
        assert!(config.identity.verify_secret("s3cret"));
        assert!(!config.identity.verify_secret("S3cret"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut model = ModelConfig::default();
        model.api_key = Some("sk-live".into());
        let config = AgentConfig::builder()
            .identity("me@example.com", "hunter2")
            .model(model)
            .build()
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sk-live"));
        assert!(rendered.contains("me@example.com"));
    }

    #[test]
    fn secret_check_rejects_prefixes_and_extensions() {
        let identity = Identity::new("me@example.com", "s3cret");
        assert!(identity.verify_secret("s3cret"));
        assert!(!identity.verify_secret("s3cre"));
        assert!(!identity.verify_secret("s3cret!"));
        assert!(!identity.verify_secret("s3creT"));
        assert!(!identity.verify_secret(""));
    }

    #[test]
    fn js_heap_size_is_configurable() {
        assert_eq!(BrowserBuilder::new().build().js_heap_size_mb, None);
        let browser = BrowserBuilder::new().js_heap_size_mb(128).build();
        assert_eq!(browser.js_heap_size_mb, Some(128));
    }

    #[test]
    fn screenshot_quality_is_clamped() {
        let browser = BrowserBuilder::new().screenshot_quality(250).build();
        assert_eq!(browser.screenshot_quality, 100);
    }
}
