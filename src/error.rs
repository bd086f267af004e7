use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid secret")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotError(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Model call failed: {0}")]
    ModelError(String),

    #[error("Could not parse submission decision: {0}")]
    DecisionParse(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// True for failures raised while loading or reading a page.
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            Error::LaunchError(_)
                | Error::NavigationError(_)
                | Error::ElementNotFound(_)
                | Error::Timeout(_)
                | Error::JsError(_)
                | Error::ScreenshotError(_)
                | Error::CdpError(_)
        )
    }

    /// Short stage label used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Unauthorized | Error::InvalidRequest(_) => "trigger",
            Error::Config(_) => "config",
            Error::ModelError(_) => "model",
            Error::DecisionParse(_) => "decide",
            Error::Submission(_) | Error::Http(_) => "submit",
            Error::IoError(_) => "io",
            _ => "render",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
