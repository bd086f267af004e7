//! HTTP front door: accept a start request and launch the agent in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::error::{Error, Result};

/// Body of `POST /analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct Acknowledgement {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Clone)]
pub struct ServeState {
    config: Arc<AgentConfig>,
    agent: Arc<Agent>,
}

impl ServeState {
    pub fn new(config: Arc<AgentConfig>, agent: Arc<Agent>) -> Self {
        Self { config, agent }
    }
}

pub fn router(state: ServeState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: ServeState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "trigger endpoint listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn analyze_handler(
    State(state): State<ServeState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<Acknowledgement>> {
    // Secret first: nothing else about the request is looked at before it passes.
    if !state.config.identity.verify_secret(&request.secret) {
        warn!(email = %request.email, "start request rejected: bad secret");
        return Err(Error::Unauthorized);
    }

    let start_url = validate_start_url(&request.url)?;
    info!(email = %request.email, url = %start_url, "start request accepted");

    let agent = state.agent.clone();
    tokio::spawn(async move {
        agent.run(start_url.as_str()).await;
    });

    Ok(Json(Acknowledgement {
        message: "Agent activated",
        status: "ok",
    }))
}

fn validate_start_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::InvalidRequest(format!("url {raw:?} is not valid: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::InvalidRequest(format!("unsupported url scheme {other:?}"))),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &self {
            Error::Unauthorized => "Invalid secret".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_url_must_be_http() {
        assert!(validate_start_url("https://quiz.example/start").is_ok());
        assert!(validate_start_url(" http://localhost:8080/q ").is_ok());
        assert!(matches!(
            validate_start_url("ftp://quiz.example/"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(validate_start_url("/relative"), Err(Error::InvalidRequest(_))));
    }
}
