#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use axum::Json;
use axum::Router;
use futures::StreamExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::AuthRequest;
use crate::domain::models::AuthResponse;
use crate::domain::models::ErrorResponse;
use crate::domain::models::Provider;
use crate::domain::models::RelayRequest;
use crate::domain::models::UNAUTHORIZED_BODY;
use crate::domain::services::relay::reencode;
use crate::domain::services::relay::PrestreamFailure;
use crate::domain::services::secrets_match;
use crate::domain::services::Credentials;
use crate::infrastructure::providers::gemini::Gemini;

/// HTTP failures of the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Server authentication not configured")]
    AuthNotConfigured,

    #[error("API Key not configured")]
    ApiKeyNotConfigured,

    #[error("{0}")]
    BadRequest(String),

    #[error("{}", .0.message)]
    Provider(PrestreamFailure),

    #[error("Internal server error")]
    Internal,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized | RelayError::InvalidPassword => {
                return StatusCode::UNAUTHORIZED;
            }
            RelayError::BadRequest(_) => return StatusCode::BAD_REQUEST,
            RelayError::Provider(failure) => {
                return StatusCode::from_u16(failure.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            }
            RelayError::AuthNotConfigured | RelayError::ApiKeyNotConfigured | RelayError::Internal => {
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Clients tell a refused credential apart by this exact plain body.
        if matches!(self, RelayError::Unauthorized) {
            return (status, UNAUTHORIZED_BODY).into_response();
        }
        if matches!(self, RelayError::ApiKeyNotConfigured) {
            return (status, self.to_string()).into_response();
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        return (status, Json(body)).into_response();
    }
}

pub struct RelayState {
    pub password: String,
    pub credentials: Option<Credentials>,
    pub provider: Arc<dyn Provider>,
    pub provider_configured: bool,
    pub history_window: usize,
    pub auth_failure_delay: Duration,
}

impl RelayState {
    pub fn from_config(provider: Arc<dyn Provider>, provider_configured: bool) -> Result<RelayState> {
        let mut secret = Config::get(ConfigKey::SessionSecret);
        if secret.is_empty() {
            secret = Config::get(ConfigKey::GeminiToken);
        }

        return Ok(RelayState {
            password: Config::get(ConfigKey::AccessPassword),
            credentials: Credentials::new(&secret),
            provider,
            provider_configured,
            history_window: Config::parse::<usize>(ConfigKey::HistoryWindow)?,
            auth_failure_delay: Config::millis(ConfigKey::AuthFailureDelay)?,
        });
    }
}

fn parse_bearer_token(auth_header: &str) -> Option<&str> {
    return auth_header
        .strip_prefix("Bearer ")
        .or_else(|| return auth_header.strip_prefix("bearer "));
}

fn authorize(state: &RelayState, headers: &HeaderMap) -> Result<(), RelayError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| return value.to_str().ok())
        .and_then(parse_bearer_token);

    let authorized = match (token, &state.credentials) {
        (Some(token), Some(credentials)) => credentials.verify(token),
        _ => false,
    };

    if !authorized {
        tracing::warn!("Rejected chat request without a valid credential");
        return Err(RelayError::Unauthorized);
    }

    return Ok(());
}

async fn auth(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Json<AuthResponse>, RelayError> {
    let req = match serde_json::from_slice::<AuthRequest>(&body) {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(error = %err, "Unreadable login request");
            time::sleep(state.auth_failure_delay / 2).await;
            return Err(RelayError::Internal);
        }
    };

    if state.password.is_empty() {
        tracing::error!("Login attempted but no access password is configured");
        return Err(RelayError::AuthNotConfigured);
    }
    let credentials = match &state.credentials {
        Some(credentials) => credentials,
        None => {
            tracing::error!("Login attempted but no session secret is configured");
            return Err(RelayError::AuthNotConfigured);
        }
    };

    if !secrets_match(&state.password, &req.password) {
        tracing::warn!("Rejected login attempt");
        time::sleep(state.auth_failure_delay).await;
        return Err(RelayError::InvalidPassword);
    }

    let token = credentials.issue().map_err(|err| {
        tracing::error!(error = ?err, "Failed to issue credential");
        return RelayError::Internal;
    })?;

    tracing::info!("Issued credential");
    return Ok(Json(AuthResponse { token }));
}

async fn chat(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    authorize(&state, &headers)?;

    if !state.provider_configured {
        tracing::error!("Chat requested but no Gemini token is configured");
        return Err(RelayError::ApiKeyNotConfigured);
    }

    let request = serde_json::from_slice::<RelayRequest>(&body)
        .map_err(|err| return RelayError::BadRequest(format!("Invalid request body: {err}")))?;
    if request.messages.is_empty() {
        return Err(RelayError::BadRequest("No messages to answer".to_string()));
    }

    let request = request.windowed(state.history_window);
    tracing::debug!(
        messages = request.messages.len(),
        search_enabled = request.search_enabled,
        "Relaying chat request"
    );

    let fragments = state.provider.stream(&request).await.map_err(|err| {
        tracing::error!(status = ?err.status, error = %err, "Provider failed before streaming");
        return RelayError::Provider(PrestreamFailure::classify(&err));
    })?;

    let events = reencode(fragments)
        .map(|event| return Ok::<SseEvent, Infallible>(SseEvent::default().data(event.payload())));

    return Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response());
}

pub fn router(state: Arc<RelayState>) -> Router {
    return Router::new()
        .route("/api/auth", post(auth))
        .route("/api/chat", post(chat))
        .with_state(state);
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?err, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Relay shutting down");
}

pub async fn start() -> Result<()> {
    let gemini = Arc::new(Gemini::default());
    let provider_configured = gemini.is_configured();
    if let Err(err) = gemini.health_check(Duration::from_secs(5)).await {
        tracing::warn!(error = ?err, "Gemini health check failed, chat requests may fail");
    }

    let state = RelayState::from_config(gemini, provider_configured)?;
    if state.password.is_empty() {
        tracing::warn!("No access password configured, logins will be refused");
    }
    if state.credentials.is_none() {
        tracing::warn!("No session secret or Gemini token configured, every credential will be refused");
    }

    let addr: SocketAddr = Config::get(ConfigKey::ListenAddress).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Relay listening");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    return Ok(());
}
