//! HTTP surface: health endpoints and the streaming orchestrate endpoint.
//!
//! `POST /api/orchestrate` authenticates the caller, bootstraps the
//! session, enriches the prompt with the UI briefing, launches the
//! upstream run, and returns the relay's outbound events as SSE. A
//! drop-guard ties the response body's lifetime to the relay's
//! cancellation token, so a client disconnect stops further processing.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::config::SwitchboardConfig;
use crate::context::{build_prompt, ContextPackage};
use crate::relay::{RelayOptions, StreamRelay};
use crate::runtime::{user_context_text, AgentRuntime, LaunchRequest, RunSettings};
use crate::session::{resolve_session_key, SessionStore};

/// Shared application state, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SwitchboardConfig>,
    pub authenticator: Arc<dyn Authenticator>,
    pub sessions: Arc<dyn SessionStore>,
    pub runtime: Arc<dyn AgentRuntime>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/orchestrate", post(orchestrate))
        .layer(middleware::from_fn(permissive_cors))
        .with_state(state)
}

/// Error response for the JSON surface.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "orchestrate": "/api/orchestrate",
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "auth": if state.config.auth.disabled { "disabled" } else { "enabled" },
        "tools": state.runtime.tool_definitions().len(),
    }))
}

async fn orchestrate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(package): Json<ContextPackage>,
) -> Result<impl IntoResponse, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let user = state
        .authenticator
        .resolve_user(authorization)
        .map_err(|error| ApiError::unauthorized(error.to_string()))?;

    let session_key = resolve_session_key(package.session_id.as_deref(), &user.user_id);
    if let Err(error) = state.sessions.ensure_session(&session_key, &user.user_id).await {
        tracing::warn!(%session_key, %error, "could not ensure session row");
    }
    let session = state.sessions.open_handle(&session_key).await;
    if session.is_none() {
        tracing::warn!(%session_key, "continuing without session persistence");
    }

    tracing::info!(
        session_key = %session_key,
        user_id = %user.user_id,
        page = %package.page_context.path,
        interactive_elements = package
            .dom_snapshot
            .iter()
            .filter(|el| el.is_interactive)
            .count(),
        "starting orchestrated run"
    );

    let settings = RunSettings::builder()
        .maybe_model(state.config.upstream.model.clone())
        .user_context(user_context_text(&session_key, &user.user_id))
        .build();
    let launch = LaunchRequest::new(build_prompt(&package), session_key.clone())
        .with_history(package.formatted_history())
        .with_session(session)
        .with_tools(state.runtime.tool_definitions())
        .with_settings(settings);

    let cancel = CancellationToken::new();
    let disconnect_guard = cancel.clone().drop_guard();
    let options = RelayOptions::new(session_key, package.page_context.clone())
        .with_heartbeat(state.config.heartbeat())
        .with_cancel(cancel);
    let outbound = StreamRelay::new(options).run(state.runtime.clone(), launch);

    let body = async_stream::stream! {
        // Dropping the response body cancels the relay.
        let _disconnect_guard = disconnect_guard;
        let mut outbound = std::pin::pin!(outbound);
        while let Some(event) = outbound.next().await {
            yield Event::default().json_data(&event);
        }
    };
    Ok(Sse::new(body))
}

/// Permissive CORS for browser clients; the bearer token is the actual
/// access control.
async fn permissive_cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return cors_headers(StatusCode::NO_CONTENT.into_response());
    }
    cors_headers(next.run(request).await)
}

fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, content-type"),
    );
    response
}
