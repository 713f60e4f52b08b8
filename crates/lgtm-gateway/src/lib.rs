//! HTTP ingress for the slash command.
//!
//! The handler does only the fast synchronous work: verify, deduplicate,
//! resolve the invoker's locale, enqueue the deferred job, and acknowledge.
//! The pipeline itself runs later from the queue consumer.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use lgtm_runtime::{
    is_help_request, please_wait_text, usage_text, CommandJob, DuplicateEventGuard, JobDispatcher,
    SlashCommand, COMMAND_JOB_NAME,
};
use lgtm_slack::SlackApiClient;

pub const SLASH_COMMAND_ENDPOINT: &str = "/slack/command";
pub const HEALTH_ENDPOINT: &str = "/healthz";

/// Command name assumed when the envelope omits one.
const DEFAULT_COMMAND: &str = "/lgtm";

#[derive(Clone)]
/// Shared state behind the ingress routes.
pub struct GatewayState {
    pub verification_token: Option<String>,
    pub guard: Arc<DuplicateEventGuard>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub slack: Arc<SlackApiClient>,
}

#[derive(Debug, Deserialize)]
/// Form-encoded slash-command envelope as delivered by the chat platform.
pub struct SlashCommandForm {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    trigger_id: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    text: String,
    user_id: String,
    channel_id: String,
    #[serde(default)]
    channel_name: String,
    #[serde(default)]
    response_url: String,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(SLASH_COMMAND_ENDPOINT, post(handle_slash_command))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

/// Binds `bind_addr` and serves the ingress router until the task is
/// cancelled or the listener fails.
pub async fn serve(bind_addr: &str, state: GatewayState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, build_router(state))
        .await
        .context("gateway server failed")
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_slash_command(
    State(state): State<GatewayState>,
    Form(form): Form<SlashCommandForm>,
) -> Response {
    if let Some(expected) = state.verification_token.as_deref() {
        if form.token.as_deref() != Some(expected) {
            return (StatusCode::UNAUTHORIZED, "invalid verification token").into_response();
        }
    }

    // Duplicate delivery of an already-processed envelope gets a silent,
    // empty acknowledgment.
    if let Some(trigger_id) = form.trigger_id.as_deref() {
        if !state.guard.accept(trigger_id) {
            return StatusCode::OK.into_response();
        }
    }

    let command = SlashCommand {
        text: form.text,
        user_id: form.user_id,
        channel_id: form.channel_id,
        channel_name: form.channel_name,
        command: form
            .command
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
        response_url: form.response_url,
    };

    let locale = match state.slack.users_info(&command.user_id).await {
        Ok(user) => user.locale,
        Err(error) => {
            tracing::warn!(user = %command.user_id, "locale lookup failed: {error}");
            None
        }
    };

    if is_help_request(&command.text) {
        return ephemeral(usage_text(&command.command, locale.as_deref()));
    }

    let wait_text = please_wait_text(locale.as_deref()).to_string();
    let job = CommandJob { command, locale };
    let data = match serde_json::to_value(&job) {
        Ok(data) => data,
        Err(error) => {
            tracing::error!("failed to serialize command job: {error}");
            return ephemeral(lgtm_runtime::generic_failure_text().to_string());
        }
    };
    if let Err(error) = state.dispatcher.enqueue(COMMAND_JOB_NAME, data) {
        tracing::error!("failed to enqueue command job: {error:#}");
        return ephemeral(lgtm_runtime::generic_failure_text().to_string());
    }

    ephemeral(wait_text)
}

fn ephemeral(text: String) -> Response {
    Json(json!({
        "response_type": "ephemeral",
        "text": text,
    }))
    .into_response()
}
