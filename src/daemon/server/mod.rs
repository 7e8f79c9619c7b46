// SPDX-License-Identifier: MIT

//! Webhook ingestion server
//!
//! Platform requests are acknowledged right away; trigger evaluation and
//! delivery run on a spawned task so slow sends never hold up the webhook.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::daemon::config::{DaemonConfig, SlackConfig, ZulipConfig};
use crate::daemon::cube::CubeCommand;
use crate::daemon::platform::slack::{
    classify, Routing, SlackClient, SlackPayload, SlackResponder, DM_REFUSAL, NOT_WHITELISTED,
};
use crate::daemon::platform::zulip::{ZulipClient, ZulipResponder, ZulipWebhook};
use crate::daemon::platform::handle_message;
use crate::engine::{TriggerRouter, ZdaemonError};

struct ZulipState {
    config: ZulipConfig,
    client: Arc<ZulipClient>,
}

struct SlackState {
    config: SlackConfig,
    client: Arc<SlackClient>,
}

/// Shared state behind every handler
pub struct AppState {
    router: Arc<TriggerRouter>,
    verification_token: Option<String>,
    cube: Option<Arc<CubeCommand>>,
    zulip: Option<ZulipState>,
    slack: Option<SlackState>,
}

impl AppState {
    pub fn new(config: &DaemonConfig, router: TriggerRouter) -> Self {
        Self {
            router: Arc::new(router),
            verification_token: config.verification_token.clone(),
            cube: config
                .cube
                .as_ref()
                .map(|c| Arc::new(CubeCommand::from_config(c))),
            zulip: config.zulip.as_ref().map(|c| ZulipState {
                config: c.clone(),
                client: Arc::new(ZulipClient::new(c)),
            }),
            slack: config.slack.as_ref().map(|c| SlackState {
                config: c.clone(),
                client: Arc::new(SlackClient::new(c)),
            }),
        }
    }

    fn authorized(&self, token: Option<&str>) -> bool {
        match &self.verification_token {
            None => true,
            Some(expected) => token == Some(expected.as_str()),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/zulip", post(zulip_webhook))
        .route("/api/slack", post(slack_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    config: &DaemonConfig,
    router: TriggerRouter,
) -> Result<(), ZdaemonError> {
    let state = Arc::new(AppState::new(config, router));
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "triggers": state.router.rules().len(),
        "zulip": state.zulip.is_some(),
        "slack": state.slack.is_some(),
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn zulip_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ZulipWebhook>,
) -> Response {
    if !state.authorized(payload.token.as_deref()) {
        log::warn!("Rejected Zulip webhook with bad token");
        return error_response(StatusCode::UNAUTHORIZED, "invalid token");
    }
    let Some(zulip) = &state.zulip else {
        return error_response(StatusCode::NOT_FOUND, "zulip is not configured");
    };

    if let Some((stream, ctx)) = payload.message.to_context(&zulip.config) {
        let responder = ZulipResponder::new(
            zulip.client.clone(),
            stream,
            ctx.instance.clone(),
            state.cube.clone(),
        );
        let router = state.router.clone();
        tokio::spawn(async move {
            let report = handle_message(&router, &ctx, &responder).await;
            if !report.is_clean() {
                log::warn!("Zulip dispatch finished with {} error(s)", report.errors.len());
            }
        });
    }

    Json(json!({ "response_not_required": true })).into_response()
}

async fn slack_events(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SlackPayload>,
) -> Response {
    if !state.authorized(payload.token()) {
        log::warn!("Rejected Slack event with bad token");
        return error_response(StatusCode::UNAUTHORIZED, "invalid token");
    }

    let event = match payload {
        SlackPayload::UrlVerification { challenge, .. } => {
            return Json(json!({ "challenge": challenge })).into_response();
        }
        SlackPayload::EventCallback { event, .. } => event,
        SlackPayload::Other => return StatusCode::OK.into_response(),
    };

    let Some(slack) = &state.slack else {
        return error_response(StatusCode::NOT_FOUND, "slack is not configured");
    };

    let client = slack.client.clone();
    match classify(&event, &slack.config) {
        Routing::Ignore => {}
        Routing::RefuseDm { channel } => {
            tokio::spawn(async move {
                if let Err(e) = client.post_message(&channel, DM_REFUSAL, None).await {
                    log::error!("Cannot refuse DM in {}: {}", channel, e);
                }
            });
        }
        Routing::NotWhitelisted { channel } => {
            tokio::spawn(async move {
                if let Err(e) = client.post_message(&channel, NOT_WHITELISTED, None).await {
                    log::error!("Cannot post whitelist notice in {}: {}", channel, e);
                }
            });
        }
        Routing::Route(message) => {
            let router = state.router.clone();
            let cube = state.cube.clone();
            tokio::spawn(async move {
                let sender = client.resolve_sender(&message).await;
                let ctx = message.to_context(sender);
                let responder = SlackResponder::new(client, &message, cube);
                let report = handle_message(&router, &ctx, &responder).await;
                if !report.is_clean() {
                    log::warn!("Slack dispatch finished with {} error(s)", report.errors.len());
                }
            });
        }
    }

    StatusCode::OK.into_response()
}
