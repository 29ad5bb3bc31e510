//! REST endpoints for the relay.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use super::mailbox::Mailbox;
use crate::messages::{Message, Sender};

/// Shared handler state.
#[derive(Clone)]
pub struct RelayState {
    pub mailbox: Arc<Mailbox>,
}

/// Build the relay router.
pub fn relay_routes(mailbox: Arc<Mailbox>) -> Router {
    let state = RelayState { mailbox };

    Router::new()
        .route("/health", get(health))
        .route(
            "/chat-messages/{session_id}",
            get(fetch_messages).post(post_message),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "quote-chat-relay"
    }))
}

#[derive(Debug, Deserialize)]
struct FetchQuery {
    since: Option<String>,
}

async fn fetch_messages(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    Query(query): Query<FetchQuery>,
) -> impl IntoResponse {
    let since = match query.since.as_deref().map(DateTime::parse_from_rfc3339) {
        None => None,
        Some(Ok(since)) => Some(since.with_timezone(&Utc)),
        Some(Err(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid since timestamp"})),
            );
        }
    };

    let messages = state.mailbox.fetch(&session_id, since).await;
    debug!(session_id = %session_id, count = messages.len(), "Relay fetch");
    (StatusCode::OK, Json(serde_json::json!(messages)))
}

#[derive(Debug, Deserialize)]
struct PostRequest {
    text: String,
    id: Option<String>,
    sender: Option<Sender>,
}

async fn post_message(
    State(state): State<RelayState>,
    Path(session_id): Path<String>,
    Json(body): Json<PostRequest>,
) -> impl IntoResponse {
    if body.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Message text is empty"})),
        );
    }

    let sender = body.sender.unwrap_or(Sender::Ai);
    let message = match body.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => Message::with_id(id, sender, body.text, &session_id),
        None => Message::local(sender, body.text, &session_id),
    };

    let stored = state.mailbox.deliver(&session_id, message).await;
    info!(session_id = %session_id, message_id = %stored.id, "Relay received reply");
    (StatusCode::CREATED, Json(serde_json::json!(stored)))
}
