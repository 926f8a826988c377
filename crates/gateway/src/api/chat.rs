//! Chat endpoints.
//!
//! - `POST /v1/chat/turn`: run one turn; SSE of wire events, or
//!   `{messages}` when `streaming` is false
//! - `GET /v1/chat/messages`: thread history with `[n]` citation markers

use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use futures_util::stream::Stream;
use serde::Deserialize;

use fr_domain::wire::{encode_payload, MessageList, WireEvent};

use super::auth::Principal;
use super::error::ApiError;
use crate::runtime::TurnRequest;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields are optional so a missing one is reported by name rather than
/// as a generic deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnBody {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub streaming: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    #[serde(default)]
    pub thread_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn turn(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<TurnBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    principal.require_write()?;
    let Json(body) = body?;

    let req = TurnRequest {
        thread_id: body.thread_id.unwrap_or_default(),
        user_id: principal.user_id,
        message: body.message.unwrap_or_default(),
        assistant_id: body.assistant_id.unwrap_or_default(),
    };

    if !body.streaming.unwrap_or(true) {
        let messages = state.turns.run_blocking(req).await?;
        return Ok(Json(MessageList { messages }).into_response());
    }

    let rx = state.turns.start(req).await?;
    Ok(Sse::new(make_sse_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// One `data:` frame per wire event.  The stream ends when the turn task
/// drops its sender, right after the terminal event.
fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<WireEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(Event::default().data(encode_payload(&event)));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/chat/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ThreadQuery>, QueryRejection>,
) -> Result<Json<MessageList>, ApiError> {
    let Query(query) = query?;
    let thread_id = query
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("threadId is required".into()))?;

    let messages = state.turns.history(&thread_id, &principal.user_id).await?;
    Ok(Json(MessageList { messages }))
}
