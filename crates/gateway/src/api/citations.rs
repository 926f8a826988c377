//! Citation endpoints.
//!
//! - `POST /v1/chat/citations`: store a message's citations
//! - `GET  /v1/chat/citations`: by `messageId`, or every message of a `threadId`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;

use fr_domain::citation::CitationRecord;

use super::auth::Principal;
use super::error::ApiError;
use crate::runtime::TurnError;
use crate::state::AppState;
use crate::store::MessageCitations;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCitationsBody {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub openai_message_id: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<CitationRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationsQuery {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/citations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<StoreCitationsBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    principal.require_write()?;
    let Json(body) = body?;

    let thread_id = required(body.thread_id, "threadId")?;
    let message_id = required(body.openai_message_id, "openaiMessageId")?;
    let citations = body
        .citations
        .ok_or_else(|| ApiError::Validation("citations is required".into()))?;

    state.turns.ensure_owner(&thread_id, &principal.user_id).await?;
    state.citations.upsert(&thread_id, &message_id, citations).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Citations stored successfully",
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/chat/citations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<CitationsQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let thread_id = query.thread_id.filter(|t| !t.trim().is_empty());
    let message_id = query.message_id.filter(|m| !m.trim().is_empty());

    if let Some(thread_id) = thread_id.as_deref() {
        state.turns.ensure_owner(thread_id, &principal.user_id).await?;
    }

    if let Some(message_id) = message_id {
        let found = match thread_id.as_deref() {
            Some(thread_id) => state.citations.get(thread_id, &message_id).await?,
            None => owned_match(&state, &principal, &message_id).await?,
        };
        let citations = found.map(|m| m.citations).unwrap_or_default();
        return Ok(Json(serde_json::json!({ "citations": citations })));
    }

    let Some(thread_id) = thread_id else {
        return Err(ApiError::Validation("threadId or messageId is required".into()));
    };
    let by_message = state.citations.list_for_thread(&thread_id).await?;
    Ok(Json(serde_json::json!({ "citations": by_message })))
}

/// The newest record for `message_id` in a thread the caller owns.  Records
/// that exist only in other users' threads read as not found.
async fn owned_match(
    state: &AppState,
    principal: &Principal,
    message_id: &str,
) -> Result<Option<MessageCitations>, ApiError> {
    let candidates = state.citations.list_for_message(message_id).await?;
    if candidates.is_empty() {
        return Ok(None);
    }
    for candidate in candidates {
        match state.turns.ensure_owner(&candidate.thread_id, &principal.user_id).await {
            Ok(()) => return Ok(Some(candidate)),
            Err(TurnError::ThreadNotFound) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::NotFound)
}
