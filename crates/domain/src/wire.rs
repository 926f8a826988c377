//! The wire protocol between the gateway and chat clients.
//!
//! Each [`WireEvent`] travels as one SSE frame: `data: <json>\n\n`.  A turn
//! produces any number of `update` frames followed by exactly one `done` or
//! `error` frame.

use serde::{Deserialize, Serialize};

use crate::citation::{CitationRecord, SourceInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireEvent {
    Update(TurnUpdate),
    Done,
    Error { error: String },
}

/// Snapshot of the assistant bubble at one point in the turn.
///
/// `content` is the full accumulated text, not a delta, so a client can
/// replace its bubble wholesale on every frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnUpdate {
    pub content: String,
    /// Display strings of the form `"[n] quote"`.
    pub citations: Vec<String>,
    pub step: String,
    pub citation_data: Vec<CitationRecord>,
    pub openai_message_id: Option<String>,
    pub sources: Vec<SourceInfo>,
}

/// One thread message as returned by history listings and blocking turns.
///
/// Assistant text already has its citation placeholders rewritten to `[n]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// Body of a non-streaming turn response and of the history listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageList {
    pub messages: Vec<HistoryMessage>,
}

impl WireEvent {
    pub fn error(message: impl Into<String>) -> Self {
        WireEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WireEvent::Update(_))
    }

    /// Parse the JSON payload of one `data:` line.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Copy of this event with control characters stripped from every
    /// free-text field.
    pub fn sanitized(&self) -> Self {
        match self {
            WireEvent::Update(u) => WireEvent::Update(TurnUpdate {
                content: strip_control(&u.content),
                citations: u.citations.iter().map(|c| strip_control(c)).collect(),
                step: strip_control(&u.step),
                citation_data: u
                    .citation_data
                    .iter()
                    .map(|c| CitationRecord {
                        quote: strip_control(&c.quote),
                        file_name: c.file_name.as_deref().map(strip_control),
                        full_chunk_content: c.full_chunk_content.as_deref().map(strip_control),
                        ..c.clone()
                    })
                    .collect(),
                openai_message_id: u.openai_message_id.clone(),
                sources: u
                    .sources
                    .iter()
                    .map(|s| SourceInfo {
                        document_name: strip_control(&s.document_name),
                        ..s.clone()
                    })
                    .collect(),
            }),
            WireEvent::Done => WireEvent::Done,
            WireEvent::Error { error } => WireEvent::error(strip_control(error)),
        }
    }

    /// Last-resort payload built from a JSON value, which cannot fail to
    /// serialize.  Carries only the text fields.
    fn minimal_json(&self) -> String {
        let value = match self {
            WireEvent::Update(u) => serde_json::json!({
                "type": "update",
                "content": u.content,
                "citations": u.citations,
                "step": u.step,
                "citationData": [],
                "openaiMessageId": u.openai_message_id,
                "sources": [],
            }),
            WireEvent::Done => serde_json::json!({ "type": "done" }),
            WireEvent::Error { error } => serde_json::json!({ "type": "error", "error": error }),
        };
        value.to_string()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Encoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Serialize an event to its JSON payload.  Never drops the frame: a
/// failure falls back to a sanitized copy.
pub fn encode_payload(event: &WireEvent) -> String {
    encode_payload_with(event, serde_json::to_string)
}

/// Like [`encode_payload`] with a caller-supplied serializer.
pub fn encode_payload_with<F>(event: &WireEvent, serialize: F) -> String
where
    F: Fn(&WireEvent) -> serde_json::Result<String>,
{
    match serialize(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "wire event failed to serialize, sending sanitized payload");
            let sanitized = event.sanitized();
            serialize(&sanitized).unwrap_or_else(|_| sanitized.minimal_json())
        }
    }
}

/// Full SSE frame for an event: `data: <json>\n\n`.
pub fn to_frame(event: &WireEvent) -> String {
    format!("data: {}\n\n", encode_payload(event))
}

/// Remove C0 and C1 control characters (U+0000..U+001F, U+007F..U+009F).
pub fn strip_control(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
