//! The message list a chat UI renders, and the reducer that folds wire
//! events into it.

use fr_domain::citation::{CitationRecord, SourceInfo};
use fr_domain::wire::{HistoryMessage, WireEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One rendered bubble.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Local id (`temp-…`) until the provider id is known.
    pub id: String,
    pub role: Role,
    pub content: String,
    pub citations: Vec<CitationRecord>,
    pub sources: Vec<SourceInfo>,
    pub openai_message_id: Option<String>,
    /// Unix seconds; 0 for local bubbles.
    pub created_at: i64,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::local(id, Role::User, content)
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::local(id, Role::Assistant, content)
    }

    fn local(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            citations: Vec::new(),
            sources: Vec::new(),
            openai_message_id: None,
            created_at: 0,
        }
    }
}

impl From<&HistoryMessage> for ChatMessage {
    fn from(m: &HistoryMessage) -> Self {
        let role = if m.role == "user" { Role::User } else { Role::Assistant };
        Self {
            id: m.id.clone(),
            role,
            content: m.content.clone(),
            citations: Vec::new(),
            sources: Vec::new(),
            openai_message_id: (role == Role::Assistant).then(|| m.id.clone()),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    /// Current step label of the in-flight turn.
    pub step: Option<String>,
}

impl ChatView {
    pub fn push_user(&mut self, id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(id, content));
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        let id = format!("error-{}", uuid::Uuid::new_v4());
        self.messages.push(ChatMessage::assistant(id, text));
    }

    /// Replace the view with a provider listing.  Listings come newest
    /// first, so they are reversed into chronological order.
    pub fn replace_with_history(&mut self, newest_first: &[HistoryMessage]) {
        self.messages = newest_first.iter().rev().map(ChatMessage::from).collect();
    }

    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

/// How a turn ended, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    Failed(String),
}

/// Per-turn reducer state: which bubble the turn is writing into.
#[derive(Debug, Default)]
pub struct TurnCursor {
    bubble: Option<usize>,
}

impl TurnCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the view.  Returns the settlement on a terminal
    /// event.
    pub fn apply(&mut self, view: &mut ChatView, event: &WireEvent) -> Option<Settlement> {
        match event {
            WireEvent::Update(update) => {
                if !update.step.is_empty() {
                    view.step = Some(update.step.clone());
                }
                let idx = match self.bubble {
                    Some(idx) => idx,
                    // No bubble until there is something to show.
                    None if update.content.is_empty() => return None,
                    None => {
                        let id = format!("temp-{}", uuid::Uuid::new_v4());
                        view.messages.push(ChatMessage::assistant(id, ""));
                        let idx = view.messages.len() - 1;
                        self.bubble = Some(idx);
                        idx
                    }
                };
                if let Some(bubble) = view.messages.get_mut(idx) {
                    bubble.content = update.content.clone();
                    bubble.citations = update.citation_data.clone();
                    bubble.sources = update.sources.clone();
                    if let Some(id) = &update.openai_message_id {
                        bubble.openai_message_id = Some(id.clone());
                    }
                }
                None
            }
            WireEvent::Done => Some(Settlement::Completed),
            WireEvent::Error { error } => {
                view.push_error(error.clone());
                Some(Settlement::Failed(error.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fr_domain::citation::CitationStub;
    use fr_domain::wire::TurnUpdate;

    fn update(content: &str, step: &str) -> WireEvent {
        WireEvent::Update(TurnUpdate {
            content: content.into(),
            step: step.into(),
            ..Default::default()
        })
    }

    #[test]
    fn bubble_appears_only_with_content() {
        let mut view = ChatView::default();
        let mut cursor = TurnCursor::new();

        assert_eq!(cursor.apply(&mut view, &update("", "PROCESSING...")), None);
        assert!(view.messages.is_empty());
        assert_eq!(view.step.as_deref(), Some("PROCESSING..."));

        cursor.apply(&mut view, &update("Hel", "GENERATING RESPONSE..."));
        cursor.apply(&mut view, &update("Hello", "GENERATING RESPONSE..."));
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].content, "Hello");
        assert_eq!(view.messages[0].role, Role::Assistant);
    }

    #[test]
    fn final_update_carries_citations() {
        let mut view = ChatView::default();
        let mut cursor = TurnCursor::new();
        let final_update = WireEvent::Update(TurnUpdate {
            content: "Torque is 12 Nm [1]".into(),
            step: "COMPLETE".into(),
            citation_data: vec![CitationStub::new(1, "file_1", "12 Nm").into()],
            openai_message_id: Some("msg_1".into()),
            ..Default::default()
        });

        cursor.apply(&mut view, &final_update);
        assert_eq!(cursor.apply(&mut view, &WireEvent::Done), Some(Settlement::Completed));

        let bubble = view.last_assistant().unwrap();
        assert_eq!(bubble.citations.len(), 1);
        assert_eq!(bubble.openai_message_id.as_deref(), Some("msg_1"));
    }

    #[test]
    fn error_appends_bubble_with_text() {
        let mut view = ChatView::default();
        let mut cursor = TurnCursor::new();
        let out = cursor.apply(&mut view, &WireEvent::error("ASSISTANT RUN FAILED: rate_limit_exceeded"));

        assert_eq!(
            out,
            Some(Settlement::Failed("ASSISTANT RUN FAILED: rate_limit_exceeded".into()))
        );
        assert_eq!(view.messages[0].content, "ASSISTANT RUN FAILED: rate_limit_exceeded");
    }

    #[test]
    fn history_is_reversed_to_chronological() {
        let listing = vec![
            HistoryMessage { id: "m2".into(), role: "assistant".into(), content: "b".into(), created_at: 2 },
            HistoryMessage { id: "m1".into(), role: "user".into(), content: "a".into(), created_at: 1 },
        ];
        let mut view = ChatView::default();
        view.replace_with_history(&listing);
        assert_eq!(view.messages[0].id, "m1");
        assert_eq!(view.messages[0].role, Role::User);
        assert_eq!(view.messages[1].openai_message_id.as_deref(), Some("m2"));
    }
}
