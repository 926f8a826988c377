//! Thread message listing with citation placeholders rewritten.

use fr_domain::wire::HistoryMessage;
use fr_providers::ThreadMessage;

use super::normalizer::substitute_citations;
use super::turn::{TurnCoordinator, TurnError};

impl TurnCoordinator {
    /// The thread's messages, newest first.
    pub async fn history(&self, thread_id: &str, user_id: &str) -> Result<Vec<HistoryMessage>, TurnError> {
        self.ensure_owner(thread_id, user_id).await?;
        let messages = self
            .provider
            .list_messages(thread_id)
            .await
            .map_err(TurnError::Upstream)?;
        Ok(messages.iter().map(to_history).collect())
    }
}

/// Convert a provider message, numbering its citations from 1.
pub(super) fn to_history(message: &ThreadMessage) -> HistoryMessage {
    let (content, _) = substitute_citations(&message.text, &message.annotations, 1);
    HistoryMessage {
        id: message.id.clone(),
        role: message.role.clone(),
        content,
        created_at: message.created_at,
    }
}
