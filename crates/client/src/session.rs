//! Single-flight chat session.
//!
//! `send` aborts whatever turn is still running, then drives the new one to
//! a settlement.  Every view mutation is tagged with the generation of the
//! turn that made it, so a superseded turn can never touch the bubbles or
//! the loading flag of the turn that replaced it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use fr_domain::wire::WireEvent;

use crate::sse::SseDecoder;
use crate::transport::{TurnPayload, TurnResponse, TurnTransport};
use crate::view::{ChatView, Settlement, TurnCursor};

/// Shown when the body ends without a `done` or `error` event.
pub const STREAM_CLOSED_MESSAGE: &str = "Connection closed before the response completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The server reported an error, or the request failed.  The text is
    /// also in the view as an assistant bubble.
    Failed(String),
    /// Cancelled locally, by [`ChatSession::cancel`] or a newer send.
    Aborted,
    /// No settlement within the session timeout.  The upstream run is left
    /// alone.
    TimedOut,
}

impl From<Settlement> for TurnOutcome {
    fn from(s: Settlement) -> Self {
        match s {
            Settlement::Completed => TurnOutcome::Completed,
            Settlement::Failed(text) => TurnOutcome::Failed(text),
        }
    }
}

#[derive(Default)]
struct Inflight {
    generation: u64,
    token: Option<CancellationToken>,
}

pub struct ChatSession {
    transport: Arc<dyn TurnTransport>,
    timeout: Duration,
    view: watch::Sender<ChatView>,
    inflight: Mutex<Inflight>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn TurnTransport>, timeout: Duration) -> Self {
        let (view, _) = watch::channel(ChatView::default());
        Self {
            transport,
            timeout,
            view,
            inflight: Mutex::new(Inflight::default()),
        }
    }

    /// Watch the view; every bubble change is published.
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> ChatView {
        self.view.borrow().clone()
    }

    /// Abort the in-flight turn, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.inflight.lock().token.take() {
            token.cancel();
        }
    }

    /// Send a streaming turn.
    pub async fn send(&self, thread_id: &str, assistant_id: &str, message: &str) -> TurnOutcome {
        self.send_with(TurnPayload {
            thread_id: thread_id.to_owned(),
            message: message.to_owned(),
            assistant_id: assistant_id.to_owned(),
            streaming: true,
        })
        .await
    }

    pub async fn send_with(&self, payload: TurnPayload) -> TurnOutcome {
        let token = CancellationToken::new();
        let generation = {
            let mut inflight = self.inflight.lock();
            if let Some(previous) = inflight.token.take() {
                previous.cancel();
            }
            inflight.generation += 1;
            inflight.token = Some(token.clone());
            inflight.generation
        };

        let temp_id = format!("temp-{}", uuid::Uuid::new_v4());
        self.update_if_current(generation, |view| {
            view.push_user(temp_id, payload.message.clone());
            view.loading = true;
            view.step = None;
        });

        let outcome = tokio::select! {
            _ = token.cancelled() => TurnOutcome::Aborted,
            _ = tokio::time::sleep(self.timeout) => TurnOutcome::TimedOut,
            outcome = self.drive(generation, &payload) => outcome,
        };

        tracing::debug!(generation, ?outcome, "turn settled");
        self.settle(generation);
        outcome
    }

    async fn drive(&self, generation: u64, payload: &TurnPayload) -> TurnOutcome {
        let response = match self.transport.send_turn(payload).await {
            Ok(response) => response,
            Err(e) => return self.fail(generation, e.to_string()),
        };

        let mut body = match response {
            TurnResponse::Messages(list) => {
                self.update_if_current(generation, |view| view.replace_with_history(&list.messages));
                return TurnOutcome::Completed;
            }
            TurnResponse::Stream(body) => body,
        };

        let mut decoder = SseDecoder::new();
        let mut cursor = TurnCursor::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return self.fail(generation, e.to_string()),
            };
            for data in decoder.push(&chunk) {
                if let Some(outcome) = self.apply(generation, &mut cursor, &data) {
                    return outcome;
                }
            }
        }
        if let Some(data) = decoder.finish() {
            if let Some(outcome) = self.apply(generation, &mut cursor, &data) {
                return outcome;
            }
        }

        self.fail(generation, STREAM_CLOSED_MESSAGE.to_owned())
    }

    fn apply(&self, generation: u64, cursor: &mut TurnCursor, data: &str) -> Option<TurnOutcome> {
        let event = match WireEvent::decode(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable frame");
                return None;
            }
        };
        let mut settlement = None;
        self.update_if_current(generation, |view| settlement = cursor.apply(view, &event));
        settlement.map(TurnOutcome::from)
    }

    fn fail(&self, generation: u64, text: String) -> TurnOutcome {
        self.update_if_current(generation, |view| view.push_error(text.clone()));
        TurnOutcome::Failed(text)
    }

    /// Apply `f` only while `generation` is still the newest turn.  The
    /// inflight lock is held across the mutation so a concurrent send
    /// cannot slip in between the check and the write.
    fn update_if_current(&self, generation: u64, f: impl FnOnce(&mut ChatView)) {
        let inflight = self.inflight.lock();
        if inflight.generation == generation {
            self.view.send_modify(f);
        }
    }

    fn settle(&self, generation: u64) {
        let mut inflight = self.inflight.lock();
        if inflight.generation != generation {
            return;
        }
        inflight.token = None;
        self.view.send_modify(|view| {
            view.loading = false;
            view.step = None;
        });
    }
}
