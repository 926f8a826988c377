//! Non-streaming turns: create the run, poll it to a terminal status and
//! return the thread's messages.

use std::time::Duration;

use fr_domain::trace::TraceEvent;
use fr_domain::wire::HistoryMessage;
use fr_providers::RunInfo;

use super::history::to_history;
use super::normalizer::{Terminal, TIMEOUT_MESSAGE};
use super::turn::{TurnCoordinator, TurnError, TurnRequest};

impl TurnCoordinator {
    /// Run a turn without streaming.  Returns the thread's messages, newest
    /// first, with citation placeholders rewritten.
    pub async fn run_blocking(&self, req: TurnRequest) -> Result<Vec<HistoryMessage>, TurnError> {
        TraceEvent::TurnStarted {
            thread_id: req.thread_id.clone(),
            user_id: req.user_id.clone(),
            streaming: false,
        }
        .emit();

        let _permit = self.prepare(&req).await?;
        let started = tokio::time::Instant::now();

        let run = self
            .provider
            .create_run(&req.thread_id, &req.assistant_id)
            .await
            .map_err(TurnError::Upstream)?;
        tracing::debug!(thread_id = %req.thread_id, run_id = %run.id, "blocking run created");

        let limit = Duration::from_secs(self.config.blocking_timeout_secs);
        let finished = match tokio::time::timeout(limit, self.poll_until_settled(&req.thread_id, run.clone())).await {
            Ok(result) => result?,
            Err(_) => {
                if let Err(e) = self.provider.cancel_run(&req.thread_id, &run.id).await {
                    tracing::warn!(run_id = %run.id, error = %e, "run cancellation failed");
                }
                self.settled(&req.thread_id, &run.id, "timeout", started);
                return Err(TurnError::Run(TIMEOUT_MESSAGE.to_owned()));
            }
        };

        let terminal = Terminal::from_status(&finished.status, finished.last_error.as_deref());
        self.settled(&req.thread_id, &run.id, terminal.outcome(), started);
        if let Some(message) = terminal.error_message() {
            return Err(TurnError::Run(message));
        }

        let messages = self
            .provider
            .list_messages(&req.thread_id)
            .await
            .map_err(TurnError::Upstream)?;
        Ok(messages.iter().map(to_history).collect())
    }

    async fn poll_until_settled(&self, thread_id: &str, mut run: RunInfo) -> Result<RunInfo, TurnError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        while run.status.is_pending() {
            tokio::time::sleep(interval).await;
            run = self
                .provider
                .retrieve_run(thread_id, &run.id)
                .await
                .map_err(TurnError::Upstream)?;
            tracing::trace!(run_id = %run.id, status = %run.status, "run polled");
        }
        Ok(run)
    }

    fn settled(&self, thread_id: &str, run_id: &str, outcome: &str, started: tokio::time::Instant) {
        TraceEvent::TurnSettled {
            thread_id: thread_id.to_owned(),
            run_id: Some(run_id.to_owned()),
            outcome: outcome.to_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
            citations: 0,
        }
        .emit();
    }
}
