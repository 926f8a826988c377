//! Turn coordinator: one user message in, one stream of wire events out.
//!
//! Entry point: [`TurnCoordinator::start`] checks the request, takes the
//! thread lock, appends the message and then spawns the turn task, which
//! streams the run, enriches citations and persists them.  The caller gets
//! the receiving half of a bounded channel of [`WireEvent`]s.
//!
//! ```text
//! Idle -> Appending -> Streaming -> Enriching -> Settled{Completed|Failed|Cancelled}
//! ```
//!
//! Failures before the task is spawned are returned as [`TurnError`] (the
//! HTTP layer turns them into status codes).  Failures after that travel
//! in-band as a terminal `error` event.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::time::Instant;
use tracing::Instrument;

use fr_domain::citation::CitationStub;
use fr_domain::config::TurnConfig;
use fr_domain::error::Error;
use fr_domain::trace::TraceEvent;
use fr_domain::wire::{TurnUpdate, WireEvent};
use fr_providers::{AssistantProvider, RunEvent};

use crate::store::{CitationStore, ThreadOwnership};

use super::enricher;
use super::normalizer::{RunNormalizer, Terminal, NO_FINAL_STATUS_MESSAGE, STEP_COMPLETE, TIMEOUT_MESSAGE};
use super::thread_lock::{ThreadBusy, ThreadLockMap};

/// Capacity of the per-turn event channel.
const EVENT_BUFFER: usize = 64;

/// Upper bound on a best-effort run cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request and errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub user_id: String,
    pub message: String,
    pub assistant_id: String,
}

impl TurnRequest {
    pub fn validate(&self) -> Result<(), TurnError> {
        if self.thread_id.trim().is_empty() {
            return Err(TurnError::Validation("threadId is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(TurnError::Validation("message is required".into()));
        }
        if self.assistant_id.trim().is_empty() {
            return Err(TurnError::Validation("assistantId is required".into()));
        }
        Ok(())
    }
}

/// Reasons a turn never started, or (non-streaming) did not finish.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Validation(String),
    /// Unknown thread or not owned by the caller.  Deliberately the same.
    #[error("Thread not found or access denied")]
    ThreadNotFound,
    #[error(transparent)]
    Busy(#[from] ThreadBusy),
    /// The provider rejected a request made before or outside a stream.
    #[error("assistant provider request failed: {0}")]
    Upstream(#[source] Error),
    /// A non-streaming run ended without completing.
    #[error("{0}")]
    Run(String),
    #[error("thread ownership lookup failed: {0}")]
    Ownership(#[source] Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TurnCoordinator {
    pub(super) provider: Arc<dyn AssistantProvider>,
    pub(super) ownership: Arc<dyn ThreadOwnership>,
    pub(super) citations: Arc<dyn CitationStore>,
    pub(super) locks: Arc<ThreadLockMap>,
    pub(super) config: TurnConfig,
}

impl TurnCoordinator {
    pub fn new(
        provider: Arc<dyn AssistantProvider>,
        ownership: Arc<dyn ThreadOwnership>,
        citations: Arc<dyn CitationStore>,
        config: TurnConfig,
    ) -> Self {
        Self {
            provider,
            ownership,
            citations,
            locks: Arc::new(ThreadLockMap::new()),
            config,
        }
    }

    pub fn locks(&self) -> &ThreadLockMap {
        &self.locks
    }

    pub fn provider(&self) -> &Arc<dyn AssistantProvider> {
        &self.provider
    }

    /// Fail with [`TurnError::ThreadNotFound`] unless `user_id` owns the thread.
    pub async fn ensure_owner(&self, thread_id: &str, user_id: &str) -> Result<(), TurnError> {
        let owned = self
            .ownership
            .is_owner(thread_id, user_id)
            .await
            .map_err(TurnError::Ownership)?;
        if owned {
            Ok(())
        } else {
            tracing::info!(thread_id, user_id, "thread ownership check failed");
            Err(TurnError::ThreadNotFound)
        }
    }

    /// Everything that must succeed before a run is opened: validation,
    /// ownership, the thread lock and the appended user message.
    pub(super) async fn prepare(&self, req: &TurnRequest) -> Result<OwnedSemaphorePermit, TurnError> {
        req.validate()?;
        self.ensure_owner(&req.thread_id, &req.user_id).await?;

        let wait = Duration::from_secs(self.config.lock_wait_secs);
        let permit = self.locks.acquire(&req.thread_id, wait).await?;

        let message_id = self
            .provider
            .append_message(&req.thread_id, &req.message)
            .await
            .map_err(TurnError::Upstream)?;
        tracing::debug!(thread_id = %req.thread_id, message_id, "user message appended");

        Ok(permit)
    }

    /// Start a streamed turn.
    ///
    /// The returned receiver yields `update` events followed by exactly one
    /// `done` or `error`.  Dropping it cancels the turn and requests a
    /// best-effort cancellation of the provider run.
    pub async fn start(&self, req: TurnRequest) -> Result<mpsc::Receiver<WireEvent>, TurnError> {
        TraceEvent::TurnStarted {
            thread_id: req.thread_id.clone(),
            user_id: req.user_id.clone(),
            streaming: true,
        }
        .emit();

        let permit = self.prepare(&req).await?;
        let (tx, rx) = mpsc::channel::<WireEvent>(EVENT_BUFFER);

        let task = TurnTask {
            provider: self.provider.clone(),
            citations: self.citations.clone(),
            config: self.config.clone(),
            thread_id: req.thread_id.clone(),
            assistant_id: req.assistant_id,
            tx,
        };

        let turn_span = tracing::info_span!(
            "turn",
            thread_id = %req.thread_id,
            run_id = tracing::field::Empty,
            "otel.kind" = "SERVER",
        );
        tokio::spawn(
            async move {
                // Held until the turn settles.
                let _permit = permit;
                task.run().await;
            }
            .instrument(turn_span),
        );

        Ok(rx)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the streaming phase ended.
enum StreamEnd {
    Finished(Terminal),
    TimedOut,
    Disconnected,
    Failed(String),
}

struct TurnTask {
    provider: Arc<dyn AssistantProvider>,
    citations: Arc<dyn CitationStore>,
    config: TurnConfig,
    thread_id: String,
    assistant_id: String,
    tx: mpsc::Sender<WireEvent>,
}

impl TurnTask {
    async fn run(self) {
        let started = Instant::now();
        let mut normalizer = RunNormalizer::new();
        let mut run_id: Option<String> = None;

        tracing::debug!("turn streaming");
        let end = self.stream(&mut normalizer, &mut run_id).await;

        let outcome = match end {
            StreamEnd::Finished(Terminal::Completed) => {
                self.settle_completed(&normalizer, run_id.as_deref()).await;
                "completed"
            }
            StreamEnd::Finished(terminal) => {
                let message = terminal.error_message().unwrap_or_default();
                tracing::info!(outcome = terminal.outcome(), error = %message, "run ended without completing");
                self.send(WireEvent::error(message)).await;
                terminal.outcome()
            }
            StreamEnd::TimedOut => {
                tracing::warn!(timeout_secs = self.config.run_timeout_secs, "turn timed out");
                self.cancel_run(run_id.as_deref(), "timeout").await;
                self.send(WireEvent::error(TIMEOUT_MESSAGE)).await;
                "timeout"
            }
            StreamEnd::Disconnected => {
                tracing::info!("client disconnected, cancelling turn");
                self.cancel_run(run_id.as_deref(), "client_disconnected").await;
                "cancelled"
            }
            StreamEnd::Failed(message) => {
                tracing::warn!(error = %message, "run stream failed");
                self.cancel_run(run_id.as_deref(), "stream_error").await;
                self.send(WireEvent::error(message)).await;
                "failed"
            }
        };

        TraceEvent::TurnSettled {
            thread_id: self.thread_id.clone(),
            run_id,
            outcome: outcome.to_owned(),
            duration_ms: started.elapsed().as_millis() as u64,
            citations: normalizer.citations().len(),
        }
        .emit();
    }

    /// Open the run and forward ticks until it reaches a terminal status,
    /// the deadline passes or the client goes away.
    async fn stream(&self, normalizer: &mut RunNormalizer, run_id: &mut Option<String>) -> StreamEnd {
        let deadline = Instant::now() + Duration::from_secs(self.config.run_timeout_secs);

        let opened = tokio::time::timeout_at(
            deadline,
            self.provider.stream_run(&self.thread_id, &self.assistant_id),
        )
        .await;
        let mut events = match opened {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => return StreamEnd::Failed(format!("ASSISTANT RUN FAILED: {e}")),
            Err(_) => return StreamEnd::TimedOut,
        };

        if !self.send(WireEvent::Update(normalizer.tick().to_update())).await {
            return StreamEnd::Disconnected;
        }

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return StreamEnd::TimedOut,
                _ = self.tx.closed() => return StreamEnd::Disconnected,
                next = events.next() => {
                    let event = match next {
                        Some(Ok(event)) => event,
                        Some(Err(e)) => return StreamEnd::Failed(format!("ASSISTANT RUN FAILED: {e}")),
                        None => {
                            return match normalizer.finish_without_status() {
                                Ok(_) => StreamEnd::Finished(Terminal::Completed),
                                Err(_) => StreamEnd::Failed(NO_FINAL_STATUS_MESSAGE.to_owned()),
                            };
                        }
                    };

                    if let RunEvent::RunCreated { run_id: id } = &event {
                        tracing::Span::current().record("run_id", id.as_str());
                        tracing::debug!(run_id = %id, "run opened");
                        TraceEvent::RunOpened {
                            thread_id: self.thread_id.clone(),
                            run_id: id.clone(),
                        }
                        .emit();
                        *run_id = Some(id.clone());
                    }

                    let Some(tick) = normalizer.apply(&event) else { continue };
                    if let Some(terminal) = tick.terminal {
                        return StreamEnd::Finished(terminal);
                    }
                    if !self.send(WireEvent::Update(tick.to_update())).await {
                        return StreamEnd::Disconnected;
                    }
                }
            }
        }
    }

    /// Enrich, send the final update, persist, then `done`.
    async fn settle_completed(&self, normalizer: &RunNormalizer, run_id: Option<&str>) {
        let stubs = normalizer.citations();
        tracing::debug!(stubs = stubs.len(), "turn enriching");

        let outcome = match run_id {
            Some(run_id) => {
                enricher::enrich(
                    self.provider.as_ref(),
                    &self.thread_id,
                    run_id,
                    stubs,
                    self.config.max_sources,
                )
                .await
            }
            None => enricher::EnrichmentOutcome {
                records: stubs.iter().map(Into::into).collect(),
                ..Default::default()
            },
        };

        let final_update = TurnUpdate {
            content: normalizer.text(),
            citations: stubs.iter().map(CitationStub::label).collect(),
            step: STEP_COMPLETE.to_owned(),
            citation_data: outcome.records.clone(),
            openai_message_id: normalizer.message_id().map(str::to_owned),
            sources: outcome.sources,
        };
        self.send(WireEvent::Update(final_update)).await;

        match normalizer.message_id() {
            Some(message_id) if !outcome.records.is_empty() => {
                let store = self.citations.clone();
                let thread_id = self.thread_id.clone();
                let message_id = message_id.to_owned();
                let records = outcome.records;
                tokio::spawn(async move {
                    if let Err(e) = store.upsert(&thread_id, &message_id, records).await {
                        tracing::error!(thread_id, message_id, error = %e, "failed to persist citations");
                    }
                });
            }
            _ => {}
        }

        self.send(WireEvent::Done).await;
    }

    /// Best-effort provider cancellation.  Never fails the turn.
    async fn cancel_run(&self, run_id: Option<&str>, reason: &str) {
        let Some(run_id) = run_id else { return };
        TraceEvent::RunCancelRequested {
            thread_id: self.thread_id.clone(),
            run_id: run_id.to_owned(),
            reason: reason.to_owned(),
        }
        .emit();

        match tokio::time::timeout(CANCEL_GRACE, self.provider.cancel_run(&self.thread_id, run_id)).await {
            Ok(Ok(())) => tracing::debug!(run_id, "run cancellation requested"),
            Ok(Err(e)) => tracing::warn!(run_id, error = %e, "run cancellation failed"),
            Err(_) => tracing::warn!(run_id, "run cancellation timed out"),
        }
    }

    /// Send one event.  Returns `false` once the receiver is gone.
    async fn send(&self, event: WireEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}
