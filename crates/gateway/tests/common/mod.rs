//! Shared fakes for the gateway integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use fr_domain::citation::CitationRecord;
use fr_domain::config::TurnConfig;
use fr_domain::error::{Error, Result};
use fr_domain::stream::BoxStream;
use fr_domain::wire::WireEvent;
use fr_gateway::runtime::TurnCoordinator;
use fr_gateway::store::{CitationStore, FileCitationStore, ThreadOwnership};
use fr_providers::{
    Annotation, AnnotationKind, AssistantProvider, CompletedMessage, FileMetadata,
    FileSearchResult, RunEvent, RunInfo, RunStatus, RunStep, ThreadMessage, ToolCallTrace,
    ToolKind,
};

pub const THREAD: &str = "thread_1";
pub const OWNER: &str = "rep_a";
pub const ASSISTANT: &str = "asst_1";
pub const MARKER: &str = "\u{3010}4:0\u{2020}source\u{3011}";

fn provider_error(message: &str) -> Error {
    Error::Provider {
        provider: "fake".into(),
        message: message.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scripted stream item.
#[derive(Clone)]
pub enum Item {
    Event(RunEvent),
    Fail(String),
}

/// Scripted [`AssistantProvider`] that records every call.
#[derive(Default)]
pub struct FakeProvider {
    pub events: Vec<Item>,
    /// Keep the stream open after the script runs out.
    pub hang: bool,
    pub open_error: Option<String>,
    pub steps: Vec<RunStep>,
    /// Number of `list_run_steps` calls that fail before one succeeds.
    pub step_failures: AtomicUsize,
    pub files: HashMap<String, String>,
    pub messages: Vec<ThreadMessage>,
    /// Statuses returned by successive `retrieve_run` calls; the last one
    /// repeats.
    pub poll_statuses: Mutex<VecDeque<RunStatus>>,

    pub appended: Mutex<Vec<String>>,
    pub streams_opened: AtomicUsize,
    pub runs_created: AtomicUsize,
    pub cancelled: Mutex<Vec<String>>,
    pub step_listings: AtomicUsize,
    pub file_lookups: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn with_events(events: Vec<RunEvent>) -> Self {
        Self {
            events: events.into_iter().map(Item::Event).collect(),
            ..Default::default()
        }
    }

    pub fn file(mut self, id: &str, name: &str) -> Self {
        self.files.insert(id.into(), name.into());
        self
    }

    pub fn steps(mut self, steps: Vec<RunStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.lock().len()
    }
}

#[async_trait]
impl AssistantProvider for FakeProvider {
    async fn append_message(&self, _thread_id: &str, text: &str) -> Result<String> {
        let mut appended = self.appended.lock();
        appended.push(text.to_owned());
        Ok(format!("msg_user_{}", appended.len()))
    }

    async fn stream_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<BoxStream<'static, Result<RunEvent>>> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.open_error {
            return Err(provider_error(message));
        }
        let items: Vec<Result<RunEvent>> = self
            .events
            .iter()
            .map(|item| match item {
                Item::Event(e) => Ok(e.clone()),
                Item::Fail(m) => Err(provider_error(m)),
            })
            .collect();
        if self.hang {
            Ok(Box::pin(stream::iter(items).chain(stream::pending())))
        } else {
            Ok(Box::pin(stream::iter(items)))
        }
    }

    async fn create_run(&self, _thread_id: &str, _assistant_id: &str) -> Result<RunInfo> {
        self.runs_created.fetch_add(1, Ordering::SeqCst);
        Ok(RunInfo {
            id: "run_1".into(),
            status: RunStatus::Queued,
            last_error: None,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<RunInfo> {
        let mut statuses = self.poll_statuses.lock();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(RunStatus::InProgress)
        } else {
            statuses.front().cloned().unwrap_or(RunStatus::InProgress)
        };
        let last_error = (status == RunStatus::Failed).then(|| "rate_limit_exceeded".to_owned());
        Ok(RunInfo {
            id: run_id.to_owned(),
            status,
            last_error,
        })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        self.cancelled.lock().push(run_id.to_owned());
        Ok(())
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>> {
        Ok(self.messages.clone())
    }

    async fn list_run_steps(
        &self,
        _thread_id: &str,
        _run_id: &str,
        include_chunk_content: bool,
    ) -> Result<Vec<RunStep>> {
        assert!(include_chunk_content, "enrichment needs chunk text");
        self.step_listings.fetch_add(1, Ordering::SeqCst);
        let failures = self.step_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.step_failures.store(failures - 1, Ordering::SeqCst);
            return Err(provider_error("steps unavailable"));
        }
        Ok(self.steps.clone())
    }

    async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        self.file_lookups.lock().push(file_id.to_owned());
        match self.files.get(file_id) {
            Some(name) => Ok(FileMetadata {
                id: file_id.to_owned(),
                filename: name.clone(),
                bytes: None,
            }),
            None => Err(provider_error("No such File object")),
        }
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ownership
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryOwnership {
    pub owners: Mutex<HashMap<String, String>>,
}

impl MemoryOwnership {
    pub fn with(thread_id: &str, user_id: &str) -> Self {
        let me = Self::default();
        me.owners.lock().insert(thread_id.into(), user_id.into());
        me
    }
}

#[async_trait]
impl ThreadOwnership for MemoryOwnership {
    async fn owner_of(&self, thread_id: &str) -> Result<Option<String>> {
        Ok(self.owners.lock().get(thread_id).cloned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub citations: Arc<FileCitationStore>,
    pub ownership: Arc<MemoryOwnership>,
    pub coordinator: Arc<TurnCoordinator>,
    pub dir: TempDir,
}

pub fn harness(provider: FakeProvider) -> Harness {
    harness_with(provider, TurnConfig::default())
}

pub fn harness_with(provider: FakeProvider, config: TurnConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(provider);
    let citations = Arc::new(FileCitationStore::new(dir.path()).unwrap());
    let ownership = Arc::new(MemoryOwnership::with(THREAD, OWNER));
    let coordinator = Arc::new(TurnCoordinator::new(
        provider.clone(),
        ownership.clone(),
        citations.clone(),
        config,
    ));
    Harness {
        provider,
        citations,
        ownership,
        coordinator,
        dir,
    }
}

/// Drain a turn's receiver until the sender closes.
pub async fn collect(mut rx: mpsc::Receiver<WireEvent>) -> Vec<WireEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Wait for the detached citation upsert to land.
pub async fn persisted(store: &FileCitationStore, message_id: &str) -> Vec<CitationRecord> {
    for _ in 0..200 {
        if let Some(found) = store.get(THREAD, message_id).await.unwrap() {
            return found.citations;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("citations for {message_id} were never persisted");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fixtures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn citation(marker: &str, file_id: &str) -> Annotation {
    Annotation {
        text: marker.into(),
        start_index: None,
        end_index: None,
        kind: AnnotationKind::FileCitation {
            file_id: file_id.into(),
            quote: None,
        },
    }
}

pub fn finished(status: RunStatus, last_error: Option<&str>) -> RunEvent {
    RunEvent::RunFinished {
        status,
        last_error: last_error.map(str::to_owned),
    }
}

/// A document-search answer citing `file_id` once.
pub fn cited_answer(file_id: &str) -> Vec<RunEvent> {
    let text = format!("Torque is 12 Nm{MARKER}.");
    vec![
        RunEvent::RunCreated { run_id: "run_1".into() },
        RunEvent::StepCreated { step_type: "tool_calls".into() },
        RunEvent::ToolCallCreated { kind: ToolKind::FileSearch },
        RunEvent::StepDelta { tool_kinds: vec![ToolKind::FileSearch] },
        RunEvent::StepCreated { step_type: "message_creation".into() },
        RunEvent::TextCreated,
        RunEvent::TextDelta { value: "Torque is 12 Nm".into() },
        RunEvent::TextDelta { value: format!("{MARKER}.") },
        RunEvent::MessageDone {
            message: CompletedMessage {
                id: "msg_1".into(),
                text,
                annotations: vec![citation(MARKER, file_id)],
            },
        },
        finished(RunStatus::Completed, None),
    ]
}

/// A plain answer with no tool calls.
pub fn plain_answer() -> Vec<RunEvent> {
    vec![
        RunEvent::RunCreated { run_id: "run_1".into() },
        RunEvent::StepCreated { step_type: "message_creation".into() },
        RunEvent::TextCreated,
        RunEvent::TextDelta { value: "Hello".into() },
        RunEvent::MessageDone {
            message: CompletedMessage {
                id: "msg_1".into(),
                text: "Hello".into(),
                annotations: vec![],
            },
        },
        finished(RunStatus::Completed, None),
    ]
}

pub fn search_step(file_id: &str, score: f64, chunk: &str) -> RunStep {
    RunStep {
        id: "step_1".into(),
        step_type: "tool_calls".into(),
        tool_calls: vec![ToolCallTrace {
            kind: ToolKind::FileSearch,
            file_search_results: vec![FileSearchResult {
                file_id: file_id.into(),
                score: Some(score),
                content: Some(chunk.into()),
            }],
        }],
    }
}
