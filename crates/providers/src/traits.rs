use fr_domain::error::Result;
use fr_domain::stream::BoxStream;
use serde::Serialize;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run lifecycle events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider-agnostic lifecycle events for one streamed run.
///
/// This is a closed set: adapters translate whatever their wire format
/// offers into these variants and drop the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The provider accepted the run and assigned it an id.
    RunCreated { run_id: String },
    /// A new run step began (`tool_calls`, `message_creation`).
    StepCreated { step_type: String },
    /// Incremental data for a step.  Carries the kinds of tool call the
    /// delta touches, which may be empty.
    StepDelta { tool_kinds: Vec<ToolKind> },
    /// The assistant started a new block of text.
    TextCreated,
    /// More text for the current block.
    TextDelta { value: String },
    /// A tool call was issued.
    ToolCallCreated { kind: ToolKind },
    /// The assistant message is final, including its annotations.
    MessageDone { message: CompletedMessage },
    /// The run reached a terminal status.
    RunFinished {
        status: RunStatus,
        last_error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    FileSearch,
    CodeInterpreter,
    Other(String),
}

impl ToolKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "file_search" | "retrieval" => ToolKind::FileSearch,
            "code_interpreter" => ToolKind::CodeInterpreter,
            other => ToolKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ToolKind::FileSearch => "file_search",
            ToolKind::CodeInterpreter => "code_interpreter",
            ToolKind::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Unknown(String),
}

impl RunStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            other => RunStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown(s) => s,
        }
    }

    /// Still waiting on the provider (polling should continue).
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages and annotations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedMessage {
    pub id: String,
    pub text: String,
    pub annotations: Vec<Annotation>,
}

/// A span of message text the provider marked up.
///
/// `start_index`/`end_index` are character offsets into the message text.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    FileCitation {
        file_id: String,
        quote: Option<String>,
    },
    FilePath {
        file_id: String,
    },
    Other(String),
}

/// One message in a thread, as listed by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub created_at: i64,
    pub text: String,
    pub annotations: Vec<Annotation>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runs, steps and files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub id: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunStep {
    pub id: String,
    pub step_type: String,
    pub tool_calls: Vec<ToolCallTrace>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallTrace {
    pub kind: ToolKind,
    /// Populated only for document-search calls.
    pub file_search_results: Vec<FileSearchResult>,
}

/// One retrieved chunk from a document-search tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSearchResult {
    pub file_id: String,
    pub score: Option<f64>,
    /// Concatenated text parts of the chunk, when requested.
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub bytes: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation and run primitives of a hosted assistant service.
///
/// Implementations are constructed explicitly and handed to the gateway;
/// there is no process-wide client.
#[async_trait::async_trait]
pub trait AssistantProvider: Send + Sync {
    /// Append a user message to a thread.  Returns the new message id.
    async fn append_message(&self, thread_id: &str, text: &str) -> Result<String>;

    /// Open a run and stream its lifecycle events.
    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<BoxStream<'static, Result<RunEvent>>>;

    /// Open a run without streaming.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunInfo>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunInfo>;

    /// Best-effort request to stop a run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// List a thread's messages, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;

    /// List a run's steps in execution order.  With `include_chunk_content`
    /// the document-search results carry their chunk text.
    async fn list_run_steps(
        &self,
        thread_id: &str,
        run_id: &str,
        include_chunk_content: bool,
    ) -> Result<Vec<RunStep>>;

    async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
