//! Hosted assistant providers.
//!
//! [`AssistantProvider`] is the seam the gateway depends on; the OpenAI
//! Assistants adapter is the one shipped implementation.

pub mod openai_assistants;
pub mod traits;
pub(crate) mod sse;
pub mod util;

// Re-exports for convenience.
pub use openai_assistants::OpenAiAssistantsProvider;
pub use traits::{
    Annotation, AnnotationKind, AssistantProvider, CompletedMessage, FileMetadata,
    FileSearchResult, RunEvent, RunInfo, RunStatus, RunStep, ThreadMessage, ToolCallTrace,
    ToolKind,
};
