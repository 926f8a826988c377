//! Durable state owned by the gateway: citation records and the
//! thread ownership registry.  Both are JSON files under
//! `store.state_path`.

pub mod citations;
mod json_file;
pub mod threads;

pub use citations::{CitationStore, FileCitationStore, MessageCitations};
pub use threads::{ThreadOwnership, ThreadRecord, ThreadRegistry};
