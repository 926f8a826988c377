//! Citation records keyed by (thread id, provider message id).
//!
//! Persists to `citations.json` under the configured state path.  An
//! upsert for an existing key replaces the previous records, so repeated
//! writes for the same message are idempotent.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use fr_domain::citation::CitationRecord;
use fr_domain::error::{Error, Result};
use fr_domain::trace::TraceEvent;

use super::json_file;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All citations of one assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCitations {
    pub thread_id: String,
    pub message_id: String,
    /// Ordered by `citation_number`.
    pub citations: Vec<CitationRecord>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable citation storage.  Callers perform ownership checks.
#[async_trait::async_trait]
pub trait CitationStore: Send + Sync {
    /// Insert or replace the citations of one message.
    async fn upsert(
        &self,
        thread_id: &str,
        message_id: &str,
        citations: Vec<CitationRecord>,
    ) -> Result<()>;

    /// Every message of a thread that has citations, keyed by message id.
    async fn list_for_thread(&self, thread_id: &str) -> Result<BTreeMap<String, Vec<CitationRecord>>>;

    /// The citations stored under one exact (thread, message) key.
    async fn get(&self, thread_id: &str, message_id: &str) -> Result<Option<MessageCitations>>;

    /// Every record stored under `message_id`, across threads, newest first.
    async fn list_for_message(&self, message_id: &str) -> Result<Vec<MessageCitations>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Key = (String, String);

pub struct FileCitationStore {
    path: PathBuf,
    records: RwLock<HashMap<Key, MessageCitations>>,
    /// Serializes file writes so a slower, older snapshot never lands last.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCitationStore {
    /// Load or create the store at `state_path/citations.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("citations.json");

        let stored: Vec<MessageCitations> = json_file::load(&path)?;
        let records: HashMap<Key, MessageCitations> = stored
            .into_iter()
            .map(|m| ((m.thread_id.clone(), m.message_id.clone()), m))
            .collect();

        tracing::info!(
            messages = records.len(),
            path = %path.display(),
            "citation store loaded"
        );

        Ok(Self {
            path,
            records: RwLock::new(records),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Number of messages with stored citations.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot: Vec<MessageCitations> = {
            let records = self.records.read();
            let mut all: Vec<_> = records.values().cloned().collect();
            all.sort_by(|a, b| {
                (a.thread_id.as_str(), a.message_id.as_str())
                    .cmp(&(b.thread_id.as_str(), b.message_id.as_str()))
            });
            all
        };
        json_file::save(&self.path, &snapshot).await
    }
}

#[async_trait::async_trait]
impl CitationStore for FileCitationStore {
    async fn upsert(
        &self,
        thread_id: &str,
        message_id: &str,
        mut citations: Vec<CitationRecord>,
    ) -> Result<()> {
        citations.sort_by_key(|c| c.citation_number);
        let count = citations.len();
        {
            let mut records = self.records.write();
            records.insert(
                (thread_id.to_owned(), message_id.to_owned()),
                MessageCitations {
                    thread_id: thread_id.to_owned(),
                    message_id: message_id.to_owned(),
                    citations,
                    updated_at: Utc::now(),
                },
            );
        }
        self.flush().await?;

        TraceEvent::CitationsPersisted {
            thread_id: thread_id.to_owned(),
            message_id: message_id.to_owned(),
            count,
        }
        .emit();
        Ok(())
    }

    async fn list_for_thread(&self, thread_id: &str) -> Result<BTreeMap<String, Vec<CitationRecord>>> {
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|m| m.thread_id == thread_id)
            .map(|m| (m.message_id.clone(), m.citations.clone()))
            .collect())
    }

    async fn get(&self, thread_id: &str, message_id: &str) -> Result<Option<MessageCitations>> {
        let records = self.records.read();
        Ok(records
            .get(&(thread_id.to_owned(), message_id.to_owned()))
            .cloned())
    }

    async fn list_for_message(&self, message_id: &str) -> Result<Vec<MessageCitations>> {
        let records = self.records.read();
        let mut found: Vec<MessageCitations> = records
            .values()
            .filter(|m| m.message_id == message_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
