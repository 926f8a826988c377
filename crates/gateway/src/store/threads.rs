//! Thread ownership: which user may talk on which provider thread.
//!
//! The pipeline only reads this relation.  The shipped registry keeps it in
//! `threads.json` under the state path; entries are added out of band with
//! `fieldrep thread register`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use fr_domain::error::{Error, Result};

use super::json_file;

/// Read access to the ownership relation.
#[async_trait::async_trait]
pub trait ThreadOwnership: Send + Sync {
    /// The user owning `thread_id`, or `None` when the thread is unknown.
    async fn owner_of(&self, thread_id: &str) -> Result<Option<String>>;

    /// True when `user_id` owns `thread_id`.
    async fn is_owner(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.owner_of(thread_id).await?.as_deref() == Some(user_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON file registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ThreadRegistry {
    path: PathBuf,
    threads: RwLock<HashMap<String, ThreadRecord>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ThreadRegistry {
    /// Load or create the registry at `state_path/threads.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("threads.json");
        let threads: HashMap<String, ThreadRecord> = json_file::load(&path)?;

        tracing::info!(threads = threads.len(), path = %path.display(), "thread registry loaded");

        Ok(Self {
            path,
            threads: RwLock::new(threads),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Assign `thread_id` to `user_id`.  Returns the previous owner, if any.
    pub async fn register(&self, thread_id: &str, user_id: &str) -> Result<Option<String>> {
        if thread_id.trim().is_empty() || user_id.trim().is_empty() {
            return Err(Error::Other("thread id and user id must be non-empty".into()));
        }

        let _guard = self.write_lock.lock().await;
        let (previous, snapshot) = {
            let mut threads = self.threads.write();
            let previous = threads.insert(
                thread_id.to_owned(),
                ThreadRecord {
                    user_id: user_id.to_owned(),
                    created_at: Utc::now(),
                },
            );
            (previous.map(|r| r.user_id), threads.clone())
        };
        json_file::save(&self.path, &snapshot).await?;

        tracing::info!(thread_id, user_id, "thread registered");
        Ok(previous)
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }
}

#[async_trait::async_trait]
impl ThreadOwnership for ThreadRegistry {
    async fn owner_of(&self, thread_id: &str) -> Result<Option<String>> {
        Ok(self.threads.read().get(thread_id).map(|r| r.user_id.clone()))
    }
}
