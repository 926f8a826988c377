use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Deadline for the streaming phase of a turn.  Kept below the
    /// client's 120 s ceiling so the server reports the timeout itself.
    #[serde(default = "d_run_timeout")]
    pub run_timeout_secs: u64,
    /// How long a turn waits for an earlier turn on the same thread.
    #[serde(default = "d_lock_wait")]
    pub lock_wait_secs: u64,
    /// Deadline for a non-streaming (polled) turn.
    #[serde(default = "d_blocking_timeout")]
    pub blocking_timeout_secs: u64,
    #[serde(default = "d_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum number of page-range sources attached to a reply.
    #[serde(default = "d_max_sources")]
    pub max_sources: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: d_run_timeout(),
            lock_wait_secs: d_lock_wait(),
            blocking_timeout_secs: d_blocking_timeout(),
            poll_interval_ms: d_poll_interval(),
            max_sources: d_max_sources(),
        }
    }
}

fn d_run_timeout() -> u64 {
    110
}
fn d_lock_wait() -> u64 {
    30
}
fn d_blocking_timeout() -> u64 {
    60
}
fn d_poll_interval() -> u64 {
    1000
}
fn d_max_sources() -> usize {
    5
}
