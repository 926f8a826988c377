use serde::Serialize;

/// Structured trace events emitted across all FieldRep crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        thread_id: String,
        user_id: String,
        streaming: bool,
    },
    RunOpened {
        thread_id: String,
        run_id: String,
    },
    TurnSettled {
        thread_id: String,
        run_id: Option<String>,
        outcome: String,
        duration_ms: u64,
        citations: usize,
    },
    EnrichmentCompleted {
        thread_id: String,
        run_id: String,
        stubs: usize,
        enriched: usize,
        sources: usize,
        file_lookups: usize,
        duration_ms: u64,
    },
    CitationsPersisted {
        thread_id: String,
        message_id: String,
        count: usize,
    },
    ProviderRequest {
        provider: String,
        operation: String,
        status: u16,
        duration_ms: u64,
    },
    RunCancelRequested {
        thread_id: String,
        run_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fr_event");
    }
}
