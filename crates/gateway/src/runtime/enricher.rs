//! Post-run citation enrichment.
//!
//! Once a run completes, its tool-call trace is cross-referenced with the
//! citation stubs: each document-search result is matched to the first stub
//! with the same file id that has not been enriched yet, and the stub gains
//! the file name, the chunk text and the relevance score.  The same results
//! yield the page-range sources.
//!
//! Nothing here fails the turn.  Lookup errors are logged and leave the
//! affected stubs lean.

use std::collections::HashMap;
use std::time::Instant;

use fr_domain::citation::{CitationRecord, CitationStub, SourceInfo};
use fr_domain::trace::TraceEvent;
use fr_providers::{AssistantProvider, RunStep, ToolKind};

use super::sources;

/// Step listing attempts before giving up (one retry).
const STEP_LIST_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentOutcome {
    /// One record per stub, in stub order.
    pub records: Vec<CitationRecord>,
    pub sources: Vec<SourceInfo>,
    /// Number of file-metadata requests actually issued.
    pub file_lookups: usize,
}

impl EnrichmentOutcome {
    fn lean(stubs: &[CitationStub]) -> Self {
        Self {
            records: stubs.iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn enriched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_enriched()).count()
    }
}

/// Enrich `stubs` from the tool-call trace of `run_id`.
pub async fn enrich(
    provider: &dyn AssistantProvider,
    thread_id: &str,
    run_id: &str,
    stubs: &[CitationStub],
    max_sources: usize,
) -> EnrichmentOutcome {
    if stubs.is_empty() {
        return EnrichmentOutcome::default();
    }

    let started = Instant::now();
    let Some(steps) = list_steps(provider, thread_id, run_id).await else {
        return EnrichmentOutcome::lean(stubs);
    };

    let mut outcome = EnrichmentOutcome::lean(stubs);
    let mut names: HashMap<String, Option<String>> = HashMap::new();
    let mut sources = Vec::new();

    let results = steps
        .iter()
        .flat_map(|s| s.tool_calls.iter())
        .filter(|c| c.kind == ToolKind::FileSearch)
        .flat_map(|c| c.file_search_results.iter());

    for result in results {
        let slot = outcome
            .records
            .iter()
            .position(|r| r.file_id == result.file_id && !r.is_enriched());
        let pages_in_chunk = result
            .content
            .as_deref()
            .map(|c| !sources::extract_pages(c).is_empty())
            .unwrap_or(false);
        if slot.is_none() && !pages_in_chunk {
            continue;
        }

        let name = match names.get(&result.file_id) {
            Some(cached) => cached.clone(),
            None => {
                outcome.file_lookups += 1;
                let fetched = match provider.file_metadata(&result.file_id).await {
                    Ok(meta) => Some(meta.filename),
                    Err(e) => {
                        tracing::warn!(file_id = %result.file_id, error = %e, "file metadata lookup failed");
                        None
                    }
                };
                names.insert(result.file_id.clone(), fetched.clone());
                fetched
            }
        };
        let Some(name) = name else { continue };

        if let Some(i) = slot {
            let record = &mut outcome.records[i];
            record.file_name = Some(name.clone());
            record.full_chunk_content = result.content.clone();
            record.relevance_score = result.score;
        }
        if let Some(chunk) = result.content.as_deref() {
            sources.extend(sources::source_for_chunk(&name, &result.file_id, chunk, result.score));
        }
    }

    outcome.sources = sources::rank_sources(sources, max_sources);

    TraceEvent::EnrichmentCompleted {
        thread_id: thread_id.to_owned(),
        run_id: run_id.to_owned(),
        stubs: stubs.len(),
        enriched: outcome.enriched_count(),
        sources: outcome.sources.len(),
        file_lookups: outcome.file_lookups,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();

    outcome
}

async fn list_steps(provider: &dyn AssistantProvider, thread_id: &str, run_id: &str) -> Option<Vec<RunStep>> {
    for attempt in 1..=STEP_LIST_ATTEMPTS {
        match provider.list_run_steps(thread_id, run_id, true).await {
            Ok(steps) => return Some(steps),
            Err(e) => {
                tracing::warn!(thread_id, run_id, attempt, error = %e, "listing run steps failed");
            }
        }
    }
    None
}
