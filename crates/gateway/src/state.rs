use std::sync::Arc;

use fr_domain::config::Config;

use crate::api::auth::Authenticator;
use crate::runtime::TurnCoordinator;
use crate::store::{CitationStore, ThreadOwnership};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config and the turn coordinator
/// - **Stores**: thread ownership and citations
/// - **Security**: the request authenticator
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    /// Owns the provider client and the per-thread locks.
    pub turns: Arc<TurnCoordinator>,

    // ── Stores ────────────────────────────────────────────────────────
    pub threads: Arc<dyn ThreadOwnership>,
    pub citations: Arc<dyn CitationStore>,

    // ── Security ──────────────────────────────────────────────────────
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Wire a coordinator around the given collaborators.
    pub fn new(
        config: Arc<Config>,
        provider: Arc<dyn fr_providers::AssistantProvider>,
        threads: Arc<dyn ThreadOwnership>,
        citations: Arc<dyn CitationStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let turns = Arc::new(TurnCoordinator::new(
            provider,
            threads.clone(),
            citations.clone(),
            config.turn.clone(),
        ));
        Self {
            config,
            turns,
            threads,
            citations,
            auth,
        }
    }
}
