//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;

use fr_domain::config::{Config, ConfigSeverity};
use fr_providers::OpenAiAssistantsProvider;

use crate::api::auth::StaticTokenAuthenticator;
use crate::state::AppState;
use crate::store::{FileCitationStore, ThreadRegistry};

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Assistant provider ───────────────────────────────────────────
    let provider = Arc::new(
        OpenAiAssistantsProvider::from_config(&config.openai)
            .context("initializing assistants provider")?,
    );
    tracing::info!(base_url = %config.openai.base_url, "assistants provider ready");

    // ── Stores ───────────────────────────────────────────────────────
    let threads = Arc::new(
        ThreadRegistry::new(&config.store.state_path).context("loading thread registry")?,
    );
    let citations = Arc::new(
        FileCitationStore::new(&config.store.state_path).context("loading citation store")?,
    );

    // ── Authentication ───────────────────────────────────────────────
    let auth = Arc::new(StaticTokenAuthenticator::from_config(&config.auth));
    if auth.user_count() == 0 {
        tracing::warn!("no API users configured; every protected request will be rejected");
    } else {
        tracing::info!(users = auth.user_count(), "authenticator ready");
    }

    Ok(AppState::new(config, provider, threads, citations, auth))
}

/// Spawn the long-running background tokio tasks.
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic thread lock pruning ─────────────────────────────────
    {
        let turns = state.turns.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                turns.locks().prune_idle();
            }
        });
    }
}
