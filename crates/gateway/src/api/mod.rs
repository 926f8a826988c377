pub mod auth;
pub mod chat;
pub mod citations;
pub mod error;
pub mod health;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the authenticator middleware, which attaches the caller's
/// [`auth::Principal`]).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        // Turns
        .route("/v1/chat/turn", post(chat::turn))
        .route("/v1/chat/messages", get(chat::messages))
        // Citations
        .route("/v1/chat/citations", post(citations::store).get(citations::list))
        .route_layer(middleware::from_fn_with_state(state, auth::require_principal));

    public.merge(protected)
}
