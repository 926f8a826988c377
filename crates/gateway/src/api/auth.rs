//! Request authentication.
//!
//! Protected routes run [`require_principal`], which asks the configured
//! [`Authenticator`] who is calling and stores the [`Principal`] in the
//! request extensions for handlers to extract.
//!
//! The shipped [`StaticTokenAuthenticator`] accepts the token from
//! `Authorization: Bearer <token>` or from the `fr_session` cookie, hashes
//! it with SHA-256 and compares the digest against every configured user in
//! constant time.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use fr_domain::config::{AuthConfig, UserRole};

use super::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "fr_session";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: UserRole,
}

impl Principal {
    /// Refuse read-only callers on routes that start turns or write data.
    pub fn require_write(&self) -> Result<(), ApiError> {
        if self.role.can_write() {
            Ok(())
        } else {
            Err(ApiError::InsufficientPermissions)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("UNAUTHORIZED")]
    Unauthorized,
    #[error("ACCESS_DENIED")]
    AccessDenied,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => ApiError::Unauthorized,
            AuthError::AccessDenied => ApiError::AccessDenied,
        }
    }
}

/// Resolves request headers to a principal.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static token table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TokenEntry {
    digest: [u8; 32],
    principal: Principal,
    disabled: bool,
}

pub struct StaticTokenAuthenticator {
    entries: Vec<TokenEntry>,
}

impl StaticTokenAuthenticator {
    /// Build from config.  Entries whose digest is not 64 hex characters
    /// are skipped with a warning (config validation reports them).
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let entries = cfg
            .users
            .iter()
            .filter_map(|u| {
                let mut digest = [0u8; 32];
                match hex::decode_to_slice(u.token_sha256.trim(), &mut digest) {
                    Ok(()) => Some(TokenEntry {
                        digest,
                        principal: Principal {
                            user_id: u.user_id.clone(),
                            role: u.role,
                        },
                        disabled: u.disabled,
                    }),
                    Err(e) => {
                        tracing::warn!(user_id = %u.user_id, error = %e, "ignoring user with malformed token digest");
                        None
                    }
                }
            })
            .collect();
        Self { entries }
    }

    pub fn user_count(&self) -> usize {
        self.entries.len()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = bearer_token(headers)
            .or_else(|| session_cookie(headers))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;
        let provided = Sha256::digest(token.as_bytes());

        // Compare against every entry so timing does not reveal the match position.
        let mut found: Option<&TokenEntry> = None;
        for entry in &self.entries {
            if bool::from(provided.as_slice().ct_eq(&entry.digest)) {
                found = Some(entry);
            }
        }

        match found {
            Some(entry) if entry.disabled => Err(AuthError::AccessDenied),
            Some(entry) => Ok(entry.principal.clone()),
            None => Err(AuthError::Unauthorized),
        }
    }
}

/// Hex SHA-256 digest of a token, as stored in `auth.users[].token_sha256`.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Axum middleware for protected routes.  Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_principal(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    match state.auth.authenticate(req.headers()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
