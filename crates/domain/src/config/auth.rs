use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// API users
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static token table used by the gateway's authenticator.
///
/// Tokens are never stored in plaintext; each entry carries the
/// hex-encoded SHA-256 digest of the bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub user_id: String,
    pub token_sha256: String,
    #[serde(default)]
    pub role: UserRole,
    /// Disabled users authenticate but are refused with ACCESS_DENIED.
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Member,
    /// Read-only: may list messages and citations, may not start turns.
    Viewer,
}

impl UserRole {
    pub fn can_write(self) -> bool {
        !matches!(self, UserRole::Viewer)
    }
}
