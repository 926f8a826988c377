mod auth;
mod client;
mod observability;
mod openai;
mod server;
mod store;
mod turn;

pub use auth::*;
pub use client::*;
pub use observability::*;
pub use openai::*;
pub use server::*;
pub use store::*;
pub use turn::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn issue(severity: ConfigSeverity, field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity,
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        use ConfigSeverity::{Error, Warning};
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(issue(Error, "server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(issue(Error, "server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(issue(
                Error,
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            errors.push(issue(
                Warning,
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.openai.base_url.is_empty() {
            errors.push(issue(Error, "openai.base_url", "base_url must not be empty"));
        }
        if self.openai.api_key.is_none() && std::env::var(&self.openai.api_key_env).is_err() {
            errors.push(issue(
                Warning,
                "openai.api_key_env",
                format!("environment variable '{}' is not set", self.openai.api_key_env),
            ));
        }
        if self.openai.timeout_secs <= self.turn.run_timeout_secs {
            errors.push(issue(
                Warning,
                "openai.timeout_secs",
                "HTTP timeout should exceed turn.run_timeout_secs or streamed runs are cut short",
            ));
        }

        for (field, value) in [
            ("turn.run_timeout_secs", self.turn.run_timeout_secs),
            ("turn.lock_wait_secs", self.turn.lock_wait_secs),
            ("turn.blocking_timeout_secs", self.turn.blocking_timeout_secs),
            ("turn.poll_interval_ms", self.turn.poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(issue(Error, field, "must be greater than 0"));
            }
        }
        if self.turn.run_timeout_secs >= self.client.timeout_secs {
            errors.push(issue(
                Warning,
                "turn.run_timeout_secs",
                "clients give up before the server reports a run timeout",
            ));
        }

        if self.auth.users.is_empty() {
            errors.push(issue(
                Warning,
                "auth.users",
                "no API users configured; every protected request will be rejected",
            ));
        }
        let mut seen = HashSet::new();
        for (i, user) in self.auth.users.iter().enumerate() {
            if user.user_id.is_empty() {
                errors.push(issue(Error, format!("auth.users[{i}].user_id"), "user_id must not be empty"));
            }
            if user.token_sha256.len() != 64 || !user.token_sha256.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push(issue(
                    Error,
                    format!("auth.users[{i}].token_sha256"),
                    "must be a 64-character hex SHA-256 digest",
                ));
            }
            if !seen.insert(user.token_sha256.to_ascii_lowercase()) {
                errors.push(issue(
                    Error,
                    format!("auth.users[{i}].token_sha256"),
                    "duplicate token digest",
                ));
            }
        }

        errors
    }
}
