use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OpenAI Assistants provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Plaintext key.  Takes precedence over `api_key_env`; prefer the env var.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request HTTP timeout.  Applies to the whole body of a streamed
    /// run, so it must outlast `turn.run_timeout_secs`.
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
    /// Value of the `OpenAI-Beta` header.
    #[serde(default = "d_beta")]
    pub beta_header: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            api_key: None,
            timeout_secs: d_timeout(),
            beta_header: d_beta(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_timeout() -> u64 {
    120
}
fn d_beta() -> String {
    "assistants=v2".into()
}
