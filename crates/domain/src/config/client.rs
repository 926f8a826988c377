use serde::{Deserialize, Serialize};

/// Settings for the `ask` command, which talks to a running gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token sent to the gateway.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Hard ceiling on one turn, after which the client settles locally.
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            token_env: d_token_env(),
            timeout_secs: d_timeout(),
        }
    }
}

fn d_base_url() -> String {
    "http://127.0.0.1:3210".into()
}
fn d_token_env() -> String {
    "FR_TOKEN".into()
}
fn d_timeout() -> u64 {
    120
}
