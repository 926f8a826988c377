pub mod ask;
pub mod config;
pub mod thread;

use clap::{Parser, Subcommand};

/// FieldRep: document-grounded assistant gateway.
#[derive(Debug, Parser)]
#[command(name = "fieldrep", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Thread ownership management.
    #[command(subcommand)]
    Thread(ThreadCommand),
    /// Send one message through a running gateway and print the reply.
    Ask {
        /// Provider thread id.
        thread_id: String,
        /// Assistant to run.
        assistant_id: String,
        /// The message to send.
        message: String,
        /// Use the non-streaming endpoint.
        #[arg(long)]
        no_stream: bool,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
    /// Print the SHA-256 digest of a token for `auth.users[].token_sha256`.
    HashToken {
        token: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ThreadCommand {
    /// Assign a provider thread to a user.
    Register {
        thread_id: String,
        user_id: String,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `FR_CONFIG` (or
/// `config.toml` by default).  Returns the parsed config and the path
/// that was used.  A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(fr_domain::config::Config, String)> {
    let config_path = std::env::var("FR_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        fr_domain::config::Config::default()
    };

    Ok((config, config_path))
}
