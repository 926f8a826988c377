use fr_domain::config::{Config, ConfigSeverity, UserRole};

const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn turn_defaults_match_client_ceiling() {
    let config = Config::default();
    assert_eq!(config.turn.run_timeout_secs, 110);
    assert_eq!(config.turn.lock_wait_secs, 30);
    assert_eq!(config.turn.blocking_timeout_secs, 60);
    assert_eq!(config.turn.poll_interval_ms, 1000);
    assert_eq!(config.turn.max_sources, 5);
    assert_eq!(config.client.timeout_secs, 120);
    assert!(config.turn.run_timeout_secs < config.client.timeout_secs);
}

#[test]
fn openai_defaults() {
    let config = Config::default();
    assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
    assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.openai.beta_header, "assistants=v2");
}

#[test]
fn full_config_parses() {
    let toml_str = format!(
        r#"
[server]
host = "0.0.0.0"

[openai]
api_key = "sk-test"

[turn]
run_timeout_secs = 90

[store]
state_path = "/var/lib/fieldrep"

[[auth.users]]
user_id = "rep-7"
token_sha256 = "{DIGEST}"
role = "viewer"
"#
    );
    let config: Config = toml::from_str(&toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.turn.run_timeout_secs, 90);
    assert_eq!(config.turn.lock_wait_secs, 30);
    assert_eq!(config.store.state_path.to_str(), Some("/var/lib/fieldrep"));
    assert_eq!(config.auth.users[0].role, UserRole::Viewer);
}

#[test]
fn valid_config_has_no_errors() {
    let toml_str = format!(
        r#"
[openai]
api_key = "sk-test"

[[auth.users]]
user_id = "rep-7"
token_sha256 = "{DIGEST}"
"#
    );
    let config: Config = toml::from_str(&toml_str).unwrap();
    let issues = config.validate();
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[test]
fn bad_digest_and_zero_port_are_errors() {
    let toml_str = r#"
[server]
port = 0

[[auth.users]]
user_id = "rep-7"
token_sha256 = "not-a-digest"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    let fields: Vec<_> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .map(|i| i.field.as_str())
        .collect();
    assert!(fields.contains(&"server.port"));
    assert!(fields.contains(&"auth.users[0].token_sha256"));
}

#[test]
fn missing_users_is_only_a_warning() {
    let mut config = Config::default();
    config.openai.api_key = Some("sk".into());
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].field, "auth.users");
}

#[test]
fn duplicate_digest_is_an_error() {
    let toml_str = format!(
        r#"
[openai]
api_key = "sk"

[[auth.users]]
user_id = "a"
token_sha256 = "{DIGEST}"

[[auth.users]]
user_id = "b"
token_sha256 = "{DIGEST}"
"#
    );
    let config: Config = toml::from_str(&toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, "auth.users[1].token_sha256");
}
