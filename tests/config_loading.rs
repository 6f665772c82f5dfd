use std::io::Write;

use ferry_core::config::{AppConfig, McpTransport};
use ferry_core::error::FerryError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[agent]
max_steps = 40
system_prompt = "You query databases."
confirm_tools = ["drop_table"]

[agent.stream_fields]
sequentialthinking = "thought"
write_report = "body"

[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
base_url = "http://localhost:11434/v1"
temperature = 0.2

[model.retry]
max_attempts = 5
min_backoff_ms = 100
max_backoff_ms = 200

[gateway]
bind = "0.0.0.0:9999"

[mcp.servers.db]
timeout_secs = 30

[mcp.servers.db.transport]
type = "stdio"
command = "npx"
args = ["-y", "db-mcp"]
env = { DB_URL = "postgres://localhost/app" }
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agent.max_steps, 40);
    assert_eq!(config.agent.system_prompt(), "You query databases.");
    assert_eq!(config.agent.confirm_tools, vec!["drop_table".to_string()]);
    assert_eq!(config.agent.stream_fields.len(), 2);
    assert_eq!(config.agent.stream_fields["write_report"], "body");
    assert_eq!(config.model.api_key.as_deref(), Some("sk-test-key"));
    assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:11434/v1"));
    assert_eq!(config.model.retry.max_attempts, 5);
    assert_eq!(config.gateway.bind, "0.0.0.0:9999");

    let db = &config.mcp.servers["db"];
    assert_eq!(db.timeout_secs, 30);
    match &db.transport {
        McpTransport::Stdio { command, env, .. } => {
            assert_eq!(command, "npx");
            assert_eq!(env["DB_URL"], "postgres://localhost/app");
        }
        other => panic!("unexpected transport {:?}", other),
    }
}

#[test]
fn test_load_expands_env_vars() {
    std::env::set_var("FERRY_TEST_API_KEY", "sk-from-env");
    let tmp = write_config(
        r#"
[model]
model_id = "gpt-4o-mini"
api_key = "${FERRY_TEST_API_KEY}"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key.as_deref(), Some("sk-from-env"));
    std::env::remove_var("FERRY_TEST_API_KEY");
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    match AppConfig::load(&path) {
        Err(FerryError::ConfigNotFound(p)) => assert!(p.ends_with("absent.toml")),
        other => panic!("expected ConfigNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_values_are_rejected() {
    let missing_model = write_config("[agent]\nmax_steps = 5\n");
    assert!(matches!(
        AppConfig::load(missing_model.path()),
        Err(FerryError::Config(_))
    ));

    let zero_steps = write_config("[agent]\nmax_steps = 0\n\n[model]\nmodel_id = \"m\"\n");
    assert!(matches!(
        AppConfig::load(zero_steps.path()),
        Err(FerryError::Config(_))
    ));
}
