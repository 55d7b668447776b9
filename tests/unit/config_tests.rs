use std::io::Write;
use std::time::Duration;

use hook_runner::acp::AcpClientConfig;
use hook_runner::{config::GlobalConfig, AppError};

fn sample_toml() -> &'static str {
    r#"
[agent]
timeout_seconds = 120
kill_grace_millis = 500
client_name = "ci-hooks"
env_allowlist = ["PATH", "HOME"]

[pool]
max_concurrent_actions = 5
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config should parse");

    assert_eq!(config.agent.timeout_seconds, 120);
    assert_eq!(config.agent.timeout(), Duration::from_secs(120));
    assert_eq!(config.agent.kill_grace(), Duration::from_millis(500));
    assert_eq!(config.agent.client_name, "ci-hooks");
    assert_eq!(
        config.agent.env_allowlist,
        Some(vec!["PATH".to_owned(), "HOME".to_owned()])
    );
    assert_eq!(config.pool.max_concurrent_actions, 5);
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config should parse");

    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.agent.timeout_seconds, 300);
    assert_eq!(config.agent.kill_grace_millis, 2000);
    assert_eq!(config.agent.client_name, "hook-runner");
    assert!(config.agent.env_allowlist.is_none());
    assert_eq!(config.pool.max_concurrent_actions, 3);
}

#[test]
fn partial_sections_fill_in_defaults() {
    let config = GlobalConfig::from_toml_str("[pool]\nmax_concurrent_actions = 1\n")
        .expect("partial config should parse");

    assert_eq!(config.pool.max_concurrent_actions, 1);
    assert_eq!(config.agent.timeout_seconds, 300);
}

#[test]
fn zero_timeout_is_rejected() {
    let result = GlobalConfig::from_toml_str("[agent]\ntimeout_seconds = 0\n");
    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("timeout_seconds")),
        "{result:?}"
    );
}

#[test]
fn zero_pool_capacity_is_rejected() {
    let result = GlobalConfig::from_toml_str("[pool]\nmax_concurrent_actions = 0\n");
    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("max_concurrent_actions")),
        "{result:?}"
    );
}

#[test]
fn blank_client_name_is_rejected() {
    let result = GlobalConfig::from_toml_str("[agent]\nclient_name = \"  \"\n");
    assert!(matches!(result, Err(AppError::Config(_))), "{result:?}");
}

#[test]
fn invalid_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("[agent\ntimeout_seconds = ");
    match result {
        Err(AppError::Config(msg)) => assert!(msg.starts_with("invalid config"), "{msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("config should load");
    assert_eq!(config.agent.client_name, "ci-hooks");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("failed to read config")),
        "{result:?}"
    );
}

#[test]
fn client_config_is_derived_from_agent_section() {
    let config = GlobalConfig::from_toml_str(sample_toml()).unwrap();
    let client = AcpClientConfig::from(&config.agent);

    assert_eq!(client.default_timeout, Duration::from_secs(120));
    assert_eq!(client.kill_grace, Duration::from_millis(500));
    assert_eq!(client.client_info.name, "ci-hooks");
    assert!(client.client_info.version.is_some());
    assert_eq!(client.env_allowlist, config.agent.env_allowlist);
}
