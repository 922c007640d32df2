use std::io::Write;

use cortex::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[executor]
max_replans = 5
planner = "brain"

[session]
idle_timeout_secs = 120
reaper_interval_secs = 10

[jobs]
retention_secs = 600

[log]
filter = "cortex=debug"

[aliases.write_file]
name = "filename"

[aliases.render]
subject = "topic"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.executor.max_replans, 5);
    assert_eq!(config.executor.planner, "brain");
    assert_eq!(config.session.idle_timeout_secs, 120);
    assert_eq!(config.session.reaper_interval_secs, 10);
    assert_eq!(config.jobs.retention_secs, 600);
    assert_eq!(config.jobs.reaper_interval_secs, 60);
    assert_eq!(config.log.filter, "cortex=debug");
    assert_eq!(config.aliases["write_file"]["name"], "filename");
    assert_eq!(config.aliases["render"]["subject"], "topic");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("CORTEX_TEST_PLANNER", "env-planner");

    let toml_content = r#"
[executor]
planner = "${CORTEX_TEST_PLANNER}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.executor.planner, "env-planner");

    std::env::remove_var("CORTEX_TEST_PLANNER");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[log]
filter = "warn"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.executor.max_replans, 3);
    assert_eq!(config.executor.planner, "planner");
    assert_eq!(config.session.idle_timeout_secs, 1800);
    assert_eq!(config.session.reaper_interval_secs, 60);
    assert!(config.aliases.is_empty());
}

#[test]
fn test_wrong_type_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[executor]\nmax_replans = \"many\"\n")
        .expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert_eq!(err.kind(), "Config");
}
