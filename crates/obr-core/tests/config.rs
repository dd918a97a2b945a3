use std::time::Duration;

use obr_core::config::{dirs_path, ObrConfig};
use obr_util::errors::ObrError;

#[test]
fn test_config_defaults() {
    let config = ObrConfig::default();
    assert!(config.repositories.is_empty());
    assert_eq!(config.fetch.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.fetch.read_timeout(), Duration::from_secs(60));
    assert_eq!(config.fetch.retries, 2);
    assert!(config.fetch.user_agent.starts_with("obr/"));
    assert_eq!(config.refresh.staleness(), Duration::from_secs(300));
    assert_eq!(config.refresh.max_referral_depth, 4);
    assert!(!config.resolver.skip_optional);
    assert_eq!(config.resolver.max_multiple_providers, 0);
}

#[test]
fn test_empty_toml_matches_defaults() {
    let config = ObrConfig::parse("").unwrap();
    assert_eq!(config, ObrConfig::default());
}

#[test]
fn test_dirs_path_contains_obr() {
    let path = dirs_path();
    assert!(path.ends_with(".obr"));
    assert!(ObrConfig::default_path().ends_with(".obr/config.toml"));
}

#[test]
fn test_config_parse_from_toml() {
    let toml = r#"
repositories = ["https://repo.example.org/repository.xml", "file:///srv/obr/index.xml.gz"]

[fetch]
connect-timeout-secs = 3
retries = 0
user-agent = "test-agent"

[refresh]
staleness-secs = 0
max-referral-depth = 1

[resolver]
skip-optional = true
max-multiple-providers = 5
"#;
    let config = ObrConfig::parse(toml).unwrap();
    assert_eq!(config.repositories.len(), 2);
    assert_eq!(config.fetch.connect_timeout_secs, 3);
    assert_eq!(config.fetch.read_timeout_secs, 60);
    assert_eq!(config.fetch.retries, 0);
    assert_eq!(config.fetch.user_agent, "test-agent");
    assert_eq!(config.refresh.staleness_secs, 0);
    assert_eq!(config.refresh.max_referral_depth, 1);
    assert!(config.resolver.skip_optional);
    assert_eq!(config.resolver.max_multiple_providers, 5);
}

#[test]
fn test_load_from_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ObrConfig::load_from(&dir.path().join("nope.toml")).unwrap();
    assert_eq!(config, ObrConfig::default());
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[refresh]\nstaleness-secs = 42\n").unwrap();
    let config = ObrConfig::load_from(&path).unwrap();
    assert_eq!(config.refresh.staleness_secs, 42);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[fetch\nretries = ").unwrap();
    let err = ObrConfig::load_from(&path).unwrap_err();
    match err {
        ObrError::Config { message } => assert!(message.contains("config.toml"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_type_is_config_error() {
    let err = ObrConfig::parse("[fetch]\nretries = \"many\"\n").unwrap_err();
    assert!(matches!(err, ObrError::Config { .. }));
}
