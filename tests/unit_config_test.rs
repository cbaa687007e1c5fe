// tests/unit_config_test.rs

use std::io::Write;
use std::time::Duration;

use fleetkeeper::config::Config;

#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 4870);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.handshake_timeout, Duration::from_secs(30));
    assert_eq!(config.idle_timeout, Duration::from_secs(60));
    assert!(!config.tls.enabled);
    assert_eq!(config.presence.staleness, Duration::from_secs(60));
    assert_eq!(config.presence.sweep_interval, Duration::from_secs(60));
    assert_eq!(config.presence.lock_warn_budget, Duration::from_secs(3));
    config.validate().unwrap();
}

#[test]
fn test_default_trait_matches_serde_defaults() {
    let from_toml: Config = toml::from_str("").unwrap();
    let from_default = Config::default();

    assert_eq!(from_toml.port, from_default.port);
    assert_eq!(from_toml.idle_timeout, from_default.idle_timeout);
    assert_eq!(from_toml.tls.cert_path, from_default.tls.cert_path);
    assert_eq!(
        from_toml.presence.staleness,
        from_default.presence.staleness
    );
}

#[test]
fn test_from_file_applies_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
host = "0.0.0.0"
port = 5100
idle_timeout = "90s"

[presence]
staleness = "2m"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 5100);
    assert_eq!(config.idle_timeout, Duration::from_secs(90));
    assert_eq!(config.presence.staleness, Duration::from_secs(120));
    // Untouched sections keep their defaults.
    assert_eq!(config.handshake_timeout, Duration::from_secs(30));
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/fleetkeeper.toml").is_err());
}

#[test]
fn test_tls_enabled_requires_cert_and_key_paths() {
    let config: Config = toml::from_str(
        r#"
[tls]
enabled = true
cert_path = ""
key_path = ""
"#,
    )
    .unwrap();

    assert!(config.validate().is_err());
}

#[test]
fn test_zero_timeouts_are_rejected() {
    let config: Config = toml::from_str("idle_timeout = \"0s\"").unwrap();
    assert!(config.validate().is_err());
}
