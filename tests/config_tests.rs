// Config loading and validation tests

use statsrollup::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8090
host = "0.0.0.0"

[database]
path = "data/stats.db"
max_pool_size = 4
"#;

const CUSTOM_TIERS: &str = r#"
[[tiers]]
id = "raw"
resolution = "10s"
retention = "1h"
until = "1h"

[[tiers]]
id = "m5"
resolution = "5m"
retention = "1d"
start_from = "1h"
until = "1d"
"#;

#[test]
fn test_config_loads_with_defaults() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8090);
    assert!(config.server.api_token.is_none());
    assert_eq!(config.database.page_size, 1000);
    assert_eq!(config.database.vacuum_interval_secs, 86_400);
    assert_eq!(config.collector.sample_interval_ms, 10_000);
    assert!(config.collector.enabled);
    assert_eq!(config.retention.delete_batch_size, 50);
    assert_eq!(config.cleanup_interval_ms().unwrap(), 300_000);

    let catalog = config.catalog().unwrap();
    assert_eq!(catalog.len(), 10);
    assert_eq!(catalog.raw().id, "stats_realtime");
    assert_eq!(catalog.tiers().last().unwrap().id, "stats_12h");
}

#[test]
fn test_config_custom_tiers() {
    let config = AppConfig::load_from_str(&format!("{VALID_CONFIG}{CUSTOM_TIERS}")).unwrap();
    let catalog = config.catalog().unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.source_of(1).unwrap().id, "raw");
    assert_eq!(config.rollup_settings().delete_batch_size, 50);
}

#[test]
fn test_config_rejects_tier_gap() {
    let gapped = CUSTOM_TIERS.replace("start_from = \"1h\"", "start_from = \"2h\"");
    let err = AppConfig::load_from_str(&format!("{VALID_CONFIG}{gapped}")).unwrap_err();
    assert!(err.to_string().contains("tiers"));
}

#[test]
fn test_config_rejects_bad_tier_duration() {
    let bad = CUSTOM_TIERS.replace("resolution = \"5m\"", "resolution = \"5 fortnights\"");
    let err = AppConfig::load_from_str(&format!("{VALID_CONFIG}{bad}")).unwrap_err();
    assert!(err.to_string().contains("m5"));
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8090", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/stats.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_validation_rejects_max_pool_size_zero() {
    let bad = VALID_CONFIG.replace("max_pool_size = 4", "max_pool_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_pool_size"));
}

#[test]
fn test_config_validation_rejects_oversized_page() {
    let bad = format!("{VALID_CONFIG}page_size = 5000\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.page_size"));
}

#[test]
fn test_config_validation_rejects_bad_vacuum_schedule() {
    let bad = format!("{VALID_CONFIG}vacuum_schedule = \"whenever\"\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.vacuum_schedule"));
}

#[test]
fn test_config_validation_rejects_sample_interval_zero() {
    let bad = format!("{VALID_CONFIG}\n[collector]\nsample_interval_ms = 0\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("collector.sample_interval_ms"));
}

#[test]
fn test_config_validation_rejects_bad_cleanup_interval() {
    let bad = format!("{VALID_CONFIG}\n[retention]\ncleanup_interval = \"soon\"\n");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("retention.cleanup_interval"));
}

#[test]
fn test_config_validation_rejects_empty_token() {
    let bad = VALID_CONFIG.replace("host = \"0.0.0.0\"", "host = \"0.0.0.0\"\napi_token = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.api_token"));
}
