//! Configuration loading tests

use std::fs;

use tempfile::TempDir;

use querytoken::config::QueryConfig;

#[test]
fn test_load_from_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("querytoken.json");
    fs::write(&path, r#"{"default_page_size": 50, "raw_param_cap": 5}"#).unwrap();

    let config = QueryConfig::load(&path).unwrap();
    assert_eq!(config.default_page_size, 50);
    assert_eq!(config.raw_param_cap, 5);
    assert_eq!(config.max_page_size, QueryConfig::default().max_page_size);
}

#[test]
fn test_load_rejects_default_above_max() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("querytoken.json");
    fs::write(&path, r#"{"default_page_size": 500, "max_page_size": 100}"#).unwrap();

    let err = QueryConfig::load(&path).unwrap_err();
    assert_eq!(err.code(), "QT_CONFIG_INVALID");
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    assert!(QueryConfig::load(&dir.path().join("absent.json")).is_err());
}

#[test]
fn test_env_overrides() {
    let vars = vec![
        ("QUERYTOKEN_DEFAULT_PAGE_SIZE".to_string(), "7".to_string()),
        ("QUERYTOKEN_INCLUDE_SQL".to_string(), "true".to_string()),
        ("UNRELATED".to_string(), "x".to_string()),
    ];
    let config = QueryConfig::default().with_overrides(vars).unwrap();
    assert_eq!(config.default_page_size, 7);
    assert!(config.include_sql);
}

#[test]
fn test_env_override_must_parse() {
    let vars = vec![("QUERYTOKEN_MAX_JOINS".to_string(), "many".to_string())];
    assert!(QueryConfig::default().with_overrides(vars).is_err());
}
