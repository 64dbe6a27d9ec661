use spotledger::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.consumption.base_url = "https://meter.test/api".to_string();
    cfg.cache.directory = tmp_dir.path().join("cache").to_string_lossy().to_string();
    cfg.settings.year = Some(2023);
    cfg.settings.margin_cents_per_kwh = 0.49;

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.consumption.base_url, "https://meter.test/api");
    assert_eq!(loaded.cache.directory, cfg.cache.directory);
    assert_eq!(loaded.settings.year, Some(2023));
    assert!((loaded.settings.margin_cents_per_kwh - 0.49).abs() < 1e-9);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    assert!(cfg.validate().is_ok());

    // Empty URL
    cfg.prices.base_url.clear();
    assert!(cfg.validate().is_err());

    // No attempts at all
    cfg = Config::default();
    cfg.fetch.max_retries = 0;
    assert!(cfg.validate().is_err());

    // Unknown zone
    cfg = Config::default();
    cfg.consumption.timezone = "Europe/Atlantis".to_string();
    assert!(cfg.validate().is_err());

    // Markup that would flip the sign of every price
    cfg = Config::default();
    cfg.prices.markup_percent = -100.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.settings.margin_cents_per_kwh = f64::INFINITY;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn from_file_missing_is_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("nope.yaml")).unwrap_err();
    assert!(format!("{}", err).contains("I/O error"));
}
