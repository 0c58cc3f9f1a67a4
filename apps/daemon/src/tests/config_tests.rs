use super::*;
use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
data_path = "/var/lib/relay/data.json"
start_timeout_ms = 2500
log_dir = "/var/log/relay"
"#,
    )
    .expect("parse");

    assert_eq!(settings.data_path, PathBuf::from("/var/lib/relay/data.json"));
    assert_eq!(settings.start_timeout_ms, 2500);
    assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/relay")));
    assert_eq!(settings.dispatch_queue, Settings::default().dispatch_queue);
}

#[test]
fn env_overrides_file_and_ignores_unparsable_numbers() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "start_timeout_ms = 2500").expect("parse");
    apply_env(
        &mut settings,
        env_of(&[
            ("APP__START_TIMEOUT_MS", "4000"),
            ("APP__DISPATCH_QUEUE", "many"),
            ("APP__LOG_FILTER", "debug"),
        ]),
    );

    assert_eq!(settings.start_timeout_ms, 4000);
    assert_eq!(settings.dispatch_queue, 16);
    assert_eq!(settings.log_filter, "debug");
}

#[test]
fn malformed_file_is_an_error() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "start_timeout_ms = \"soon\"").is_err());
}

#[test]
fn explicit_config_path_must_exist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let err = load_settings(Some(&missing)).expect_err("must fail");
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn explicit_config_path_is_loaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.toml");
    fs::write(&path, "dispatch_queue = 4").expect("write");

    let settings = load_settings(Some(&path)).expect("load");
    assert_eq!(settings.dispatch_queue, 4);
}
