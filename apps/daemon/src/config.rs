use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "gesture-relay.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_path: PathBuf,
    pub start_timeout_ms: u64,
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    pub dispatch_queue: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data/data.json"),
            start_timeout_ms: 3000,
            log_dir: None,
            log_filter: "info".into(),
            dispatch_queue: 16,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    data_path: Option<PathBuf>,
    start_timeout_ms: Option<u64>,
    log_dir: Option<PathBuf>,
    log_filter: Option<String>,
    dispatch_queue: Option<usize>,
}

/// Defaults, then the config file, then `APP__*` environment variables.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.data_path {
        settings.data_path = v;
    }
    if let Some(v) = file_cfg.start_timeout_ms {
        settings.start_timeout_ms = v;
    }
    if let Some(v) = file_cfg.log_dir {
        settings.log_dir = Some(v);
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.dispatch_queue {
        settings.dispatch_queue = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__DATA_PATH") {
        settings.data_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("APP__START_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.start_timeout_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__LOG_DIR") {
        settings.log_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__DISPATCH_QUEUE") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.dispatch_queue = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
