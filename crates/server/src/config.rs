use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub bind: String,
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub openai_api_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_timeout_seconds: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".into(),
            database_url: "sqlite://./data/assistant.db".into(),
            openai_api_key: None,
            openai_api_url: None,
            openai_model: None,
            openai_timeout_seconds: None,
        }
    }
}

/// Loads settings from an optional TOML file, then applies environment
/// overrides. A missing file falls back to defaults; a file that exists but
/// does not parse is an error.
pub fn load_settings() -> anyhow::Result<Settings> {
    let config_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut settings = load_settings_from(&config_path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_settings_from(config_path: &str) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(config_path) {
        Ok(raw) => {
            let file_cfg: HashMap<String, String> = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{config_path}'"))?;
            apply_file_values(&mut settings, &file_cfg);
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to read config file '{config_path}'"));
        }
    }

    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("APP_BIND") {
        settings.bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("OPENAI_API_KEY") {
        settings.openai_api_key = Some(v);
    }

    if let Ok(v) = std::env::var("OPENAI_API_URL") {
        settings.openai_api_url = Some(v);
    }

    if let Ok(v) = std::env::var("OPENAI_MODEL") {
        settings.openai_model = Some(v);
    }

    if let Ok(v) = std::env::var("OPENAI_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.openai_timeout_seconds = Some(parsed);
        }
    }
}

fn apply_file_values(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind") {
        settings.bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("openai_api_key") {
        settings.openai_api_key = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("openai_api_url") {
        settings.openai_api_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("openai_model") {
        settings.openai_model = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("openai_timeout_seconds") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.openai_timeout_seconds = Some(parsed);
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}
