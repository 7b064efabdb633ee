use std::fs;

use serde::Deserialize;
use tracing::warn;

/// Client-side settings for the watcher and the HTTP client. Defaults are
/// overridden by `watch.toml`, which in turn is overridden by environment
/// variables.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub page_size: u32,
    pub list_refresh_secs: u64,
    pub stats_refresh_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            page_size: 20,
            list_refresh_secs: 30,
            stats_refresh_secs: 60,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    page_size: Option<u32>,
    list_refresh_secs: Option<u64>,
    stats_refresh_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

pub fn load_settings() -> ApiSettings {
    let mut settings = ApiSettings::default();

    if let Ok(raw) = fs::read_to_string("watch.toml") {
        apply_file_settings(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings);

    settings
}

fn apply_file_settings(settings: &mut ApiSettings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(error = %err, "ignoring malformed watch.toml");
            return;
        }
    };
    if let Some(v) = file_cfg.base_url {
        settings.base_url = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v;
    }
    if let Some(v) = file_cfg.list_refresh_secs {
        settings.list_refresh_secs = v;
    }
    if let Some(v) = file_cfg.stats_refresh_secs {
        settings.stats_refresh_secs = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
}

fn apply_env_overrides(settings: &mut ApiSettings) {
    if let Ok(v) = std::env::var("CIVIC_API_URL") {
        settings.base_url = v;
    }
    if let Ok(v) = std::env::var("CIVIC_PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed;
        }
    }
    if let Ok(v) = std::env::var("CIVIC_REFRESH_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.list_refresh_secs = parsed;
        }
    }
    if let Ok(v) = std::env::var("CIVIC_STATS_REFRESH_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.stats_refresh_secs = parsed;
        }
    }
    if let Ok(v) = std::env::var("CIVIC_REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}
