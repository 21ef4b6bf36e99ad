use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::error::ClientError;

pub const SETTINGS_FILE: &str = "lms.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/api".into(),
            auth_token: None,
            request_timeout_secs: 30,
            tick_interval_ms: 1000,
        }
    }
}

impl ClientSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Defaults, then `lms.toml` in the working directory, then environment overrides.
pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    apply_file_overrides(&mut settings, Path::new(SETTINGS_FILE));
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_overrides(settings: &mut ClientSettings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) else {
        tracing::warn!("config: ignoring unparsable settings file {}", path.display());
        return;
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("auth_token").and_then(toml::Value::as_str) {
        settings.auth_token = Some(v.to_string());
    }
    if let Some(v) = file_cfg
        .get("request_timeout_secs")
        .and_then(toml::Value::as_integer)
    {
        if let Ok(parsed) = u64::try_from(v) {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = file_cfg
        .get("tick_interval_ms")
        .and_then(toml::Value::as_integer)
    {
        if let Ok(parsed) = u64::try_from(v) {
            settings.tick_interval_ms = parsed;
        }
    }
}

fn apply_env_overrides(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("LMS_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = var("LMS_AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }
    if let Some(v) = var("APP__AUTH_TOKEN") {
        settings.auth_token = Some(v);
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = var("APP__TICK_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.tick_interval_ms = parsed;
        }
    }
}

/// Explicit connection context handed to whatever performs network calls.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub base_url: Url,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl ApiContext {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ClientError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed).map_err(|err| {
            ClientError::Config(format!("invalid api base url '{trimmed}': {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "api base url '{trimmed}' cannot carry a path"
            )));
        }
        Ok(Self {
            base_url,
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let mut ctx = Self::new(&settings.api_base_url, settings.auth_token.clone())?;
        ctx.request_timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        Ok(ctx)
    }

    /// Base URL with `segments` appended, each percent-encoded as a single path segment.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::Config(format!(
                    "api base url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
