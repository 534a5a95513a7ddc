use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use shared::{
    domain::DEFAULT_TITLE,
    protocol::{DEFAULT_NOTIFICATION_TIMEOUT_SECONDS, NOTIFICATION_CHANNEL},
};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "bridge.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub max_attempts: u32,
    pub probe_interval_ms: u64,
    pub channel: String,
    pub status_display_ms: u64,
    pub notification_timeout_seconds: u64,
    pub fallback_title: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            probe_interval_ms: 100,
            channel: NOTIFICATION_CHANNEL.into(),
            status_display_ms: 3000,
            notification_timeout_seconds: DEFAULT_NOTIFICATION_TIMEOUT_SECONDS,
            fallback_title: DEFAULT_TITLE.into(),
        }
    }
}

impl BridgeSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn status_display(&self) -> Duration {
        Duration::from_millis(self.status_display_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    max_attempts: Option<u32>,
    probe_interval_ms: Option<u64>,
    channel: Option<String>,
    status_display_ms: Option<u64>,
    notification_timeout_seconds: Option<u64>,
    fallback_title: Option<String>,
}

/// Defaults, then `bridge.toml` in the working directory, then environment.
pub fn load_settings() -> BridgeSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> BridgeSettings {
    let mut settings = BridgeSettings::default();

    match read_file_settings(path) {
        Ok(Some(file_cfg)) => apply_file_settings(&mut settings, file_cfg),
        Ok(None) => {}
        Err(error) => warn!(
            path = %path.display(),
            error = %format!("{error:#}"),
            "ignoring settings file; keeping defaults"
        ),
    }

    apply_env_overrides(&mut settings, env);

    if settings.max_attempts == 0 {
        settings.max_attempts = 1;
    }
    settings
}

/// `--config` path if given, else `bridge.toml` in the working directory,
/// else the per-user config directory.
pub fn settings_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let local = PathBuf::from(DEFAULT_SETTINGS_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("gotify-bridge").join(DEFAULT_SETTINGS_FILE))
        .unwrap_or(local)
}

fn read_file_settings(path: &Path) -> anyhow::Result<Option<FileSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let parsed = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_settings(settings: &mut BridgeSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.max_attempts {
        settings.max_attempts = v;
    }
    if let Some(v) = file_cfg.probe_interval_ms {
        settings.probe_interval_ms = v;
    }
    if let Some(v) = file_cfg.channel {
        settings.channel = v;
    }
    if let Some(v) = file_cfg.status_display_ms {
        settings.status_display_ms = v;
    }
    if let Some(v) = file_cfg.notification_timeout_seconds {
        settings.notification_timeout_seconds = v;
    }
    if let Some(v) = file_cfg.fallback_title {
        settings.fallback_title = v;
    }
}

fn apply_env_overrides(settings: &mut BridgeSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = parsed_env(&env, "BRIDGE__MAX_ATTEMPTS") {
        settings.max_attempts = v;
    }
    if let Some(v) = parsed_env(&env, "BRIDGE__PROBE_INTERVAL_MS") {
        settings.probe_interval_ms = v;
    }
    if let Some(v) = env("BRIDGE__CHANNEL") {
        settings.channel = v;
    }
    if let Some(v) = parsed_env(&env, "BRIDGE__STATUS_DISPLAY_MS") {
        settings.status_display_ms = v;
    }
    if let Some(v) = parsed_env(&env, "BRIDGE__NOTIFICATION_TIMEOUT_SECONDS") {
        settings.notification_timeout_seconds = v;
    }
    if let Some(v) = env("BRIDGE__FALLBACK_TITLE") {
        settings.fallback_title = v;
    }
}

fn parsed_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
