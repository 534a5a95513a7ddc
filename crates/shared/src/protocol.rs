use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::{domain::CanonicalNotification, error::ConfigError};

/// Channel the host emits upstream notification frames on.
pub const NOTIFICATION_CHANNEL: &str = "gotify-message";

pub const TITLE_KEYS: &[&str] = &["title", "Title", "subject", "Subject"];
pub const MESSAGE_KEYS: &[&str] = &[
    "message", "Message", "msg", "content", "Content", "body", "Body",
];
pub const PRIORITY_KEYS: &[&str] = &["priority", "Priority", "level", "Level"];

pub const DEFAULT_NOTIFICATION_TIMEOUT_SECONDS: u64 = 5;
pub const MAX_NOTIFICATION_TIMEOUT_SECONDS: u64 = 300;

const ALLOWED_SERVER_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Arguments shared by `save_config` and `start_gotify_connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionArgs {
    pub server_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWindowArgs {
    pub title: String,
    pub message: String,
    pub priority: i64,
    pub timeout_seconds: u64,
}

impl NotificationWindowArgs {
    pub fn new(record: &CanonicalNotification, timeout_seconds: u64) -> Self {
        Self {
            title: record.title.clone(),
            message: record.message.clone(),
            priority: record.priority,
            timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    LoadConfig,
    SaveConfig(ConnectionArgs),
    StartGotifyConnection(ConnectionArgs),
    StopGotifyConnection,
    CreateNotificationWindow(NotificationWindowArgs),
}

impl HostCommand {
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::LoadConfig => "load_config",
            HostCommand::SaveConfig(_) => "save_config",
            HostCommand::StartGotifyConnection(_) => "start_gotify_connection",
            HostCommand::StopGotifyConnection => "stop_gotify_connection",
            HostCommand::CreateNotificationWindow(_) => "create_notification_window",
        }
    }

    pub fn args(&self) -> Value {
        match self {
            HostCommand::LoadConfig | HostCommand::StopGotifyConnection => json!({}),
            HostCommand::SaveConfig(args) | HostCommand::StartGotifyConnection(args) => json!({
                "serverUrl": args.server_url,
                "token": args.token,
                "timeoutSeconds": args.timeout_seconds,
            }),
            HostCommand::CreateNotificationWindow(args) => json!({
                "title": args.title,
                "message": args.message,
                "priority": args.priority,
                "timeoutSeconds": args.timeout_seconds,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub server_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            token: String::new(),
            timeout_seconds: DEFAULT_NOTIFICATION_TIMEOUT_SECONDS,
        }
    }
}

impl ConnectionSettings {
    pub fn new(
        server_url: impl Into<String>,
        token: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            timeout_seconds,
        }
    }

    pub fn trimmed(&self) -> Self {
        Self {
            server_url: self.server_url.trim().to_string(),
            token: self.token.trim().to_string(),
            timeout_seconds: self.timeout_seconds,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_NOTIFICATION_TIMEOUT_SECONDS {
            return Err(ConfigError::TimeoutOutOfRange(self.timeout_seconds));
        }

        let server_url = self.server_url.trim();
        if server_url.is_empty() {
            return Ok(());
        }

        let parsed = Url::parse(server_url)
            .map_err(|_| ConfigError::InvalidServerUrl(server_url.to_string()))?;
        if !ALLOWED_SERVER_SCHEMES.contains(&parsed.scheme()) {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        Ok(())
    }

    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::MissingField("server url"));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("token"));
        }
        Ok(())
    }

    pub fn to_args(&self) -> ConnectionArgs {
        ConnectionArgs {
            server_url: self.server_url.clone(),
            token: self.token.clone(),
            timeout_seconds: self.timeout_seconds,
        }
    }
}
