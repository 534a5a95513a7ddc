use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BridgeUnavailable,
    PartialShape,
    PermissionDenied,
    SubscriptionFailed,
    InvokeFailure,
    MalformedPayload,
    InvalidConfig,
}

impl ErrorKind {
    pub fn is_terminal_for_setup(self) -> bool {
        matches!(
            self,
            ErrorKind::BridgeUnavailable | ErrorKind::PermissionDenied
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    pub detail: String,
}

impl FailureRecord {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("timeout must be between 1 and 300 seconds, got {0}")]
    TimeoutOutOfRange(u64),
    #[error("server url '{0}' is not a valid absolute url")]
    InvalidServerUrl(String),
    #[error("server url must start with http://, https://, ws:// or wss://, got scheme '{0}'")]
    UnsupportedScheme(String),
}
