use shared::{
    domain::ApiShape,
    error::{ConfigError, ErrorKind, FailureRecord},
};
use thiserror::Error;

use crate::host::HostRejection;

const PERMISSION_MARKERS: &[&str] = &["not allowed", "permission"];

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host bridge unavailable after {attempts} probe attempts")]
    BridgeUnavailable { attempts: u32 },
    #[error("{shape} api shape is partial: {missing} function missing")]
    PartialShape {
        shape: ApiShape,
        missing: &'static str,
    },
    #[error("subscription to '{channel}' denied: {message}")]
    PermissionDenied { channel: String, message: String },
    #[error("subscription to '{channel}' failed: {message}")]
    SubscriptionFailed { channel: String, message: String },
    #[error("command '{command}' failed: {message}")]
    InvokeFailure { command: String, message: String },
    #[error("command '{command}' returned an unexpected response: {message}")]
    UnexpectedResponse { command: String, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::BridgeUnavailable { .. } => ErrorKind::BridgeUnavailable,
            BridgeError::PartialShape { .. } => ErrorKind::PartialShape,
            BridgeError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            BridgeError::SubscriptionFailed { .. } => ErrorKind::SubscriptionFailed,
            BridgeError::InvokeFailure { .. } | BridgeError::UnexpectedResponse { .. } => {
                ErrorKind::InvokeFailure
            }
            BridgeError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    pub fn failure_record(&self) -> FailureRecord {
        FailureRecord::new(self.kind(), self.to_string())
    }

    pub fn invoke_failure(command: impl Into<String>, rejection: HostRejection) -> Self {
        BridgeError::InvokeFailure {
            command: command.into(),
            message: rejection.message,
        }
    }

    pub fn from_subscription_rejection(channel: &str, rejection: HostRejection) -> Self {
        if is_permission_rejection(&rejection.message) {
            BridgeError::PermissionDenied {
                channel: channel.to_string(),
                message: rejection.message,
            }
        } else {
            BridgeError::SubscriptionFailed {
                channel: channel.to_string(),
                message: rejection.message,
            }
        }
    }
}

pub fn is_permission_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    PERMISSION_MARKERS.iter().any(|marker| lower.contains(marker))
}
