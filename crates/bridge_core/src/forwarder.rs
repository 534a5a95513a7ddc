use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde_json::Value;
use shared::{
    domain::CanonicalNotification,
    protocol::{
        HostCommand, NotificationWindowArgs, DEFAULT_NOTIFICATION_TIMEOUT_SECONDS,
        MAX_NOTIFICATION_TIMEOUT_SECONDS,
    },
};
use tracing::{debug, warn};

use crate::{error::BridgeError, host::CommandInvoker, resolver::BridgeHandle, status::StatusReporter};

/// Requests a notification surface for each canonical record.
pub struct CommandForwarder {
    invoker: Arc<dyn CommandInvoker>,
    status: Option<StatusReporter>,
    timeout_seconds: AtomicU64,
}

impl CommandForwarder {
    pub fn new(handle: &BridgeHandle) -> Self {
        Self {
            invoker: handle.invoker(),
            status: None,
            timeout_seconds: AtomicU64::new(DEFAULT_NOTIFICATION_TIMEOUT_SECONDS),
        }
    }

    pub fn with_status(mut self, status: StatusReporter) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_timeout(self, timeout_seconds: u64) -> Self {
        self.set_timeout(timeout_seconds);
        self
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.load(Ordering::SeqCst)
    }

    /// Out-of-range values are ignored.
    pub fn set_timeout(&self, timeout_seconds: u64) {
        if (1..=MAX_NOTIFICATION_TIMEOUT_SECONDS).contains(&timeout_seconds) {
            self.timeout_seconds.store(timeout_seconds, Ordering::SeqCst);
        } else {
            warn!(timeout_seconds, "ignoring out-of-range notification timeout");
        }
    }

    pub async fn forward(&self, record: &CanonicalNotification) -> Result<Value, BridgeError> {
        self.forward_with_timeout(record, self.timeout_seconds()).await
    }

    pub async fn forward_with_timeout(
        &self,
        record: &CanonicalNotification,
        timeout_seconds: u64,
    ) -> Result<Value, BridgeError> {
        let command =
            HostCommand::CreateNotificationWindow(NotificationWindowArgs::new(record, timeout_seconds));

        match self.invoker.invoke(command.name(), command.args()).await {
            Ok(ack) => {
                debug!(title = %record.title, priority = record.priority, "notification window requested");
                Ok(ack)
            }
            Err(rejection) => {
                let error = BridgeError::invoke_failure(command.name(), rejection);
                warn!(title = %record.title, %error, "failed to create notification window");
                if let Some(status) = &self.status {
                    status.report_failure(&error.failure_record());
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/forwarder_tests.rs"]
mod tests;
