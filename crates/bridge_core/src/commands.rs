use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;
use shared::{
    domain::{CanonicalNotification, StatusKind},
    protocol::{ConnectionSettings, HostCommand, NotificationWindowArgs},
};
use tracing::{info, warn};

use crate::{
    error::BridgeError, forwarder::CommandForwarder, host::CommandInvoker, resolver::BridgeHandle,
    status::StatusReporter,
};

const TEST_NOTIFICATION_TITLE: &str = "Test notification";
const TEST_NOTIFICATION_MESSAGE: &str =
    "If you can see this notification, notification windows are working";
const TEST_NOTIFICATION_PRIORITY: i64 = 5;
const TEST_NOTIFICATION_TIMEOUT_SECONDS: u64 = 3;

pub struct HostCommands {
    invoker: Arc<dyn CommandInvoker>,
    status: StatusReporter,
    connected: AtomicBool,
    forwarder: Option<Arc<CommandForwarder>>,
}

impl HostCommands {
    pub fn new(handle: &BridgeHandle, status: StatusReporter) -> Self {
        Self {
            invoker: handle.invoker(),
            status,
            connected: AtomicBool::new(false),
            forwarder: None,
        }
    }

    /// Loaded, saved and connected settings set the timeout of forwarded
    /// notifications.
    pub fn with_forwarder(mut self, forwarder: Arc<CommandForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn load_config(&self) -> Result<ConnectionSettings, BridgeError> {
        let command = HostCommand::LoadConfig;
        let value = self.run(&command).await.inspect_err(|error| {
            warn!(%error, "failed to load configuration");
        })?;
        if value.is_null() {
            return Ok(ConnectionSettings::default());
        }
        let settings: ConnectionSettings =
            serde_json::from_value(value).map_err(|error| BridgeError::UnexpectedResponse {
                command: command.name().to_string(),
                message: error.to_string(),
            })?;
        self.apply_timeout(&settings);
        Ok(settings)
    }

    pub async fn save_config(&self, settings: &ConnectionSettings) -> Result<(), BridgeError> {
        let settings = self.checked(settings)?;
        match self.run(&HostCommand::SaveConfig(settings.to_args())).await {
            Ok(_) => {
                self.apply_timeout(&settings);
                self.status.report("Configuration saved", StatusKind::Success);
                Ok(())
            }
            Err(error) => {
                self.status
                    .report(format!("Failed to save configuration: {error}"), StatusKind::Error);
                Err(error)
            }
        }
    }

    pub async fn start_connection(&self, settings: &ConnectionSettings) -> Result<(), BridgeError> {
        let settings = self.checked(settings)?;
        match self
            .run(&HostCommand::StartGotifyConnection(settings.to_args()))
            .await
        {
            Ok(_) => {
                self.connected.store(true, Ordering::SeqCst);
                self.apply_timeout(&settings);
                info!(server_url = %settings.server_url, "upstream connection started");
                self.status.report("Connection started", StatusKind::Success);
                Ok(())
            }
            Err(error) => {
                self.status
                    .report(format!("Failed to start connection: {error}"), StatusKind::Error);
                Err(error)
            }
        }
    }

    pub async fn stop_connection(&self) -> Result<(), BridgeError> {
        match self.run(&HostCommand::StopGotifyConnection).await {
            Ok(_) => {
                self.connected.store(false, Ordering::SeqCst);
                self.status.report("Connection stopped", StatusKind::Info);
                Ok(())
            }
            Err(error) => {
                self.status
                    .report(format!("Failed to stop connection: {error}"), StatusKind::Error);
                Err(error)
            }
        }
    }

    pub async fn send_test_notification(&self) -> Result<(), BridgeError> {
        let record = CanonicalNotification {
            title: TEST_NOTIFICATION_TITLE.to_string(),
            message: TEST_NOTIFICATION_MESSAGE.to_string(),
            priority: TEST_NOTIFICATION_PRIORITY,
        };
        let command = HostCommand::CreateNotificationWindow(NotificationWindowArgs::new(
            &record,
            TEST_NOTIFICATION_TIMEOUT_SECONDS,
        ));
        self.run(&command)
            .await
            .map(|_| ())
            .inspect_err(|error| warn!(%error, "test notification failed"))
    }

    fn apply_timeout(&self, settings: &ConnectionSettings) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.set_timeout(settings.timeout_seconds);
        }
    }

    fn checked(&self, settings: &ConnectionSettings) -> Result<ConnectionSettings, BridgeError> {
        let settings = settings.trimmed();
        if let Err(error) = settings.require_credentials() {
            self.status
                .report("Server URL and token are required", StatusKind::Error);
            return Err(error.into());
        }
        if let Err(error) = settings.validate() {
            self.status.report(error.to_string(), StatusKind::Error);
            return Err(error.into());
        }
        Ok(settings)
    }

    async fn run(&self, command: &HostCommand) -> Result<Value, BridgeError> {
        self.invoker
            .invoke(command.name(), command.args())
            .await
            .map_err(|rejection| BridgeError::invoke_failure(command.name(), rejection))
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
