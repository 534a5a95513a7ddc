use std::sync::Arc;

use tracing::{error, info};

use crate::{
    commands::HostCommands,
    config::BridgeSettings,
    error::BridgeError,
    forwarder::CommandForwarder,
    host::BridgeHost,
    normalizer::PayloadNormalizer,
    resolver::{BridgeHandle, BridgeResolver, ProbeState},
    status::StatusReporter,
    subscriber::{EventSubscriber, SubscriptionHandle},
};

/// Normalizes each payload on `channel` at delivery and forwards it for
/// rendering.
pub async fn subscribe_notifications(
    subscriber: &EventSubscriber,
    channel: &str,
    normalizer: PayloadNormalizer,
    forwarder: Arc<CommandForwarder>,
) -> Result<SubscriptionHandle, BridgeError> {
    subscriber
        .subscribe(channel, move |payload| {
            let record = normalizer.normalize(&payload);
            let forwarder = Arc::clone(&forwarder);
            async move { forwarder.forward(&record).await.map(|_| ()) }
        })
        .await
}

pub struct NotificationBridge {
    handle: BridgeHandle,
    subscription: SubscriptionHandle,
    commands: HostCommands,
}

impl NotificationBridge {
    /// Resolves the host bridge and subscribes the notification channel.
    ///
    /// A time-out or a refused subscription is reported on `status` and
    /// returned; neither is retried.
    pub async fn start(
        host: Arc<dyn BridgeHost>,
        settings: &BridgeSettings,
        status: StatusReporter,
    ) -> Result<Self, BridgeError> {
        let resolver = BridgeResolver::new(host);
        let handle = match resolver
            .resolve(settings.max_attempts, settings.probe_interval())
            .await
        {
            ProbeState::Resolved(handle) => handle,
            ProbeState::Waiting | ProbeState::TimedOut => {
                let error = BridgeError::BridgeUnavailable {
                    attempts: settings.max_attempts,
                };
                status.report_failure(&error.failure_record());
                return Err(error);
            }
        };

        let forwarder = Arc::new(
            CommandForwarder::new(&handle)
                .with_status(status.clone())
                .with_timeout(settings.notification_timeout_seconds),
        );
        let subscriber = EventSubscriber::new(&handle);
        let subscription = subscribe_notifications(
            &subscriber,
            &settings.channel,
            PayloadNormalizer::new(settings.fallback_title.clone()),
            Arc::clone(&forwarder),
        )
        .await
        .inspect_err(|error| {
            error!(
                channel = %settings.channel,
                %error,
                kind = ?error.kind(),
                "notification listener setup failed"
            );
            status.report_failure(&error.failure_record());
        })?;

        info!(
            shape = %handle.shape(),
            channel = %subscription.channel(),
            "notification bridge ready"
        );
        let commands = HostCommands::new(&handle, status).with_forwarder(forwarder);
        Ok(Self {
            handle,
            subscription,
            commands,
        })
    }

    pub fn handle(&self) -> &BridgeHandle {
        &self.handle
    }

    pub fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    pub fn commands(&self) -> &HostCommands {
        &self.commands
    }

    /// Waits for every notification already delivered to be forwarded.
    pub async fn shutdown(self) {
        self.subscription.drain().await;
    }
}
