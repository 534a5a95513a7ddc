//! Capability negotiation and event normalization between a host process and
//! its presentation layer.
//!
//! [`BridgeResolver`] binds the host's invoke/listen pair from whichever API
//! shape is available, [`EventSubscriber`] registers on the notification
//! channel, [`PayloadNormalizer`] turns raw payloads into
//! [`CanonicalNotification`]s and [`CommandForwarder`] asks the host to render
//! them. [`NotificationBridge`] wires the four together.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod host;
pub mod local_host;
pub mod normalizer;
pub mod resolver;
pub mod status;
pub mod subscriber;

pub use bridge::{subscribe_notifications, NotificationBridge};
pub use commands::HostCommands;
pub use config::{load_settings, load_settings_from, BridgeSettings};
pub use error::BridgeError;
pub use forwarder::CommandForwarder;
pub use host::{BridgeHost, CommandInvoker, EventListener, HostNamespace, HostRejection, HostValue};
pub use local_host::{AckMode, HostLayout, LocalHost};
pub use normalizer::{extract_field, unwrap_envelope, FieldValue, PayloadNormalizer};
pub use resolver::{BridgeHandle, BridgeResolver, ProbeOutcome, ProbeState};
pub use shared::domain::CanonicalNotification;
pub use status::{StatusLine, StatusReporter};
pub use subscriber::{EventSubscriber, SubscriptionHandle};
