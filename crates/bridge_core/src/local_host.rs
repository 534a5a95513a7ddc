//! In-process host that exposes a capability surface built from Rust closures.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use shared::domain::{EventId, ListenerId};
use tracing::debug;

use crate::host::{
    lock, BridgeHost, CommandInvoker, EventHandler, EventListener, HostEvent, HostNamespace,
    HostRejection, HostValue, ListenAck,
};

pub const DEFAULT_DENIAL_MESSAGE: &str =
    "event.listen not allowed. Permissions associated with this command: core:event:allow-listen";

pub type CommandHandler = Arc<dyn Fn(Value) -> Result<Value, HostRejection> + Send + Sync>;

/// Where the modern shape keeps its listen function, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModernListen {
    #[default]
    Absent,
    /// `core.event.listen`
    Nested,
    /// `core.listen`
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostLayout {
    pub modern_invoke: bool,
    pub modern_listen: ModernListen,
    pub legacy_invoke: bool,
    pub legacy_listen: bool,
}

impl HostLayout {
    pub fn modern() -> Self {
        Self {
            modern_invoke: true,
            modern_listen: ModernListen::Nested,
            ..Self::default()
        }
    }

    pub fn modern_flat() -> Self {
        Self {
            modern_invoke: true,
            modern_listen: ModernListen::Flat,
            ..Self::default()
        }
    }

    pub fn legacy() -> Self {
        Self {
            legacy_invoke: true,
            legacy_listen: true,
            ..Self::default()
        }
    }

    pub fn both() -> Self {
        Self {
            legacy_invoke: true,
            legacy_listen: true,
            ..Self::modern()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Immediate,
    Deferred(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub via: &'static str,
    pub command: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRecord {
    pub via: &'static str,
    pub channel: String,
    pub listener_id: Option<ListenerId>,
}

#[derive(Debug, Default)]
pub struct LocalHostBuilder {
    layout: HostLayout,
    ack: AckMode,
    deny_listen: Option<String>,
    inject_after: u32,
}

impl LocalHostBuilder {
    pub fn ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    pub fn deny_listen(mut self, message: impl Into<String>) -> Self {
        self.deny_listen = Some(message.into());
        self
    }

    /// The first `probes` probes see no host object at all.
    pub fn inject_after_probes(mut self, probes: u32) -> Self {
        self.inject_after = probes;
        self
    }

    pub fn build(self) -> LocalHost {
        LocalHost {
            inner: Arc::new(LocalHostInner {
                layout: self.layout,
                ack: self.ack,
                deny_listen: self.deny_listen,
                inject_after: self.inject_after,
                probes: AtomicU32::new(0),
                next_listener: AtomicU64::new(0),
                next_event: AtomicU64::new(0),
                commands: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                invocations: Mutex::new(Vec::new()),
                listens: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<LocalHostInner>,
}

struct LocalHostInner {
    layout: HostLayout,
    ack: AckMode,
    deny_listen: Option<String>,
    inject_after: u32,
    probes: AtomicU32,
    next_listener: AtomicU64,
    next_event: AtomicU64,
    commands: Mutex<HashMap<String, CommandHandler>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventHandler)>>>,
    invocations: Mutex<Vec<InvocationRecord>>,
    listens: Mutex<Vec<ListenRecord>>,
}

impl LocalHost {
    pub fn new(layout: HostLayout) -> Self {
        Self::builder(layout).build()
    }

    pub fn builder(layout: HostLayout) -> LocalHostBuilder {
        LocalHostBuilder {
            layout,
            ..LocalHostBuilder::default()
        }
    }

    pub fn register_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value, HostRejection> + Send + Sync + 'static,
    {
        lock(&self.inner.commands).insert(name.into(), Arc::new(handler));
    }

    /// Delivers `payload` to every listener on `channel`, in registration
    /// order. Returns the number of listeners reached.
    pub fn emit(&self, channel: &str, payload: Value) -> usize {
        let handlers: Vec<EventHandler> = lock(&self.inner.listeners)
            .get(channel)
            .map(|entries| entries.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            let id = EventId(self.inner.next_event.fetch_add(1, Ordering::SeqCst) + 1);
            handler(HostEvent {
                event: channel.to_string(),
                id,
                payload: payload.clone(),
            });
        }
        handlers.len()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        lock(&self.inner.listeners)
            .get(channel)
            .map_or(0, Vec::len)
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        lock(&self.inner.invocations).clone()
    }

    pub fn listens(&self) -> Vec<ListenRecord> {
        lock(&self.inner.listens).clone()
    }

    pub fn probe_count(&self) -> u32 {
        self.inner.probes.load(Ordering::SeqCst)
    }

    fn namespace(&self) -> HostNamespace {
        let layout = self.inner.layout;
        let mut root = HostNamespace::new();

        let mut core = HostNamespace::new();
        if layout.modern_invoke {
            core.insert("invoke", self.invoker("core.invoke"));
        }
        match layout.modern_listen {
            ModernListen::Absent => {}
            ModernListen::Nested => core.insert(
                "event",
                HostValue::Namespace(
                    HostNamespace::new().with("listen", self.listener("core.event.listen")),
                ),
            ),
            ModernListen::Flat => core.insert("listen", self.listener("core.listen")),
        }
        if !core.is_empty() {
            root.insert("core", HostValue::Namespace(core));
        }

        if layout.legacy_invoke {
            root.insert(
                "tauri",
                HostValue::Namespace(HostNamespace::new().with("invoke", self.invoker("tauri.invoke"))),
            );
        }
        if layout.legacy_listen {
            root.insert(
                "event",
                HostValue::Namespace(HostNamespace::new().with("listen", self.listener("event.listen"))),
            );
        }
        root
    }

    fn invoker(&self, via: &'static str) -> HostValue {
        HostValue::Invoker(Arc::new(LocalInvoker {
            host: Arc::clone(&self.inner),
            via,
        }))
    }

    fn listener(&self, via: &'static str) -> HostValue {
        HostValue::Listener(Arc::new(LocalListener {
            host: Arc::clone(&self.inner),
            via,
        }))
    }
}

impl BridgeHost for LocalHost {
    fn probe(&self) -> Option<HostNamespace> {
        let seen = self.inner.probes.fetch_add(1, Ordering::SeqCst);
        if seen < self.inner.inject_after {
            return None;
        }
        Some(self.namespace())
    }
}

struct LocalInvoker {
    host: Arc<LocalHostInner>,
    via: &'static str,
}

#[async_trait]
impl CommandInvoker for LocalInvoker {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, HostRejection> {
        lock(&self.host.invocations).push(InvocationRecord {
            via: self.via,
            command: command.to_string(),
            args: args.clone(),
        });

        let handler = lock(&self.host.commands).get(command).cloned();
        match handler {
            Some(handler) => handler(args),
            None => Err(HostRejection::new(format!("command {command} not found"))),
        }
    }
}

struct LocalListener {
    host: Arc<LocalHostInner>,
    via: &'static str,
}

impl EventListener for LocalListener {
    fn listen(&self, channel: &str, handler: EventHandler) -> Result<ListenAck, HostRejection> {
        if let Some(message) = &self.host.deny_listen {
            lock(&self.host.listens).push(ListenRecord {
                via: self.via,
                channel: channel.to_string(),
                listener_id: None,
            });
            let rejection = HostRejection::new(message.clone());
            return match self.host.ack {
                AckMode::Immediate => Err(rejection),
                AckMode::Deferred(delay) => Ok(ListenAck::Deferred(
                    async move {
                        tokio::time::sleep(delay).await;
                        Err(rejection)
                    }
                    .boxed(),
                )),
            };
        }

        let listener_id = ListenerId(self.host.next_listener.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.host.listeners)
            .entry(channel.to_string())
            .or_default()
            .push((listener_id, handler));
        lock(&self.host.listens).push(ListenRecord {
            via: self.via,
            channel: channel.to_string(),
            listener_id: Some(listener_id),
        });
        debug!(via = self.via, %channel, listener_id = listener_id.0, "local host registered listener");

        match self.host.ack {
            AckMode::Immediate => Ok(ListenAck::Immediate(listener_id)),
            AckMode::Deferred(delay) => Ok(ListenAck::Deferred(
                async move {
                    tokio::time::sleep(delay).await;
                    Ok(listener_id)
                }
                .boxed(),
            )),
        }
    }
}

#[cfg(test)]
#[path = "tests/local_host_tests.rs"]
mod tests;
