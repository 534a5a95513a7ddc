//! Loosely typed model of the host capability surface.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;
use shared::domain::{EventId, ListenerId};
use thiserror::Error;

/// Refusal raised by a host function, carrying the host's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostRejection {
    pub message: String,
}

impl HostRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    pub event: String,
    pub id: EventId,
    pub payload: Value,
}

pub type EventHandler = Arc<dyn Fn(HostEvent) + Send + Sync>;

#[async_trait]
pub trait CommandInvoker: Send + Sync {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, HostRejection>;
}

/// Acknowledgment of a listen call: either already settled or still pending.
pub enum ListenAck {
    Immediate(ListenerId),
    Deferred(BoxFuture<'static, Result<ListenerId, HostRejection>>),
}

impl ListenAck {
    /// Uniform completion view; an immediate ack is an already-resolved completion.
    pub fn into_completion(self) -> BoxFuture<'static, Result<ListenerId, HostRejection>> {
        match self {
            ListenAck::Immediate(id) => futures::future::ready(Ok(id)).boxed(),
            ListenAck::Deferred(pending) => pending,
        }
    }
}

impl fmt::Debug for ListenAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAck::Immediate(id) => f.debug_tuple("Immediate").field(id).finish(),
            ListenAck::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

pub trait EventListener: Send + Sync {
    /// Registers `handler` on `channel`. A synchronous `Err` is a refusal.
    fn listen(&self, channel: &str, handler: EventHandler) -> Result<ListenAck, HostRejection>;
}

#[derive(Clone)]
pub enum HostValue {
    Namespace(HostNamespace),
    Invoker(Arc<dyn CommandInvoker>),
    Listener(Arc<dyn EventListener>),
    Data(Value),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Namespace(_) => "namespace",
            HostValue::Invoker(_) => "invoke function",
            HostValue::Listener(_) => "listen function",
            HostValue::Data(_) => "data",
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Namespace(ns) => fmt::Debug::fmt(ns, f),
            HostValue::Invoker(_) => f.write_str("<invoke fn>"),
            HostValue::Listener(_) => f.write_str("<listen fn>"),
            HostValue::Data(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Default)]
pub struct HostNamespace {
    entries: BTreeMap<String, HostValue>,
}

impl HostNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: HostValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.entries.get(name)
    }

    pub fn lookup(&self, path: &[&str]) -> Option<&HostValue> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            match current.get(segment)? {
                HostValue::Namespace(ns) => current = ns,
                _ => return None,
            }
        }
        current.get(last)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for HostNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

pub trait BridgeHost: Send + Sync {
    /// Current root object, or `None` while the host has not injected it yet.
    fn probe(&self) -> Option<HostNamespace>;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
