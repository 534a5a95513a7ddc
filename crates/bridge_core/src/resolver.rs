//! Runtime discovery of the host's invoke/listen pair.

use std::{fmt, sync::Arc, time::Duration};

use shared::domain::ApiShape;
use tracing::{debug, error, info, warn};

use crate::{
    error::BridgeError,
    host::{BridgeHost, CommandInvoker, EventListener, HostNamespace, HostValue},
};

const WAITING_LOG_EVERY: u32 = 10;

/// Where a shape keeps its two functions. Alternative paths are tried in order.
#[derive(Debug, Clone, Copy)]
pub struct ShapeLayout {
    pub shape: ApiShape,
    pub invoke_paths: &'static [&'static [&'static str]],
    pub listen_paths: &'static [&'static [&'static str]],
}

pub const MODERN_LAYOUT: ShapeLayout = ShapeLayout {
    shape: ApiShape::Modern,
    invoke_paths: &[&["core", "invoke"]],
    listen_paths: &[&["core", "event", "listen"], &["core", "listen"]],
};

pub const LEGACY_LAYOUT: ShapeLayout = ShapeLayout {
    shape: ApiShape::Legacy,
    invoke_paths: &[&["tauri", "invoke"]],
    listen_paths: &[&["event", "listen"]],
};

pub const SHAPE_PRIORITY: [ShapeLayout; 2] = [MODERN_LAYOUT, LEGACY_LAYOUT];

#[derive(Clone)]
pub struct BridgeHandle {
    shape: ApiShape,
    invoker: Arc<dyn CommandInvoker>,
    listener: Arc<dyn EventListener>,
}

impl BridgeHandle {
    pub fn shape(&self) -> ApiShape {
        self.shape
    }

    pub fn invoker(&self) -> Arc<dyn CommandInvoker> {
        Arc::clone(&self.invoker)
    }

    pub fn listener(&self) -> Arc<dyn EventListener> {
        Arc::clone(&self.listener)
    }
}

impl fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeReport {
    pub shape: ApiShape,
    pub invoke_found: bool,
    pub listen_found: bool,
}

impl ShapeReport {
    pub fn is_partial(&self) -> bool {
        self.invoke_found != self.listen_found
    }

    pub fn as_error(&self) -> Option<BridgeError> {
        if !self.is_partial() {
            return None;
        }
        let missing = if self.invoke_found { "listen" } else { "invoke" };
        Some(BridgeError::PartialShape {
            shape: self.shape,
            missing,
        })
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    /// The host root object does not exist yet.
    Absent,
    /// The root exists but no shape is complete.
    Incomplete(Vec<ShapeReport>),
    Complete(BridgeHandle),
}

#[derive(Debug)]
pub enum ProbeState {
    Waiting,
    Resolved(BridgeHandle),
    TimedOut,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProbeState::Waiting)
    }

    /// Forward-only transition after probe number `attempt` of `max_attempts`.
    fn advance(self, outcome: ProbeOutcome, attempt: u32, max_attempts: u32) -> Self {
        match (self, outcome) {
            (ProbeState::Waiting, ProbeOutcome::Complete(handle)) => ProbeState::Resolved(handle),
            (ProbeState::Waiting, _) if attempt >= max_attempts => ProbeState::TimedOut,
            (state, _) => state,
        }
    }
}

pub struct BridgeResolver {
    host: Arc<dyn BridgeHost>,
}

impl BridgeResolver {
    pub fn new(host: Arc<dyn BridgeHost>) -> Self {
        Self { host }
    }

    /// Probes until a complete shape appears or `max_attempts` probes have run.
    /// Probes are spaced `interval` apart; no wait follows the final probe.
    pub async fn resolve(&self, max_attempts: u32, interval: Duration) -> ProbeState {
        let max_attempts = max_attempts.max(1);
        let mut state = ProbeState::Waiting;
        let mut attempt = 0;

        while !state.is_terminal() {
            attempt += 1;
            let outcome = self.probe_once();
            log_outcome(&outcome, attempt, interval);
            state = state.advance(outcome, attempt, max_attempts);

            if !state.is_terminal() {
                tokio::time::sleep(interval).await;
            }
        }

        match &state {
            ProbeState::Resolved(handle) => {
                info!(shape = %handle.shape(), attempt, "host bridge resolved");
            }
            ProbeState::TimedOut => {
                error!(
                    attempts = max_attempts,
                    "host bridge not found; is the page running inside the host application?"
                );
            }
            ProbeState::Waiting => {}
        }
        state
    }

    pub fn probe_once(&self) -> ProbeOutcome {
        let Some(root) = self.host.probe() else {
            return ProbeOutcome::Absent;
        };

        let mut reports = Vec::with_capacity(SHAPE_PRIORITY.len());
        for layout in SHAPE_PRIORITY {
            let invoker = find_invoker(&root, &layout);
            let listener = find_listener(&root, &layout);
            match (invoker, listener) {
                (Some(invoker), Some(listener)) => {
                    return ProbeOutcome::Complete(BridgeHandle {
                        shape: layout.shape,
                        invoker,
                        listener,
                    });
                }
                (invoker, listener) => reports.push(ShapeReport {
                    shape: layout.shape,
                    invoke_found: invoker.is_some(),
                    listen_found: listener.is_some(),
                }),
            }
        }

        if reports.iter().all(|report| !report.invoke_found && !report.listen_found) {
            debug!(
                keys = ?root.keys().collect::<Vec<_>>(),
                "host object present but exposes no known api shape"
            );
        }
        ProbeOutcome::Incomplete(reports)
    }
}

fn find_invoker(root: &HostNamespace, layout: &ShapeLayout) -> Option<Arc<dyn CommandInvoker>> {
    layout
        .invoke_paths
        .iter()
        .find_map(|path| match root.lookup(path)? {
            HostValue::Invoker(invoker) => Some(Arc::clone(invoker)),
            other => {
                log_not_callable(layout.shape, path, other);
                None
            }
        })
}

fn find_listener(root: &HostNamespace, layout: &ShapeLayout) -> Option<Arc<dyn EventListener>> {
    layout
        .listen_paths
        .iter()
        .find_map(|path| match root.lookup(path)? {
            HostValue::Listener(listener) => Some(Arc::clone(listener)),
            other => {
                log_not_callable(layout.shape, path, other);
                None
            }
        })
}

fn log_not_callable(shape: ApiShape, path: &[&str], value: &HostValue) {
    debug!(
        %shape,
        path = %path.join("."),
        found = value.type_name(),
        "entry present but not callable"
    );
}

fn log_outcome(outcome: &ProbeOutcome, attempt: u32, interval: Duration) {
    match outcome {
        ProbeOutcome::Absent => {
            if (attempt - 1) % WAITING_LOG_EVERY == 0 {
                let waited_ms = u128::from(attempt - 1) * interval.as_millis();
                info!(attempt, waited_ms, "waiting for host bridge");
            }
        }
        ProbeOutcome::Incomplete(reports) => {
            for error in reports.iter().filter_map(ShapeReport::as_error) {
                warn!(attempt, %error, "api shape not usable yet");
            }
        }
        ProbeOutcome::Complete(_) => {}
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
