//! Transient user-facing status line.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use shared::{domain::StatusKind, error::FailureRecord};
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_STATUS_DISPLAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub message: String,
    pub kind: StatusKind,
    pub shown_at: DateTime<Utc>,
}

/// Holds at most one visible status. Each report replaces the previous one
/// and clears itself after the display duration unless replaced first.
#[derive(Clone)]
pub struct StatusReporter {
    inner: Arc<StatusInner>,
}

struct StatusInner {
    current: watch::Sender<Option<StatusLine>>,
    generation: AtomicU64,
    display_for: Duration,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_DISPLAY)
    }
}

impl StatusReporter {
    pub fn new(display_for: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(StatusInner {
                current,
                generation: AtomicU64::new(0),
                display_for,
            }),
        }
    }

    pub fn report(&self, message: impl Into<String>, kind: StatusKind) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.current.send_replace(Some(StatusLine {
            message: message.into(),
            kind,
            shown_at: Utc::now(),
        }));

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; status will stay until replaced");
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(inner.display_for).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.current.send_replace(None);
            }
        });
    }

    pub fn report_failure(&self, failure: &FailureRecord) {
        self.report(failure.detail.clone(), StatusKind::Error);
    }

    pub fn current(&self) -> Option<StatusLine> {
        self.inner.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusLine>> {
        self.inner.current.subscribe()
    }

    pub fn display_for(&self) -> Duration {
        self.inner.display_for
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
