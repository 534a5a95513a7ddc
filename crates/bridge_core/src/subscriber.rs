//! Channel subscription with uniform acknowledgment handling.

use std::{
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use futures::{
    future::BoxFuture,
    stream::{FuturesUnordered, StreamExt},
    FutureExt,
};
use serde_json::Value;
use shared::domain::{ApiShape, ListenerId};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::BridgeError,
    host::{lock, EventHandler, EventListener, HostEvent},
    resolver::BridgeHandle,
};

type QueuedWork = BoxFuture<'static, ()>;
type WorkQueue = Arc<Mutex<Option<mpsc::UnboundedSender<QueuedWork>>>>;

/// Active subscription. The host owns the listener lifetime; dropping this
/// does not unregister anything.
pub struct SubscriptionHandle {
    id: Uuid,
    channel: String,
    listener_id: ListenerId,
    shape: ApiShape,
    dispatcher: EventDispatcher,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    pub fn shape(&self) -> ApiShape {
        self.shape
    }

    /// Stops accepting events and waits for queued and in-flight ones.
    pub async fn drain(self) {
        self.dispatcher.drain(&self.channel).await;
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("listener_id", &self.listener_id)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

struct EventDispatcher {
    queue: WorkQueue,
    task: JoinHandle<()>,
}

impl EventDispatcher {
    fn spawn(channel: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            queue: Arc::new(Mutex::new(Some(sender))),
            task: tokio::spawn(dispatch(channel.to_string(), receiver)),
        }
    }

    async fn drain(self, channel: &str) {
        lock(&self.queue).take();
        if let Err(error) = self.task.await {
            error!(%channel, %error, "event dispatcher stopped abnormally");
        }
    }
}

/// Starts queued work in arrival order; started work runs concurrently.
async fn dispatch(channel: String, mut queue: mpsc::UnboundedReceiver<QueuedWork>) {
    let mut in_flight = FuturesUnordered::new();
    loop {
        tokio::select! {
            queued = queue.recv() => match queued {
                Some(mut work) => {
                    if futures::poll!(&mut work).is_pending() {
                        in_flight.push(work);
                    }
                }
                None => break,
            },
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
        }
    }

    if !in_flight.is_empty() {
        debug!(%channel, pending = in_flight.len(), "draining in-flight events");
    }
    while in_flight.next().await.is_some() {}
}

pub struct EventSubscriber {
    listener: Arc<dyn EventListener>,
    shape: ApiShape,
}

impl EventSubscriber {
    pub fn new(handle: &BridgeHandle) -> Self {
        Self {
            listener: handle.listener(),
            shape: handle.shape(),
        }
    }

    /// Handler errors and panics are logged and never reach the host listener.
    pub async fn subscribe<F, Fut>(
        &self,
        channel: &str,
        handler: F,
    ) -> Result<SubscriptionHandle, BridgeError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
    {
        let dispatcher = EventDispatcher::spawn(channel);
        let isolated = isolate_handler(channel, handler, Arc::clone(&dispatcher.queue));

        debug!(%channel, shape = %self.shape, "registering channel listener");
        let completion = self
            .listener
            .listen(channel, isolated)
            .map_err(|rejection| BridgeError::from_subscription_rejection(channel, rejection))?
            .into_completion();

        let listener_id = completion.await.map_err(|rejection| {
            let error = BridgeError::from_subscription_rejection(channel, rejection);
            error!(%channel, %error, kind = ?error.kind(), "channel subscription rejected");
            error
        })?;

        info!(%channel, listener_id = listener_id.0, "channel listener registered");
        Ok(SubscriptionHandle {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            listener_id,
            shape: self.shape,
            dispatcher,
        })
    }
}

fn isolate_handler<F, Fut>(channel: &str, handler: F, queue: WorkQueue) -> EventHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
{
    let channel = channel.to_string();

    Arc::new(move |event: HostEvent| {
        let event_id = event.id.0;
        let work = match panic::catch_unwind(AssertUnwindSafe(|| handler(event.payload))) {
            Ok(work) => work,
            Err(_) => {
                error!(%channel, event_id, "event handler panicked before dispatch");
                return;
            }
        };

        let task_channel = channel.clone();
        let work = async move {
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(channel = %task_channel, event_id, %error, kind = ?error.kind(), "event handling failed");
                }
                Err(_) => error!(channel = %task_channel, event_id, "event handler panicked"),
            }
        }
        .boxed();

        let accepted = lock(&queue)
            .as_ref()
            .is_some_and(|sender| sender.send(work).is_ok());
        if !accepted {
            debug!(%channel, event_id, "subscription drained; event dropped");
        }
    })
}

#[cfg(test)]
#[path = "tests/subscriber_tests.rs"]
mod tests;
