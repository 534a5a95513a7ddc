use super::*;
use crate::{
    local_host::{AckMode, HostLayout, LocalHost},
    resolver::{BridgeResolver, ProbeOutcome},
};
use serde_json::json;
use shared::error::ErrorKind;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL: &str = "gotify-message";

fn handle_for(host: &LocalHost) -> BridgeHandle {
    match BridgeResolver::new(Arc::new(host.clone())).probe_once() {
        ProbeOutcome::Complete(handle) => handle,
        other => panic!("host exposes no complete shape: {other:?}"),
    }
}

fn forwarding_handler(
    tx: mpsc::UnboundedSender<Value>,
) -> impl Fn(Value) -> futures::future::BoxFuture<'static, Result<(), BridgeError>> + Send + Sync + 'static
{
    move |payload| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(payload);
            Ok(())
        }
        .boxed()
    }
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler ran in time")
        .expect("channel open")
}

#[tokio::test]
async fn immediate_ack_yields_subscription() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = subscriber
        .subscribe(CHANNEL, forwarding_handler(tx))
        .await
        .expect("subscribe");

    assert_eq!(subscription.channel(), CHANNEL);
    assert_eq!(subscription.shape(), ApiShape::Modern);
    assert_eq!(host.listener_count(CHANNEL), 1);

    assert_eq!(host.emit(CHANNEL, json!({ "title": "ping" })), 1);
    assert_eq!(next(&mut rx).await, json!({ "title": "ping" }));
}

#[tokio::test(start_paused = true)]
async fn deferred_ack_is_awaited() {
    let host = LocalHost::builder(HostLayout::legacy())
        .ack(AckMode::Deferred(Duration::from_millis(250)))
        .build();
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, _rx) = mpsc::unbounded_channel();
    let started = tokio::time::Instant::now();

    let subscription = subscriber
        .subscribe(CHANNEL, forwarding_handler(tx))
        .await
        .expect("subscribe");

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(subscription.shape(), ApiShape::Legacy);
    assert_eq!(Some(subscription.listener_id()), host.listens()[0].listener_id);
}

#[tokio::test]
async fn synchronous_permission_refusal_is_classified() {
    let host = LocalHost::builder(HostLayout::modern())
        .deny_listen(crate::local_host::DEFAULT_DENIAL_MESSAGE)
        .build();
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, _rx) = mpsc::unbounded_channel();

    let error = subscriber
        .subscribe(CHANNEL, forwarding_handler(tx))
        .await
        .expect_err("listen is denied");

    assert_eq!(error.kind(), ErrorKind::PermissionDenied);
    assert_eq!(host.listens().len(), 1, "denied subscription is not retried");
}

#[tokio::test(start_paused = true)]
async fn deferred_permission_rejection_is_classified() {
    let host = LocalHost::builder(HostLayout::modern())
        .ack(AckMode::Deferred(Duration::from_millis(10)))
        .deny_listen("Command plugin:event|listen not allowed by ACL")
        .build();
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, _rx) = mpsc::unbounded_channel();

    let error = subscriber
        .subscribe(CHANNEL, forwarding_handler(tx))
        .await
        .expect_err("listen is denied");

    assert!(matches!(error, BridgeError::PermissionDenied { .. }));
    assert!(error.kind().is_terminal_for_setup());
    assert_eq!(host.listens().len(), 1);
}

#[tokio::test]
async fn other_rejections_are_generic_failures() {
    let host = LocalHost::builder(HostLayout::modern())
        .deny_listen("event bus shut down")
        .build();
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, _rx) = mpsc::unbounded_channel();

    let error = subscriber
        .subscribe(CHANNEL, forwarding_handler(tx))
        .await
        .expect_err("listen fails");

    assert_eq!(error.kind(), ErrorKind::SubscriptionFailed);
    assert!(!error.kind().is_terminal_for_setup());
}

#[test]
fn permission_markers_match_case_insensitively() {
    assert!(crate::error::is_permission_rejection(
        "Permissions associated with this command: core:event:allow-listen"
    ));
    assert!(crate::error::is_permission_rejection("NOT ALLOWED"));
    assert!(!crate::error::is_permission_rejection("timed out"));
}

#[tokio::test]
async fn failing_events_do_not_unregister_the_handler() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, mut rx) = mpsc::unbounded_channel();

    subscriber
        .subscribe(CHANNEL, move |payload: Value| {
            let tx = tx.clone();
            async move {
                let fail = payload["fail"] == json!(true);
                let _ = tx.send(payload);
                if fail {
                    return Err(BridgeError::InvokeFailure {
                        command: "create_notification_window".into(),
                        message: "window limit reached".into(),
                    });
                }
                Ok(())
            }
        })
        .await
        .expect("subscribe");

    host.emit(CHANNEL, json!({ "fail": true }));
    host.emit(CHANNEL, json!({ "fail": false }));

    assert_eq!(next(&mut rx).await["fail"], json!(true));
    assert_eq!(next(&mut rx).await["fail"], json!(false));
    assert_eq!(host.listener_count(CHANNEL), 1);
}

#[tokio::test]
async fn panicking_handlers_are_contained() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, mut rx) = mpsc::unbounded_channel();

    subscriber
        .subscribe(CHANNEL, move |payload: Value| {
            if payload["panic_now"] == json!(true) {
                panic!("handler blew up at delivery");
            }
            let tx = tx.clone();
            async move {
                if payload["panic_later"] == json!(true) {
                    panic!("handler blew up while forwarding");
                }
                let _ = tx.send(payload);
                Ok(())
            }
        })
        .await
        .expect("subscribe");

    host.emit(CHANNEL, json!({ "panic_now": true }));
    host.emit(CHANNEL, json!({ "panic_later": true }));
    host.emit(CHANNEL, json!({ "title": "survivor" }));

    assert_eq!(next(&mut rx).await, json!({ "title": "survivor" }));
}

#[tokio::test]
async fn events_are_dispatched_in_delivery_order() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let (tx, mut rx) = mpsc::unbounded_channel();

    subscriber
        .subscribe(CHANNEL, move |payload: Value| {
            let _ = tx.send(payload);
            async { Ok(()) }
        })
        .await
        .expect("subscribe");

    for n in 0..5 {
        host.emit(CHANNEL, json!({ "n": n }));
    }

    for n in 0..5 {
        assert_eq!(next(&mut rx).await, json!({ "n": n }));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forwards_start_in_delivery_order_on_a_multi_thread_runtime() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let started = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&started);
    let subscription = subscriber
        .subscribe(CHANNEL, move |payload: Value| {
            let recorder = Arc::clone(&recorder);
            async move {
                lock(&recorder).push(payload["n"].as_u64().unwrap_or_default());
                tokio::task::yield_now().await;
                Ok(())
            }
        })
        .await
        .expect("subscribe");

    for n in 0..2000u64 {
        host.emit(CHANNEL, json!({ "n": n }));
    }
    subscription.drain().await;

    let started = lock(&started).clone();
    assert_eq!(started, (0..2000).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn drain_waits_for_in_flight_events_and_drops_later_ones() {
    let host = LocalHost::new(HostLayout::modern());
    let subscriber = EventSubscriber::new(&handle_for(&host));
    let finished = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&finished);
    let subscription = subscriber
        .subscribe(CHANNEL, move |payload: Value| {
            let recorder = Arc::clone(&recorder);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                lock(&recorder).push(payload);
                Ok(())
            }
        })
        .await
        .expect("subscribe");

    host.emit(CHANNEL, json!(1));
    host.emit(CHANNEL, json!(2));
    subscription.drain().await;
    assert_eq!(*lock(&finished), vec![json!(1), json!(2)]);

    assert_eq!(host.emit(CHANNEL, json!(3)), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(lock(&finished).len(), 2);
}
