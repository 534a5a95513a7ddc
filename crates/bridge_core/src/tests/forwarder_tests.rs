use super::*;
use crate::{
    host::HostRejection,
    local_host::{HostLayout, LocalHost},
    resolver::{BridgeResolver, ProbeOutcome},
};
use serde_json::json;
use shared::{domain::StatusKind, error::ErrorKind};

fn handle_for(host: &LocalHost) -> BridgeHandle {
    match BridgeResolver::new(Arc::new(host.clone())).probe_once() {
        ProbeOutcome::Complete(handle) => handle,
        other => panic!("host exposes no complete shape: {other:?}"),
    }
}

fn record(title: &str, priority: i64) -> CanonicalNotification {
    CanonicalNotification {
        title: title.into(),
        message: format!("{title} body"),
        priority,
    }
}

#[tokio::test]
async fn forwards_canonical_record_with_timeout() {
    let host = LocalHost::new(HostLayout::modern());
    host.register_command("create_notification_window", |_| Ok(json!({ "window": "n-1" })));
    let forwarder = CommandForwarder::new(&handle_for(&host)).with_timeout(7);

    let ack = forwarder
        .forward(&record("Disk almost full", 8))
        .await
        .expect("forward");

    assert_eq!(ack, json!({ "window": "n-1" }));
    let invocations = host.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].via, "core.invoke");
    assert_eq!(invocations[0].command, "create_notification_window");
    assert_eq!(
        invocations[0].args,
        json!({
            "title": "Disk almost full",
            "message": "Disk almost full body",
            "priority": 8,
            "timeoutSeconds": 7,
        })
    );
}

#[tokio::test]
async fn rejected_invoke_becomes_invoke_failure_on_status() {
    let host = LocalHost::new(HostLayout::legacy());
    host.register_command("create_notification_window", |_| {
        Err(HostRejection::new("window factory unavailable"))
    });
    let status = StatusReporter::default();
    let forwarder = CommandForwarder::new(&handle_for(&host)).with_status(status.clone());

    let error = forwarder
        .forward(&record("Backup finished", 2))
        .await
        .expect_err("host rejects");

    assert_eq!(error.kind(), ErrorKind::InvokeFailure);
    assert!(error.to_string().contains("window factory unavailable"));
    let shown = status.current().expect("failure surfaced");
    assert_eq!(shown.kind, StatusKind::Error);
    assert!(shown.message.contains("create_notification_window"));
}

#[tokio::test]
async fn failure_without_status_only_returns_error() {
    let host = LocalHost::new(HostLayout::modern());
    let forwarder = CommandForwarder::new(&handle_for(&host));

    let error = forwarder
        .forward(&record("orphan", 0))
        .await
        .expect_err("command is not registered");

    assert!(matches!(error, BridgeError::InvokeFailure { .. }));
    assert!(error.to_string().contains("not found"));
}

#[tokio::test]
async fn earlier_failure_does_not_block_later_records() {
    let host = LocalHost::new(HostLayout::modern());
    host.register_command("create_notification_window", |args| {
        if args["title"] == json!("first") {
            Err(HostRejection::new("too many windows"))
        } else {
            Ok(Value::Null)
        }
    });
    let forwarder = CommandForwarder::new(&handle_for(&host));

    assert!(forwarder.forward(&record("first", 1)).await.is_err());
    assert!(forwarder.forward(&record("second", 1)).await.is_ok());

    let titles: Vec<Value> = host
        .invocations()
        .into_iter()
        .map(|invocation| invocation.args["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn timeout_changes_apply_to_later_records() {
    let host = LocalHost::new(HostLayout::modern());
    host.register_command("create_notification_window", |_| Ok(Value::Null));
    let forwarder = CommandForwarder::new(&handle_for(&host));
    assert_eq!(forwarder.timeout_seconds(), 5);

    forwarder.forward(&record("before", 1)).await.expect("forward");
    forwarder.set_timeout(12);
    forwarder.forward(&record("after", 1)).await.expect("forward");

    let timeouts: Vec<Value> = host
        .invocations()
        .into_iter()
        .map(|invocation| invocation.args["timeoutSeconds"].clone())
        .collect();
    assert_eq!(timeouts, vec![json!(5), json!(12)]);
}

#[test]
fn out_of_range_timeouts_are_ignored() {
    let host = LocalHost::new(HostLayout::modern());
    let forwarder = CommandForwarder::new(&handle_for(&host)).with_timeout(30);

    forwarder.set_timeout(0);
    forwarder.set_timeout(301);

    assert_eq!(forwarder.timeout_seconds(), 30);
}

#[tokio::test]
async fn explicit_timeout_overrides_the_current_one() {
    let host = LocalHost::new(HostLayout::modern());
    host.register_command("create_notification_window", |_| Ok(Value::Null));
    let forwarder = CommandForwarder::new(&handle_for(&host)).with_timeout(10);

    forwarder
        .forward_with_timeout(&record("urgent", 9), 2)
        .await
        .expect("forward");

    assert_eq!(host.invocations()[0].args["timeoutSeconds"], json!(2));
    assert_eq!(forwarder.timeout_seconds(), 10);
}
