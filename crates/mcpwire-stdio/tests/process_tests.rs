//! End-to-end tests against real child processes.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use mcpwire_stdio::{StdioConfig, StdioTransport};
use mcpwire_transport_traits::{
    ChannelHandler, InboundEvent, Message, Transport, TransportError, TransportState,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

fn message(value: Value) -> Message {
    match value {
        Value::Object(map) => map,
        _ => panic!("test message must be an object"),
    }
}

fn transport(config: StdioConfig) -> (StdioTransport, UnboundedReceiver<InboundEvent>) {
    let (handler, receiver) = ChannelHandler::new();
    (StdioTransport::with_handler(config, Arc::new(handler)), receiver)
}

async fn next_event(receiver: &mut UnboundedReceiver<InboundEvent>) -> InboundEvent {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for inbound event")
        .expect("handler channel closed")
}

#[tokio::test]
async fn test_echo_through_cat() {
    let (transport, mut inbound) = transport(StdioConfig::new("cat"));
    transport.start().await.unwrap();
    assert_eq!(transport.state(), TransportState::Started);
    assert!(transport.pid().is_some());

    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/list",
        "params": { "cursor": "line1\nline2" }
    });
    transport.send_message(message(request.clone())).await.unwrap();

    let event = next_event(&mut inbound).await;
    assert_eq!(event.as_json().unwrap(), request);

    let metrics = transport.metrics();
    assert_eq!(metrics.messages_sent, 1);
    assert_eq!(metrics.messages_received, 1);

    transport.close(Duration::from_secs(2)).await;
    assert_eq!(transport.state(), TransportState::Closed);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let (transport, _inbound) = transport(StdioConfig::new("cat"));
    transport.start().await.unwrap();
    let pid = transport.pid();
    transport.start().await.unwrap();
    assert_eq!(transport.pid(), pid);
    transport.close(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_send_after_close() {
    let (transport, _inbound) = transport(StdioConfig::new("cat"));
    transport.start().await.unwrap();
    transport.close(Duration::from_secs(2)).await;
    transport.close(Duration::from_secs(2)).await;

    let result = transport.send_message(message(json!({"method": "ping"}))).await;
    assert!(matches!(result, Err(TransportError::Closed)));
    assert!(matches!(transport.start().await, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_stderr_forwarded() {
    let config = StdioConfig::new("sh").with_args(["-c", "echo warming up >&2; cat"]);
    let (transport, mut inbound) = transport(config);
    transport.start().await.unwrap();

    assert_eq!(
        next_event(&mut inbound).await,
        InboundEvent::Diagnostic("warming up".to_string())
    );
    transport.close(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_environment_and_working_dir() {
    let config = StdioConfig::new("sh")
        .with_args(["-c", r#"printf '{"greeting":"%s","cwd":"%s","home":"%s"}\n' "$GREETING" "$(pwd)" "${HOME:-unset}""#])
        .with_env("GREETING", "hello")
        .with_env("  ", "ignored")
        .without_env("HOME")
        .with_working_dir("/");
    let (transport, mut inbound) = transport(config);
    transport.start().await.unwrap();

    let event = next_event(&mut inbound).await;
    assert_eq!(
        event.as_json().unwrap(),
        json!({ "greeting": "hello", "cwd": "/", "home": "unset" })
    );
    transport.close(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_close_escalates_past_ignored_sigterm() {
    let config = StdioConfig::new("sh").with_args([
        "-c",
        r#"trap "" TERM; echo ready; while true; do sleep 1; done"#,
    ]);
    let (transport, mut inbound) = transport(config);
    transport.start().await.unwrap();
    assert_eq!(
        next_event(&mut inbound).await,
        InboundEvent::Message("ready".to_string())
    );

    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    transport.close(timeout).await;

    // Three bounded waits plus the reader grace period.
    assert!(
        started.elapsed() < timeout * 3 + Duration::from_secs(2),
        "close took {:?}",
        started.elapsed()
    );
    assert_eq!(transport.state(), TransportState::Closed);
}

#[tokio::test]
async fn test_write_to_exited_child_fails_cleanly() {
    let (transport, _inbound) = transport(StdioConfig::new("true"));
    transport.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The first write may still land in the pipe buffer; keep writing until
    // the broken pipe surfaces.
    let mut failed = None;
    for id in 0..50 {
        if let Err(e) = transport
            .send_message(message(json!({"jsonrpc": "2.0", "id": id, "method": "ping"})))
            .await
        {
            failed = Some(e);
            break;
        }
    }
    assert!(matches!(
        failed,
        Some(TransportError::Io(_) | TransportError::SendFailed(_))
    ));
    transport.close(Duration::from_secs(1)).await;
}
