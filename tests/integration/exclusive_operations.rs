/// Tests for the exclusivity guards on `connect`/`disconnect`/`reconnect`:
/// only one instance of each may run at a time per client.
use rusty_stomp::transport::{MockTransport, Transport};
use rusty_stomp::{Client, ClientOptions, StompConfig, StompError, SubscribeOptions, Version};
use std::sync::Arc;

fn options() -> ClientOptions {
    let mut opts = ClientOptions::new(StompConfig::new("tcp://localhost:61613").versions(vec![Version::V1_1]));
    opts.connected_timeout = Some(2.0);
    opts.receipt_timeout = Some(2.0);
    opts
}

async fn handshake(broker: &mut MockTransport) {
    let bytes = broker.recv().await.expect("CONNECT frame");
    assert!(String::from_utf8_lossy(&bytes).starts_with("CONNECT\n"));
    broker.send(b"CONNECTED\nversion:1.1\nsession:s1\n\n\x00").await.unwrap();
}

// ---------------------------------------------------------------------------
// connect()
// ---------------------------------------------------------------------------

/// Test: a second `connect` call while the first is still in flight is
/// rejected immediately rather than queued.
#[tokio::test]
async fn concurrent_connect_rejected() {
    let (client_transport, _broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let first = client.clone();
    tokio::spawn(async move {
        let _ = first.connect().await;
    });
    tokio::task::yield_now().await;
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, StompError::AlreadyRunning(_)));
}

/// Test: once connected, calling `connect` again fails rather than
/// re-sending CONNECT on an already-open session.
#[tokio::test]
async fn connect_while_already_connected_rejected() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, StompError::AlreadyRunning(_)));
}

// ---------------------------------------------------------------------------
// disconnect()
// ---------------------------------------------------------------------------

/// Test: a second `disconnect` call while the first is still draining
/// in-flight handlers is rejected.
#[tokio::test]
async fn concurrent_disconnect_rejected() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let first = client.clone();
    let handle = tokio::spawn(async move { first.disconnect().await });
    tokio::task::yield_now().await;
    let err = client.disconnect().await.unwrap_err();
    assert!(matches!(err, StompError::AlreadyRunning(_)));

    if let Some(bytes) = broker.recv().await {
        let text = String::from_utf8_lossy(&bytes);
        if let Some(line) = text.lines().find(|l| l.starts_with("receipt:")) {
            let id = line.trim_start_matches("receipt:");
            let _ = broker.send(format!("RECEIPT\nreceipt-id:{id}\n\n\x00").as_bytes()).await;
        }
    }
    handle.await.unwrap().unwrap();
}

/// Test: when in-flight handlers don't drain before `disconnect_timeout`,
/// `disconnect` still proceeds but surfaces the timeout as a failure cause
/// rather than silently resolving `Ok`.
#[tokio::test]
async fn disconnect_times_out_with_cause_when_handlers_do_not_drain() {
    let mut opts = options();
    opts.disconnect_timeout = Some(0.05);
    opts.receipt_timeout = Some(0.05);
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(opts, client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let handler: rusty_stomp::MessageHandler = Arc::new(|_client, _frame| {
        Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(())
        })
    });
    client.subscribe("/queue/a", None, SubscribeOptions::default(), handler).await.unwrap();
    broker.recv().await.unwrap(); // SUBSCRIBE

    broker.send(b"MESSAGE\nmessage-id:1\nsubscription:0\ndestination:/queue/a\n\npayload\x00").await.unwrap();
    tokio::task::yield_now().await;

    let disconnected = client.disconnected();
    let err = client.disconnect().await.unwrap_err();
    assert!(matches!(err, StompError::Cancelled(_)));
    let outcome = disconnected.borrow().clone().unwrap();
    assert!(outcome.is_err());
}

// ---------------------------------------------------------------------------
// reconnect()
// ---------------------------------------------------------------------------

/// Test: `reconnect` refuses to attach a new transport while the session
/// is still `Connected` — it's for resuming after a connection drop, not
/// for swapping a live transport out from under the session.
#[tokio::test]
async fn reconnect_rejected_while_connected() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let (second_transport, _second_broker) = MockTransport::pair();
    let err = client.reconnect(second_transport).await.unwrap_err();
    assert!(matches!(err, StompError::AlreadyRunning(_)));
}
