/// Tests that subscriptions survive an unexpected connection drop and are
/// replayed, unchanged, once the client reconnects.
use rusty_stomp::transport::{MockTransport, Transport};
use rusty_stomp::{Client, ClientOptions, StompConfig, SubscribeOptions, Version};
use std::sync::Arc;

fn options() -> ClientOptions {
    let mut opts = ClientOptions::new(StompConfig::new("tcp://localhost:61613").versions(vec![Version::V1_1]));
    opts.connected_timeout = Some(2.0);
    opts
}

async fn handshake(broker: &mut MockTransport) {
    let bytes = broker.recv().await.expect("CONNECT frame");
    assert!(String::from_utf8_lossy(&bytes).starts_with("CONNECT\n"));
    broker.send(b"CONNECTED\nversion:1.1\nsession:s1\n\n\x00").await.unwrap();
}

fn noop_handler() -> rusty_stomp::MessageHandler {
    Arc::new(|_client, _frame| Box::pin(async { Ok(()) }))
}

/// Test: a subscription recorded before an unexpected connection drop is
/// replayed verbatim (same destination) once `reconnect` re-establishes
/// the session — the broker sees a fresh SUBSCRIBE without the caller
/// having to re-issue it.
#[tokio::test]
async fn single_subscription_survives_reconnect() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    client.subscribe("/queue/a", None, SubscribeOptions::default(), noop_handler()).await.unwrap();
    let original_subscribe = broker.recv().await.unwrap();
    assert!(String::from_utf8_lossy(&original_subscribe).contains("destination:/queue/a"));

    let mut disconnected = client.disconnected();
    drop(broker); // the broker side vanishes: an unexpected drop, not a requested disconnect.
    disconnected.changed().await.unwrap();
    assert!(disconnected.borrow().clone().unwrap().is_err());

    let (second_transport, mut second_broker) = MockTransport::pair();
    let reconnect = tokio::spawn({
        let client = client.clone();
        async move { client.reconnect(second_transport).await }
    });
    handshake(&mut second_broker).await;
    reconnect.await.unwrap().unwrap();

    let replayed = second_broker.recv().await.unwrap();
    let text = String::from_utf8_lossy(&replayed);
    assert!(text.starts_with("SUBSCRIBE\n"));
    assert!(text.contains("destination:/queue/a"));
}

/// Test: multiple subscriptions all replay after reconnect, each keeping
/// its own destination — order doesn't matter, but every one must show up.
#[tokio::test]
async fn multiple_subscriptions_all_replay() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    client.subscribe("/queue/a", None, SubscribeOptions::default(), noop_handler()).await.unwrap();
    broker.recv().await.unwrap();
    client.subscribe("/queue/b", None, SubscribeOptions::default(), noop_handler()).await.unwrap();
    broker.recv().await.unwrap();

    let mut disconnected = client.disconnected();
    drop(broker);
    disconnected.changed().await.unwrap();

    let (second_transport, mut second_broker) = MockTransport::pair();
    let reconnect = tokio::spawn({
        let client = client.clone();
        async move { client.reconnect(second_transport).await }
    });
    handshake(&mut second_broker).await;
    reconnect.await.unwrap().unwrap();

    let mut destinations = Vec::new();
    for _ in 0..2 {
        let bytes = second_broker.recv().await.unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        assert!(text.starts_with("SUBSCRIBE\n"));
        let dest = text.lines().find(|l| l.starts_with("destination:")).unwrap().trim_start_matches("destination:").to_string();
        destinations.push(dest);
    }
    destinations.sort();
    assert_eq!(destinations, vec!["/queue/a".to_string(), "/queue/b".to_string()]);
}

/// Test: a caller-requested, graceful `disconnect` flushes subscriptions —
/// a subsequent `reconnect` starts clean, with nothing replayed.
#[tokio::test]
async fn graceful_disconnect_does_not_replay_on_next_reconnect() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    client.subscribe("/queue/a", None, SubscribeOptions::default(), noop_handler()).await.unwrap();
    broker.recv().await.unwrap();

    let disconnect = tokio::spawn({
        let client = client.clone();
        async move { client.disconnect().await }
    });
    let bytes = broker.recv().await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    let id = text.lines().find(|l| l.starts_with("receipt:")).unwrap().trim_start_matches("receipt:");
    broker.send(format!("RECEIPT\nreceipt-id:{id}\n\n\x00").as_bytes()).await.unwrap();
    disconnect.await.unwrap().unwrap();

    let (second_transport, mut second_broker) = MockTransport::pair();
    let reconnect = tokio::spawn({
        let client = client.clone();
        async move { client.reconnect(second_transport).await }
    });
    handshake(&mut second_broker).await;
    reconnect.await.unwrap().unwrap();

    // Nothing queued to replay: the next thing the broker sees (if
    // anything at all within a short window) is not a SUBSCRIBE.
    let nothing_replayed = tokio::time::timeout(std::time::Duration::from_millis(100), second_broker.recv()).await;
    assert!(nothing_replayed.is_err(), "expected no replay traffic after a graceful disconnect");
}
