/// Tests for the two independent heart-beat timers: the client emits its
/// own ticks on schedule, inbound traffic (of any kind) keeps the
/// server-liveness timer satisfied, and silence past the negotiated
/// threshold tears the connection down.
use rusty_stomp::transport::{MockTransport, Transport};
use rusty_stomp::{Client, ClientOptions, StompConfig, Version};
use std::time::Duration;

fn options() -> ClientOptions {
    let mut opts = ClientOptions::new(StompConfig::new("tcp://localhost:61613").versions(vec![Version::V1_1]));
    opts.connected_timeout = Some(2.0);
    opts
}

/// Negotiate a 30ms heart-beat period both ways: client threshold ~24ms,
/// server threshold ~60ms (the reference 0.8x/2.0x multipliers), short
/// enough to exercise both timers inside a fast test.
async fn handshake_with_heart_beat(broker: &mut MockTransport) {
    let bytes = broker.recv().await.expect("CONNECT frame");
    assert!(String::from_utf8_lossy(&bytes).starts_with("CONNECT\n"));
    broker.send(b"CONNECTED\nversion:1.1\nsession:s1\nheart-beat:30,30\n\n\x00").await.unwrap();
}

/// Test: the client timer fires on its own, emitting a bare heart-beat
/// byte with no waiting required from the caller.
#[tokio::test]
async fn client_emits_heart_beat_without_being_asked() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake_with_heart_beat(&mut broker).await;
    connect.await.unwrap().unwrap();

    let bytes = tokio::time::timeout(Duration::from_millis(200), broker.recv())
        .await
        .expect("client should have sent a heart-beat by now")
        .expect("broker side still open");
    assert_eq!(bytes, vec![b'\n']);
}

/// Test: as long as the broker keeps sending something (frames or bare
/// heart-beats), the connection survives well past the server threshold.
#[tokio::test]
async fn inbound_traffic_keeps_server_timer_satisfied() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake_with_heart_beat(&mut broker).await;
    connect.await.unwrap().unwrap();

    let disconnected = client.disconnected();
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.send(b"\n").await.unwrap();
    }
    assert!(disconnected.borrow().is_none(), "connection should still be alive");
}

/// Test: once the broker goes silent past the negotiated server threshold,
/// the client tears the connection down rather than waiting forever.
#[tokio::test]
async fn silence_past_server_threshold_closes_connection() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake_with_heart_beat(&mut broker).await;
    connect.await.unwrap().unwrap();

    let mut disconnected = client.disconnected();
    tokio::time::timeout(Duration::from_secs(1), disconnected.changed())
        .await
        .expect("connection should time out")
        .unwrap();
    let outcome = disconnected.borrow().clone().unwrap();
    assert!(outcome.is_err());
}
