/// Tests that RECEIPT frames correlate to the right waiter even when
/// several are outstanding, and that a receipt timeout cancels the caller
/// without tearing down the connection.
use rusty_stomp::transport::{MockTransport, Transport};
use rusty_stomp::{Client, ClientOptions, StompConfig, StompError, Version};
use std::time::Duration;

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

fn receipt_id_of(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.lines().find(|l| l.starts_with("receipt:")).unwrap().trim_start_matches("receipt:").to_string()
}

/// Test: a single `send(..., want_receipt: true)` resolves once its RECEIPT arrives.
#[tokio::test]
async fn send_resolves_on_matching_receipt() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let send = tokio::spawn({
        let client = client.clone();
        async move { client.send("/queue/a", b"hi", None, true).await }
    });
    let bytes = broker.recv().await.unwrap();
    let id = receipt_id_of(&bytes);
    broker.send(format!("RECEIPT\nreceipt-id:{id}\n\n\x00").as_bytes()).await.unwrap();
    assert!(send.await.unwrap().is_ok());
}

/// Test: two concurrent receipted sends each resolve against their own
/// receipt id even when the broker replies out of order.
#[tokio::test]
async fn receipts_correlate_independently_out_of_order() {
    let (client_transport, mut broker) = MockTransport::pair();
    let client = Client::new(options(), client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.send("/queue/a", b"one", None, true).await }
    });
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.send("/queue/b", b"two", None, true).await }
    });

    let first_bytes = broker.recv().await.unwrap();
    let second_bytes = broker.recv().await.unwrap();
    let first_id = receipt_id_of(&first_bytes);
    let second_id = receipt_id_of(&second_bytes);
    assert_ne!(first_id, second_id);

    // Reply to the second send's receipt first.
    broker.send(format!("RECEIPT\nreceipt-id:{second_id}\n\n\x00").as_bytes()).await.unwrap();
    broker.send(format!("RECEIPT\nreceipt-id:{first_id}\n\n\x00").as_bytes()).await.unwrap();

    assert!(second.await.unwrap().is_ok());
    assert!(first.await.unwrap().is_ok());
}

/// Test: a receipt that never arrives within `receipt_timeout` cancels the
/// waiting caller, but the session itself is left connected and usable —
/// a stuck broker reply shouldn't be treated as a connection failure.
#[tokio::test]
async fn receipt_timeout_cancels_without_closing_connection() {
    let (client_transport, mut broker) = MockTransport::pair();
    let mut opts = options();
    opts.receipt_timeout = Some(0.1);
    let client = Client::new(opts, client_transport);
    let connect = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    handshake(&mut broker).await;
    connect.await.unwrap().unwrap();

    let started = tokio::time::Instant::now();
    let err = client.send("/queue/a", b"hi", None, true).await.unwrap_err();
    assert!(matches!(err, StompError::Cancelled(_)));
    assert!(started.elapsed() < Duration::from_millis(500), "timeout fired far later than the configured 100ms");
    let _receipted_send = broker.recv().await.unwrap(); // drain the SEND the broker never acked

    // The session is still connected: a plain send goes through fine.
    client.send("/queue/b", b"still connected", None, false).await.unwrap();
    let bytes = broker.recv().await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).starts_with("SEND\n"));
}
