//! The byte-oriented connection seam the async client owns.
//!
//! `Transport` is deliberately narrow: open a stream, push bytes in,
//! pull bytes out, close it. Everything protocol-shaped (framing,
//! heart-beats, negotiation) lives above this line.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, StompError};
use crate::failover::{Attempts, FailoverTarget};

/// A connected, byte-oriented transport. One instance per live connection;
/// dropped (or `close`d) when the connection ends.
pub trait Transport: Send {
    /// Write `bytes` to the wire.
    fn send(&mut self, bytes: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read the next chunk of bytes. `None` signals the peer closed the
    /// connection.
    fn recv(&mut self) -> impl std::future::Future<Output = Option<Vec<u8>>> + Send;

    /// Tear down the connection. Best-effort; errors are not surfaced
    /// since the caller is already abandoning the connection.
    fn close(&mut self);
}

/// A `Transport` over a plain `tokio::net::TcpStream`.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_buf: [u8; 8192],
}

impl TcpTransport {
    /// Dial a single `host:port`, no failover.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| StompError::connection(format!("failed to connect to {host}:{port}: {e}")))?;
        stream.set_nodelay(true).map_err(|e| StompError::connection(e.to_string()))?;
        Ok(TcpTransport { stream: Some(stream), read_buf: [0u8; 8192] })
    }

    /// Dial through a parsed failover target, trying each `(endpoint,
    /// delay)` attempt in order until one succeeds or the policy is
    /// exhausted. `connect_timeout` bounds the whole retry loop — distinct
    /// from the per-attempt TCP connect, which has no timeout of its own.
    pub async fn connect_failover(target: &FailoverTarget, connect_timeout: Option<f64>) -> Result<Self> {
        let attempts = Self::try_failover(target);
        match connect_timeout {
            Some(secs) => tokio::time::timeout(std::time::Duration::from_secs_f64(secs), attempts)
                .await
                .unwrap_or_else(|_| Err(StompError::cancelled("timed out connecting"))),
            None => attempts.await,
        }
    }

    async fn try_failover(target: &FailoverTarget) -> Result<Self> {
        let mut last_error = None;
        for (endpoint, delay_ms) in Attempts::new(target) {
            if delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            match TcpTransport::connect(&endpoint.host, endpoint.port).await {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    debug!(host = %endpoint.host, port = endpoint.port, error = %e, "failover attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| StompError::connection("failover target has no endpoints")))
    }
}

impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| StompError::connection("transport is closed"))?;
        stream.write_all(bytes).await.map_err(|e| StompError::connection(e.to_string()))?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        let stream = self.stream.as_mut()?;
        match stream.read(&mut self.read_buf).await {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(self.read_buf[..n].to_vec()),
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// An in-memory transport for tests: a duplex channel pair standing in
/// for the broker side of the wire, so session/client behaviour can be
/// exercised without a real socket.
#[cfg(any(test, feature = "test-support"))]
pub struct MockTransport {
    tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    closed: bool,
}

#[cfg(any(test, feature = "test-support"))]
impl MockTransport {
    /// Build a connected pair: `(client_side, broker_side)`. Bytes sent on
    /// one arrive via `recv` on the other.
    pub fn pair() -> (MockTransport, MockTransport) {
        let (client_tx, broker_rx) = tokio::sync::mpsc::unbounded_channel();
        let (broker_tx, client_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            MockTransport { tx: client_tx, rx: client_rx, closed: false },
            MockTransport { tx: broker_tx, rx: broker_rx, closed: false },
        )
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Transport for MockTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(StompError::connection("transport is closed"));
        }
        self.tx.send(bytes.to_vec()).map_err(|_| StompError::connection("peer dropped"))
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
