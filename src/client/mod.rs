//! The asynchronous client runtime.
//!
//! One task ("the I/O loop") owns the transport exclusively and is the
//! only thing that ever reads or writes it; every other method on
//! [`Client`] reaches the connection by pushing onto an outbound queue
//! and, where a reply matters, registering a slot in a
//! [`inflight::PendingTable`] that the I/O loop resolves once it sees the
//! matching frame. `Session` is the sole owner of protocol *state*, kept
//! behind its own lock so the public methods and the I/O loop can both
//! reach it without racing each other over a partially-applied mutation.
//!
//! Subscription handlers run as independently spawned tasks so a slow
//! handler for one message never blocks dispatch of the next; the I/O
//! loop only waits on them when a caller asks for a graceful disconnect.

mod heartbeat;
mod inflight;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, warn};

use crate::config::ClientOptions;
use crate::error::{Result, StompError};
use crate::frame::{Frame, Headers, Transmission};
use crate::parser::Parser;
use crate::session::{Session, SubscriptionToken};
use crate::spec;
use crate::transport::Transport;
use crate::{commands, failover};
use heartbeat::{HeartbeatEvent, HeartbeatTimers};
use inflight::PendingTable;

/// A boxed, owned future — the shape a trait-object handler closure needs
/// to return since it can't use `async fn` directly.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A subscription's message callback: given a handle back to the client
/// (to ack/nack or publish) and the delivered frame, resolve once the
/// message has been handled.
pub type MessageHandler = Arc<dyn Fn(Client, Frame) -> BoxFuture<Result<()>> + Send + Sync>;

/// A hook run when a subscription's handler returns `Err`, in place of
/// the default "forward to `error_destination`, then ack" behaviour.
pub type MessageFailedHook = Arc<dyn Fn(Client, Frame, StompError) -> BoxFuture<Result<()>> + Send + Sync>;

/// Per-subscription behaviour beyond the destination/headers already
/// captured by `Session`.
#[derive(Clone)]
pub struct SubscribeOptions {
    /// Acknowledge automatically after the handler returns `Ok`. When
    /// `false`, the handler is responsible for calling `client.ack`/`nack`
    /// itself (typically after its own side effects have committed).
    pub ack: bool,
    /// Destination to forward a message to (with a `message-failed`
    /// header) when its handler fails and no `on_message_failed` hook is set.
    pub error_destination: Option<String>,
    pub on_message_failed: Option<MessageFailedHook>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions { ack: true, error_destination: None, on_message_failed: None }
    }
}

#[derive(Clone)]
struct SubscriptionEntry {
    handler: MessageHandler,
    opts: SubscribeOptions,
}

enum OutboundMsg {
    Frame(Vec<u8>),
    Close(Option<StompError>),
}

enum HandlerOutcome {
    Primary { token: SubscriptionToken, frame: Frame, result: Result<()> },
    FailureHook { message_id: String, result: Result<()> },
}

/// A cheap, cloneable handle to a running client. All the real state
/// lives in the `Arc<ClientInner>` every clone shares.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: ClientOptions,
    session: Mutex<Session>,
    /// Replaced wholesale by `reconnect`, whose new `run_io` task owns a
    /// fresh receiver; everything else just locks and sends.
    outbox: Mutex<mpsc::UnboundedSender<OutboundMsg>>,
    heartbeat_events: Mutex<mpsc::UnboundedSender<HeartbeatEvent>>,
    subscriptions: Mutex<HashMap<SubscriptionToken, SubscriptionEntry>>,
    receipts: Mutex<PendingTable<String, Frame>>,
    connect_waiter: Mutex<Option<oneshot::Sender<Result<()>>>>,
    disconnect_waiter: Mutex<Option<oneshot::Sender<Result<()>>>>,
    connecting: AtomicBool,
    disconnecting: AtomicBool,
    in_flight_count: AtomicUsize,
    in_flight_notify: tokio::sync::Notify,
    next_receipt_id: AtomicU64,
    last_sent_ms: AtomicU64,
    last_received_ms: AtomicU64,
    started_at: Instant,
    heartbeat: Mutex<Option<HeartbeatTimers>>,
    disconnected_tx: watch::Sender<Option<std::result::Result<(), StompError>>>,
}

impl ClientInner {
    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub(super) fn last_sent_ms(&self) -> u64 {
        self.last_sent_ms.load(Ordering::SeqCst)
    }

    pub(super) fn last_received_ms(&self) -> u64 {
        self.last_received_ms.load(Ordering::SeqCst)
    }

    async fn record_sent(&self) {
        let now = self.now_ms();
        self.last_sent_ms.store(now, Ordering::SeqCst);
        self.session.lock().await.sent(now);
    }

    async fn record_received(&self) {
        let now = self.now_ms();
        self.last_received_ms.store(now, Ordering::SeqCst);
        self.session.lock().await.received(now);
    }

    fn next_receipt_id(&self) -> String {
        format!("r{}", self.next_receipt_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn push_outbound(&self, msg: OutboundMsg) -> Result<()> {
        self.outbox.lock().await.send(msg).map_err(|_| StompError::connection("transport is closed"))
    }

    async fn heartbeat_sender(&self) -> mpsc::UnboundedSender<HeartbeatEvent> {
        self.heartbeat_events.lock().await.clone()
    }

    /// Run once the I/O loop ends, on either a clean close (`cause` is
    /// `None`) or a connection failure. Resolves every outstanding waiter
    /// and publishes the final outcome.
    async fn finalize(&self, cause: Option<StompError>) {
        let flush = cause.is_none();
        {
            let mut session = self.session.lock().await;
            session.close(flush);
        }
        self.heartbeat.lock().await.take();

        let reason = cause.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "connection closed".to_string());
        if let Some(tx) = self.connect_waiter.lock().await.take() {
            let _ = tx.send(Err(cause.clone().unwrap_or_else(|| StompError::cancelled(reason.clone()))));
        }
        self.receipts.lock().await.drain_cancel(&reason);
        if let Some(tx) = self.disconnect_waiter.lock().await.take() {
            let _ = tx.send(match &cause {
                None => Ok(()),
                Some(e) => Err(e.clone()),
            });
        }

        self.connecting.store(false, Ordering::SeqCst);
        self.disconnecting.store(false, Ordering::SeqCst);
        let _ = self.disconnected_tx.send(Some(match cause {
            None => Ok(()),
            Some(e) => Err(e),
        }));
    }
}

impl Client {
    /// Build a client bound to an already-open `transport`. The STOMP
    /// handshake itself happens on the first call to `connect`.
    pub fn new<T: Transport + 'static>(options: ClientOptions, transport: T) -> Client {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
        let (disconnected_tx, _) = watch::channel(None);
        let accepted_versions = options.config.versions.clone();
        let inner = Arc::new(ClientInner {
            options,
            session: Mutex::new(Session::new(accepted_versions)),
            outbox: Mutex::new(outbox_tx),
            heartbeat_events: Mutex::new(heartbeat_tx),
            subscriptions: Mutex::new(HashMap::new()),
            receipts: Mutex::new(PendingTable::new()),
            connect_waiter: Mutex::new(None),
            disconnect_waiter: Mutex::new(None),
            connecting: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            in_flight_count: AtomicUsize::new(0),
            in_flight_notify: tokio::sync::Notify::new(),
            next_receipt_id: AtomicU64::new(0),
            last_sent_ms: AtomicU64::new(0),
            last_received_ms: AtomicU64::new(0),
            started_at: Instant::now(),
            heartbeat: Mutex::new(None),
            disconnected_tx,
        });
        tokio::spawn(run_io(transport, inner.clone(), outbox_rx, heartbeat_rx));
        Client { inner }
    }

    /// Dial `options.config.uri` (which may name a failover list) and
    /// hand the resulting TCP connection to `Client::new`.
    pub async fn connect_uri(options: ClientOptions) -> Result<Client> {
        let target = failover::parse(&options.config.uri)?;
        let transport = crate::transport::TcpTransport::connect_failover(&target, options.connect_timeout).await?;
        let client = Client::new(options, transport);
        client.connect().await?;
        Ok(client)
    }

    /// A receiver that resolves once the connection ends, with `Ok(())`
    /// for a clean, caller-requested disconnect or `Err` for a failure.
    pub fn disconnected(&self) -> watch::Receiver<Option<std::result::Result<(), StompError>>> {
        self.inner.disconnected_tx.subscribe()
    }

    /// Attach a freshly dialed `transport` to this same client and run the
    /// handshake again. The session must be `Disconnected`. If the prior
    /// disconnect didn't flush (see [`Session::close`]), subscriptions
    /// recorded before it are replayed once the new CONNECTED arrives.
    pub async fn reconnect<T: Transport + 'static>(&self, transport: T) -> Result<()> {
        {
            let session = self.inner.session.lock().await;
            if session.state() != crate::session::State::Disconnected {
                return Err(StompError::already_running("client is already connected or connecting"));
            }
        }
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
        *self.inner.outbox.lock().await = outbox_tx;
        *self.inner.heartbeat_events.lock().await = heartbeat_tx;
        tokio::spawn(run_io(transport, self.inner.clone(), outbox_rx, heartbeat_rx));
        self.connect().await
    }

    /// Perform the STOMP handshake: send CONNECT, wait for CONNECTED.
    /// Fails with `AlreadyRunning` if a connect is already in flight or
    /// the session isn't `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.connecting.swap(true, Ordering::SeqCst) {
            return Err(StompError::already_running("connect already in progress"));
        }
        let result = self.do_connect().await;
        self.inner.connecting.store(false, Ordering::SeqCst);
        result
    }

    async fn do_connect(&self) -> Result<()> {
        {
            let session = self.inner.session.lock().await;
            if session.state() != crate::session::State::Disconnected {
                return Err(StompError::already_running("client is already connected or connecting"));
            }
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut session = self.inner.session.lock().await;
            let login = self.inner.options.config.login.clone();
            let passcode = self.inner.options.config.passcode.clone();
            let frame = session.connect(login.as_deref(), passcode.as_deref(), None, None)?;
            drop(session);
            *self.inner.connect_waiter.lock().await = Some(tx);
            self.inner.push_outbound(OutboundMsg::Frame(frame.serialize())).await?;
        }
        let outcome = match self.inner.options.connected_timeout {
            Some(secs) => match tokio::time::timeout(Duration::from_secs_f64(secs), rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(StompError::cancelled("connection closed before CONNECTED")),
                Err(_) => {
                    self.inner.connect_waiter.lock().await.take();
                    let _ = self.inner.push_outbound(OutboundMsg::Close(Some(StompError::cancelled("connect timed out")))).await;
                    Err(StompError::cancelled("timed out waiting for CONNECTED"))
                }
            },
            None => match rx.await {
                Ok(result) => result,
                Err(_) => Err(StompError::cancelled("connection closed before CONNECTED")),
            },
        };
        outcome
    }

    /// Gracefully tear the connection down: wait for in-flight handlers to
    /// drain, send DISCONNECT (with a receipt, if still connected), then
    /// close the transport. Fails with `AlreadyRunning` if a disconnect is
    /// already in flight.
    pub async fn disconnect(&self) -> Result<()> {
        if self.inner.disconnecting.swap(true, Ordering::SeqCst) {
            return Err(StompError::already_running("disconnect already in progress"));
        }
        let drain_cause = self.wait_for_handlers_drain().await;

        let mut outgoing: Option<Frame> = None;
        let mut receipt_rx: Option<oneshot::Receiver<Result<Frame>>> = None;
        {
            let mut session = self.inner.session.lock().await;
            if session.state() == crate::session::State::Connected {
                let receipt_id = self.inner.next_receipt_id();
                let frame = session.disconnect(Some(receipt_id.as_str()))?;
                drop(session);
                receipt_rx = Some(self.inner.receipts.lock().await.register(receipt_id));
                outgoing = Some(frame);
            }
        }
        if let Some(frame) = outgoing {
            let _ = self.inner.push_outbound(OutboundMsg::Frame(frame.serialize())).await;
        }
        if let Some(rx) = receipt_rx {
            self.await_receipt(rx).await.ok();
        }

        let (tx, rx) = oneshot::channel();
        *self.inner.disconnect_waiter.lock().await = Some(tx);
        let _ = self.inner.push_outbound(OutboundMsg::Close(drain_cause)).await;
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Wait for in-flight message handlers to finish, up to
    /// `disconnect_timeout`. Returns the cause to close with: `None` for a
    /// clean drain, `Some(Cancelled(..))` if handlers were still running
    /// when the deadline passed.
    async fn wait_for_handlers_drain(&self) -> Option<StompError> {
        let deadline = self.inner.options.disconnect_timeout.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
        loop {
            if self.inner.in_flight_count.load(Ordering::SeqCst) == 0 {
                return None;
            }
            let notified = self.inner.in_flight_notify.notified();
            match deadline {
                Some(at) => {
                    if Instant::now() >= at {
                        warn!("disconnect proceeding with in-flight message handlers still running");
                        return Some(StompError::cancelled("Handlers did not finish in time"));
                    }
                    let _ = tokio::time::timeout_at(at.into(), notified).await;
                }
                None => notified.await,
            }
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.inner.push_outbound(OutboundMsg::Frame(frame.serialize())).await
    }

    async fn await_receipt(&self, rx: oneshot::Receiver<Result<Frame>>) -> Result<()> {
        let outcome = match self.inner.options.receipt_timeout {
            Some(secs) => match tokio::time::timeout(Duration::from_secs_f64(secs), rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(StompError::cancelled("connection closed before receipt arrived")),
                Err(_) => Err(StompError::cancelled("timed out waiting for receipt")),
            },
            None => match rx.await {
                Ok(result) => result,
                Err(_) => Err(StompError::cancelled("connection closed before receipt arrived")),
            },
        };
        outcome.map(|_| ())
    }

    /// Send a message. When `want_receipt` is set, waits for the broker's
    /// RECEIPT before resolving.
    pub async fn send(&self, destination: &str, body: &[u8], headers: Option<Headers>, want_receipt: bool) -> Result<()> {
        let receipt_id = if want_receipt { Some(self.inner.next_receipt_id()) } else { None };
        let (frame, receipt_rx) = {
            let mut session = self.inner.session.lock().await;
            let frame = session.send(destination, body, headers.as_ref(), receipt_id.as_deref())?;
            drop(session);
            let rx = match &receipt_id {
                Some(id) => Some(self.inner.receipts.lock().await.register(id.clone())),
                None => None,
            };
            (frame, rx)
        };
        self.write_frame(&frame).await?;
        if let Some(rx) = receipt_rx {
            self.await_receipt(rx).await?;
        }
        Ok(())
    }

    /// Send a caller-built frame directly, bypassing the convenience
    /// builders. The session must already be `Connected`.
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        {
            let session = self.inner.session.lock().await;
            if session.state() != crate::session::State::Connected {
                return Err(StompError::protocol("send_frame requires an established connection"));
            }
        }
        self.write_frame(&frame).await
    }

    /// Subscribe to `destination`, invoking `handler` for every delivered
    /// message. Returns the token needed to `unsubscribe` later.
    pub async fn subscribe(&self, destination: &str, headers: Option<Headers>, opts: SubscribeOptions, handler: MessageHandler) -> Result<SubscriptionToken> {
        let (frame, token) = {
            let mut session = self.inner.session.lock().await;
            session.subscribe(destination, headers.as_ref(), None, None)?
        };
        self.inner.subscriptions.lock().await.insert(token.clone(), SubscriptionEntry { handler, opts });
        self.write_frame(&frame).await?;
        Ok(token)
    }

    pub async fn unsubscribe(&self, token: &SubscriptionToken) -> Result<()> {
        let frame = {
            let mut session = self.inner.session.lock().await;
            session.unsubscribe(token, None)?
        };
        self.inner.subscriptions.lock().await.remove(token);
        self.write_frame(&frame).await
    }

    /// Acknowledge a delivered MESSAGE frame.
    pub async fn ack(&self, frame: &Frame) -> Result<()> {
        let out = {
            let mut session = self.inner.session.lock().await;
            session.ack(frame, None)?
        };
        self.write_frame(&out).await
    }

    /// Negatively acknowledge a delivered MESSAGE frame. Version 1.1 only.
    pub async fn nack(&self, frame: &Frame) -> Result<()> {
        let out = {
            let mut session = self.inner.session.lock().await;
            session.nack(frame, None)?
        };
        self.write_frame(&out).await
    }

    pub async fn begin(&self, transaction: &str) -> Result<()> {
        let frame = {
            let mut session = self.inner.session.lock().await;
            session.begin(transaction, None)?
        };
        self.write_frame(&frame).await
    }

    pub async fn commit(&self, transaction: &str) -> Result<()> {
        let frame = {
            let mut session = self.inner.session.lock().await;
            session.commit(transaction, None)?
        };
        self.write_frame(&frame).await
    }

    pub async fn abort(&self, transaction: &str) -> Result<()> {
        let frame = {
            let mut session = self.inner.session.lock().await;
            session.abort(transaction, None)?
        };
        self.write_frame(&frame).await
    }
}

async fn run_io<T: Transport>(mut transport: T, inner: Arc<ClientInner>, mut outbox: mpsc::UnboundedReceiver<OutboundMsg>, mut heartbeat_events: mpsc::UnboundedReceiver<HeartbeatEvent>) {
    let mut parser = Parser::new(spec::DEFAULT_VERSION);
    let cause: Option<StompError> = 'io: loop {
        tokio::select! {
            bytes = transport.recv() => {
                match bytes {
                    None => break 'io Some(StompError::connection("connection closed by peer")),
                    Some(data) => {
                        inner.record_received().await;
                        if let Err(e) = parser.add(&data) {
                            break 'io Some(e);
                        }
                        loop {
                            let Some(transmission) = parser.get() else { break };
                            if let Some(cause) = dispatch_transmission(&inner, &mut parser, transmission).await {
                                break 'io Some(cause);
                            }
                        }
                    }
                }
            }
            Some(msg) = outbox.recv() => {
                match msg {
                    OutboundMsg::Frame(bytes) => {
                        if let Err(e) = transport.send(&bytes).await {
                            break 'io Some(e);
                        }
                        inner.record_sent().await;
                    }
                    OutboundMsg::Close(cause) => break 'io cause,
                }
            }
            Some(ev) = heartbeat_events.recv() => {
                match ev {
                    HeartbeatEvent::ClientTick => {
                        if let Err(e) = transport.send(&crate::frame::heart_beat_bytes()).await {
                            break 'io Some(e);
                        }
                        inner.record_sent().await;
                    }
                    HeartbeatEvent::ServerTimeout => break 'io Some(StompError::connection("server heart-beat timeout")),
                }
            }
        }
    };
    transport.close();
    inner.finalize(cause).await;
}

/// Handle one decoded transmission. Returns `Some(cause)` when the I/O
/// loop should tear the connection down.
async fn dispatch_transmission(inner: &Arc<ClientInner>, parser: &mut Parser, transmission: Transmission) -> Option<StompError> {
    let frame = match transmission {
        Transmission::HeartBeat => return None,
        Transmission::Frame(frame) => frame,
    };
    match frame.command.as_str() {
        spec::CONNECTED => {
            let result = {
                let mut session = inner.session.lock().await;
                session.connected(&frame).map(|()| session.version())
            };
            match result {
                Ok(version) => {
                    parser.set_version(version);
                    if let Some(tx) = inner.connect_waiter.lock().await.take() {
                        let _ = tx.send(Ok(()));
                    }
                    start_heartbeats_and_replay(inner).await;
                    None
                }
                Err(e) => {
                    if let Some(tx) = inner.connect_waiter.lock().await.take() {
                        let _ = tx.send(Err(e));
                        None
                    } else {
                        Some(e)
                    }
                }
            }
        }
        spec::RECEIPT => {
            let outcome = {
                let mut session = inner.session.lock().await;
                session.receipt(&frame)
            };
            match outcome {
                Ok(id) => {
                    inner.receipts.lock().await.complete(&id, frame);
                }
                Err(e) => warn!(error = %e, "dropping unmatched RECEIPT"),
            }
            None
        }
        spec::ERROR => {
            let message = frame.headers.get("message").unwrap_or("");
            // Pre-5.2 ActiveMQ echoes an ERROR for every client-individual
            // ACK; it is not a real protocol violation.
            if inner.options.config.tolerate_unknown_ack_error
                && message.contains("Unexpected ACK received for message-id")
            {
                debug!("ignoring broker ERROR workaround for client-individual ack");
                return None;
            }
            let is_connecting = inner.connect_waiter.lock().await.is_some();
            if is_connecting {
                if let Some(tx) = inner.connect_waiter.lock().await.take() {
                    let _ = tx.send(Err(StompError::protocol(format!("broker rejected connect: {}", frame.body_str()))));
                }
                None
            } else {
                Some(StompError::protocol(format!("broker sent ERROR: {}", frame.body_str())))
            }
        }
        spec::MESSAGE => {
            dispatch_message(inner, frame).await;
            None
        }
        other => Some(StompError::invalid_frame(format!("unexpected command from broker: {other}"))),
    }
}

async fn start_heartbeats_and_replay(inner: &Arc<ClientInner>) {
    let (heart_beats, replay) = {
        let session = inner.session.lock().await;
        (session.heart_beats(), session.replay())
    };
    if heart_beats != (0, 0) {
        let timers = HeartbeatTimers::start(inner.clone(), heart_beats, inner.options.heartbeat_thresholds, inner.heartbeat_sender().await);
        *inner.heartbeat.lock().await = Some(timers);
    }
    for (token, ctx) in replay {
        let id_header = match &token {
            SubscriptionToken::V11(id) => Some(id.as_str()),
            SubscriptionToken::V10 { id, .. } => id.as_deref(),
        };
        let frame = commands::subscribe(&ctx.destination, Some(&ctx.headers), ctx.receipt.as_deref(), id_header);
        let _ = inner.push_outbound(OutboundMsg::Frame(frame.serialize())).await;
    }
}

async fn dispatch_message(inner: &Arc<ClientInner>, frame: Frame) {
    if inner.disconnecting.load(Ordering::SeqCst) {
        let nack = {
            let mut session = inner.session.lock().await;
            session.nack(&frame, None)
        };
        if let Ok(nack) = nack {
            let _ = inner.push_outbound(OutboundMsg::Frame(nack.serialize())).await;
        }
        return;
    }

    let token = {
        let session = inner.session.lock().await;
        match session.message(&frame) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "dropping MESSAGE for unresolvable subscription");
                return;
            }
        }
    };
    let entry = inner.subscriptions.lock().await.get(&token).cloned();
    let Some(entry) = entry else {
        warn!(?token, "dropping MESSAGE: no handler registered");
        return;
    };
    inner.in_flight_count.fetch_add(1, Ordering::SeqCst);
    let client = Client { inner: inner.clone() };
    let spawned_inner = inner.clone();
    let spawned_frame = frame.clone();
    let spawned_token = token.clone();
    tokio::spawn(async move {
        let result = (entry.handler)(client.clone(), spawned_frame.clone()).await;
        let outcome = HandlerOutcome::Primary { token: spawned_token, frame: spawned_frame, result };
        finish_message(&spawned_inner, &client, outcome, entry.opts).await;
        spawned_inner.in_flight_count.fetch_sub(1, Ordering::SeqCst);
        spawned_inner.in_flight_notify.notify_waiters();
    });
}

async fn finish_message(inner: &Arc<ClientInner>, client: &Client, outcome: HandlerOutcome, opts: SubscribeOptions) {
    match outcome {
        HandlerOutcome::Primary { token, frame, result } => match result {
            Ok(()) => {
                if opts.ack {
                    let _ = client.ack(&frame).await;
                }
            }
            Err(cause) => run_failure_hook(inner, client, token, frame, cause, opts).await,
        },
        HandlerOutcome::FailureHook { message_id, result } => {
            if let Err(cause) = result {
                warn!(%message_id, error = %cause, "message-failed hook itself failed, tearing connection down");
                if !inner.disconnecting.load(Ordering::SeqCst) {
                    let _ = inner.push_outbound(OutboundMsg::Close(Some(cause))).await;
                }
            }
        }
    }
}

/// Exactly one ack is ever issued per message: the success path above
/// acks once, and each branch here acks once — never both.
async fn run_failure_hook(inner: &Arc<ClientInner>, client: &Client, token: SubscriptionToken, frame: Frame, cause: StompError, opts: SubscribeOptions) {
    match &opts.on_message_failed {
        Some(hook) => {
            let hook = hook.clone();
            let client = client.clone();
            let spawned_inner = inner.clone();
            let message_id = frame.headers.get(spec::MESSAGE_ID_HEADER).unwrap_or_default().to_string();
            spawned_inner.in_flight_count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let result = hook(client.clone(), frame, cause).await;
                let outcome = HandlerOutcome::FailureHook { message_id, result };
                finish_message(&spawned_inner, &client, outcome, SubscribeOptions::default()).await;
                spawned_inner.in_flight_count.fetch_sub(1, Ordering::SeqCst);
                spawned_inner.in_flight_notify.notify_waiters();
            });
        }
        None => {
            if let Some(dest) = &opts.error_destination {
                let mut headers = frame.headers.clone();
                headers.replace(spec::MESSAGE_FAILED_HEADER, cause.to_string());
                let forward = commands::send(dest, &frame.body, Some(&headers), None);
                let _ = client.write_frame(&forward).await;
            } else {
                warn!(?token, error = %cause, "message handler failed with no error_destination configured");
            }
            let _ = client.ack(&frame).await;
        }
    }
}
