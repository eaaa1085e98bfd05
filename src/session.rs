//! Per-connection protocol state machine.
//!
//! Enforces legal command sequencing, builds outbound frames via
//! [`crate::commands`], interprets inbound replies, and tracks the
//! subscription registry, pending receipts, and active transactions. A
//! `Session` is private to the owning client; nothing here touches a
//! transport.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::commands::{self, ConnectOptions};
use crate::error::{Result, StompError};
use crate::frame::{Frame, Headers};
use crate::spec::{self, Version};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Identifies a live subscription. 1.0 has no mandatory `id` header, so a
/// subscription is addressed by its `(destination, id)` pair instead; 1.1
/// requires an explicit id and the token is just that string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionToken {
    V10 { destination: String, id: Option<String> },
    V11(String),
}

/// Everything recorded about a subscription so it can be replayed after
/// a clean disconnect/reconnect cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionContext {
    pub destination: String,
    pub headers: Headers,
    pub receipt: Option<String>,
}

/// The authoritative per-connection protocol state.
pub struct Session {
    version: Version,
    state: State,
    session_id: Option<String>,
    server: Option<String>,
    heart_beats: (u64, u64),
    last_sent: u64,
    last_received: u64,
    subscriptions: HashMap<SubscriptionToken, SubscriptionContext>,
    /// Insertion order, so `replay` yields deterministic ordering.
    subscription_order: Vec<SubscriptionToken>,
    pending_receipts: HashSet<String>,
    active_transactions: HashSet<String>,
    next_subscription_id: u64,
    /// Accepted versions to offer/validate during negotiation.
    accepted_versions: Vec<Version>,
}

impl Session {
    pub fn new(accepted_versions: Vec<Version>) -> Self {
        Session {
            version: spec::DEFAULT_VERSION,
            state: State::Disconnected,
            session_id: None,
            server: None,
            heart_beats: (0, 0),
            last_sent: 0,
            last_received: 0,
            subscriptions: HashMap::new(),
            subscription_order: Vec::new(),
            pending_receipts: HashSet::new(),
            active_transactions: HashSet::new(),
            next_subscription_id: 0,
            accepted_versions,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn heart_beats(&self) -> (u64, u64) {
        self.heart_beats
    }

    pub fn last_sent(&self) -> u64 {
        self.last_sent
    }

    pub fn last_received(&self) -> u64 {
        self.last_received
    }

    fn require_connected(&self) -> Result<()> {
        if self.state != State::Connected {
            return Err(StompError::protocol(format!("command requires CONNECTED, session is {:?}", self.state)));
        }
        Ok(())
    }

    fn track_receipt(&mut self, frame: &Frame) {
        if let Some(receipt) = frame.headers.get(spec::RECEIPT_HEADER) {
            self.pending_receipts.insert(receipt.to_string());
        }
    }

    /// Build CONNECT and transition DISCONNECTED → CONNECTING.
    pub fn connect(&mut self, login: Option<&str>, passcode: Option<&str>, host: Option<&str>, heart_beats: Option<(i64, i64)>) -> Result<Frame> {
        if self.state != State::Disconnected {
            return Err(StompError::protocol(format!("connect requires DISCONNECTED, session is {:?}", self.state)));
        }
        let versions = self.accepted_versions.clone();
        let frame = commands::connect(&ConnectOptions {
            login,
            passcode,
            extra_headers: None,
            versions: Some(&versions),
            host,
            heart_beats,
        })?;
        self.state = State::Connecting;
        Ok(frame)
    }

    /// Validate an inbound CONNECTED frame and complete negotiation.
    pub fn connected(&mut self, frame: &Frame) -> Result<()> {
        if self.state != State::Connecting {
            return Err(StompError::protocol(format!("CONNECTED unexpected in state {:?}", self.state)));
        }
        let versions = self.accepted_versions.clone();
        let (version, server, session_id, heart_beats) = commands::connected(frame, Some(&versions))?;
        self.version = version;
        self.server = server;
        self.session_id = session_id;
        self.heart_beats = heart_beats;
        self.state = State::Connected;
        Ok(())
    }

    pub fn send(&mut self, destination: &str, body: &[u8], headers: Option<&Headers>, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        let frame = commands::send(destination, body, headers, receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    fn allocate_subscription_id(&mut self) -> String {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        id.to_string()
    }

    /// Allocate a subscription token, build SUBSCRIBE, and record replay context.
    pub fn subscribe(&mut self, destination: &str, headers: Option<&Headers>, receipt: Option<&str>, id: Option<&str>) -> Result<(Frame, SubscriptionToken)> {
        self.require_connected()?;
        let token = match self.version {
            Version::V1_1 => {
                let id = id.map(String::from).unwrap_or_else(|| self.allocate_subscription_id());
                SubscriptionToken::V11(id)
            }
            Version::V1_0 => SubscriptionToken::V10 { destination: destination.to_string(), id: id.map(String::from) },
        };
        let id_header = match &token {
            SubscriptionToken::V11(id) => Some(id.as_str()),
            SubscriptionToken::V10 { id, .. } => id.as_deref(),
        };
        let frame = commands::subscribe(destination, headers, receipt, id_header);
        self.track_receipt(&frame);
        let context = SubscriptionContext {
            destination: destination.to_string(),
            headers: headers.cloned().unwrap_or_default(),
            receipt: receipt.map(String::from),
        };
        if self.subscriptions.insert(token.clone(), context).is_none() {
            self.subscription_order.push(token.clone());
        }
        Ok((frame, token))
    }

    /// Remove a subscription and build UNSUBSCRIBE. Fails if `token` is unknown.
    pub fn unsubscribe(&mut self, token: &SubscriptionToken, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        if self.subscriptions.remove(token).is_none() {
            return Err(StompError::protocol("unsubscribe from unknown subscription"));
        }
        self.subscription_order.retain(|t| t != token);
        let id = match token {
            SubscriptionToken::V11(id) => id.clone(),
            SubscriptionToken::V10 { destination, id } => id.clone().unwrap_or_else(|| destination.clone()),
        };
        let frame = commands::unsubscribe(&id, receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    pub fn begin(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        if !self.active_transactions.insert(transaction.to_string()) {
            return Err(StompError::protocol(format!("transaction {transaction:?} already active")));
        }
        let frame = commands::begin(transaction, receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    pub fn commit(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        if !self.active_transactions.remove(transaction) {
            return Err(StompError::protocol(format!("commit of unknown transaction {transaction:?}")));
        }
        let frame = commands::commit(transaction, receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    pub fn abort(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        if !self.active_transactions.remove(transaction) {
            return Err(StompError::protocol(format!("abort of unknown transaction {transaction:?}")));
        }
        let frame = commands::abort(transaction, receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    pub fn ack(&mut self, frame: &Frame, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        let out = commands::ack(frame, &self.active_transactions, receipt, self.version)?;
        self.track_receipt(&out);
        Ok(out)
    }

    pub fn nack(&mut self, frame: &Frame, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        let out = commands::nack(frame, &self.active_transactions, receipt, self.version)?;
        self.track_receipt(&out);
        Ok(out)
    }

    /// Build DISCONNECT; CONNECTED → DISCONNECTING.
    pub fn disconnect(&mut self, receipt: Option<&str>) -> Result<Frame> {
        self.require_connected()?;
        self.state = State::Disconnecting;
        let frame = commands::disconnect(receipt);
        self.track_receipt(&frame);
        Ok(frame)
    }

    /// Match an inbound RECEIPT against the pending set.
    pub fn receipt(&mut self, frame: &Frame) -> Result<String> {
        let receipt_id = commands::receipt(frame)?;
        if !self.pending_receipts.remove(&receipt_id) {
            return Err(StompError::protocol(format!("receipt for unknown id {receipt_id:?}")));
        }
        Ok(receipt_id)
    }

    /// Resolve an inbound MESSAGE to its subscription token.
    pub fn message(&self, frame: &Frame) -> Result<SubscriptionToken> {
        commands::validate_message(frame, self.version)?;
        match self.version {
            Version::V1_1 => {
                let id = frame.headers.get(spec::SUBSCRIPTION_HEADER).expect("validated above").to_string();
                Ok(SubscriptionToken::V11(id))
            }
            Version::V1_0 => {
                let destination = frame
                    .headers
                    .get(spec::DESTINATION_HEADER)
                    .ok_or_else(|| StompError::protocol("MESSAGE frame is missing the destination header"))?;
                self.subscriptions
                    .keys()
                    .find(|token| matches!(token, SubscriptionToken::V10 { destination: d, .. } if d == destination))
                    .cloned()
                    .ok_or_else(|| StompError::protocol(format!("no subscription matches destination {destination:?}")))
            }
        }
    }

    /// Record an outbound byte for heart-beat bookkeeping.
    pub fn sent(&mut self, now_ms: u64) {
        self.last_sent = now_ms;
    }

    /// Record an inbound byte for heart-beat bookkeeping.
    pub fn received(&mut self, now_ms: u64) {
        self.last_received = now_ms;
    }

    /// Build the outbound heart-beat sentinel.
    pub fn beat(&self) -> Vec<u8> {
        crate::frame::heart_beat_bytes()
    }

    /// Reset to DISCONNECTED. `flush` clears subscriptions/transactions;
    /// otherwise they survive for `replay` on reconnect.
    pub fn close(&mut self, flush: bool) {
        self.state = State::Disconnected;
        self.session_id = None;
        self.server = None;
        self.heart_beats = (0, 0);
        self.pending_receipts.clear();
        if flush {
            self.subscriptions.clear();
            self.subscription_order.clear();
            self.active_transactions.clear();
        }
    }

    /// The subscriptions recorded at last successful subscribe, in
    /// deterministic insertion order, for replay after reconnect.
    pub fn replay(&self) -> Vec<(SubscriptionToken, SubscriptionContext)> {
        self.subscription_order
            .iter()
            .filter_map(|token| self.subscriptions.get(token).map(|ctx| (token.clone(), ctx.clone())))
            .collect()
    }
}
