//! Connection configuration.
//!
//! A plain, in-process struct — not parsed from a serialized document.
//! The one piece of external, textual configuration is the connection
//! URI itself, handled by [`crate::failover`].

use crate::spec::{self, Version};

/// Recognised connection options, matching §6's configuration object.
#[derive(Debug, Clone)]
pub struct StompConfig {
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub versions: Vec<Version>,
    pub uri: String,
    /// Strict command validation against the negotiated version's known
    /// command set.
    pub check: bool,
    /// Swallow ERROR frames whose `message` header names the pre-5.2
    /// broker "Unexpected ACK received for message-id" idiosyncrasy,
    /// rather than treating them as a fatal protocol violation. Disable
    /// in tests that want to see the ERROR surfaced.
    pub tolerate_unknown_ack_error: bool,
}

impl StompConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        StompConfig {
            login: None,
            passcode: None,
            versions: vec![spec::DEFAULT_VERSION],
            uri: uri.into(),
            check: true,
            tolerate_unknown_ack_error: true,
        }
    }

    pub fn login(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    pub fn versions(mut self, versions: Vec<Version>) -> Self {
        self.versions = versions;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }
}

/// Per-direction heart-beat timeout thresholds, as a fraction of the
/// negotiated period. Defaults match the reference client: the client's
/// own outbound timer fires a bit early (0.8×), the server-liveness
/// check tolerates a bit of jitter before declaring a timeout (2.0×).
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatThresholds {
    pub client: f64,
    pub server: f64,
}

impl Default for HeartbeatThresholds {
    fn default() -> Self {
        HeartbeatThresholds { client: 0.8, server: 2.0 }
    }
}

/// Client construction parameters beyond the wire-level `StompConfig`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub config: StompConfig,
    /// Seconds to wait for a socket to open, across every failover endpoint
    /// and retry. Distinct from `connected_timeout`: this bounds dialing,
    /// that bounds waiting for CONNECTED once a socket is already open.
    pub connect_timeout: Option<f64>,
    /// Seconds to wait for a CONNECTED reply.
    pub connected_timeout: Option<f64>,
    /// Seconds to wait for a requested receipt.
    pub receipt_timeout: Option<f64>,
    /// Seconds to wait for in-flight message handlers to drain during disconnect.
    pub disconnect_timeout: Option<f64>,
    pub heartbeat_thresholds: HeartbeatThresholds,
}

impl ClientOptions {
    pub fn new(config: StompConfig) -> Self {
        ClientOptions {
            config,
            connect_timeout: None,
            connected_timeout: None,
            receipt_timeout: None,
            disconnect_timeout: None,
            heartbeat_thresholds: HeartbeatThresholds::default(),
        }
    }
}
