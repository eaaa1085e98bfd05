//! Constants for the STOMP wire protocol, versions 1.0 and 1.1.
//!
//! Ported from `stompest.protocol.spec.StompSpec`: command names, header
//! names, ack modes, delimiters, and the per-version command sets the
//! parser and command builders validate against.

use std::collections::HashSet;

/// A STOMP protocol version this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V1_0,
    V1_1,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::V1_0 => "1.0",
            Version::V1_1 => "1.1",
        }
    }

    pub fn parse(s: &str) -> Option<Version> {
        match s {
            "1.0" => Some(Version::V1_0),
            "1.1" => Some(Version::V1_1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_VERSION: Version = Version::V1_0;

pub const LINE_DELIMITER: u8 = b'\n';
pub const FRAME_DELIMITER: u8 = 0;
pub const HEADER_SEPARATOR: u8 = b':';
pub const HEART_BEAT_SEPARATOR: char = ',';

pub const ABORT: &str = "ABORT";
pub const ACK: &str = "ACK";
pub const BEGIN: &str = "BEGIN";
pub const COMMIT: &str = "COMMIT";
pub const CONNECT: &str = "CONNECT";
pub const DISCONNECT: &str = "DISCONNECT";
pub const NACK: &str = "NACK";
pub const SEND: &str = "SEND";
pub const STOMP: &str = "STOMP";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";

pub const CONNECTED: &str = "CONNECTED";
pub const ERROR: &str = "ERROR";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";

pub const ACCEPT_VERSION_HEADER: &str = "accept-version";
pub const ACK_HEADER: &str = "ack";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const DESTINATION_HEADER: &str = "destination";
pub const HEART_BEAT_HEADER: &str = "heart-beat";
pub const HOST_HEADER: &str = "host";
pub const ID_HEADER: &str = "id";
pub const LOGIN_HEADER: &str = "login";
pub const MESSAGE_ID_HEADER: &str = "message-id";
pub const PASSCODE_HEADER: &str = "passcode";
pub const RECEIPT_HEADER: &str = "receipt";
pub const RECEIPT_ID_HEADER: &str = "receipt-id";
pub const SESSION_HEADER: &str = "session";
pub const SERVER_HEADER: &str = "server";
pub const SUBSCRIPTION_HEADER: &str = "subscription";
pub const TRANSACTION_HEADER: &str = "transaction";
pub const VERSION_HEADER: &str = "version";
pub const MESSAGE_FAILED_HEADER: &str = "message-failed";

pub const ACK_AUTO: &str = "auto";
pub const ACK_CLIENT: &str = "client";
pub const ACK_CLIENT_INDIVIDUAL: &str = "client-individual";

pub fn client_ack_modes() -> HashSet<&'static str> {
    [ACK_CLIENT, ACK_CLIENT_INDIVIDUAL].into_iter().collect()
}

/// Commands a client may legally send for `version`.
pub fn client_commands(version: Version) -> HashSet<&'static str> {
    let mut commands: HashSet<&'static str> =
        [ABORT, ACK, BEGIN, COMMIT, CONNECT, DISCONNECT, SEND, SUBSCRIBE, UNSUBSCRIBE]
            .into_iter()
            .collect();
    if version == Version::V1_1 {
        commands.insert(NACK);
        commands.insert(STOMP);
    }
    commands
}

/// Commands a broker may legally send for `version`.
pub fn server_commands(_version: Version) -> HashSet<&'static str> {
    [CONNECTED, ERROR, MESSAGE, RECEIPT].into_iter().collect()
}

/// Union of client and server commands for `version` — what the parser
/// accepts on the wire regardless of direction.
pub fn known_commands(version: Version) -> HashSet<&'static str> {
    let mut commands = client_commands(version);
    commands.extend(server_commands(version));
    commands
}
