//! Pure per-version frame constructors and validators.
//!
//! Ported case-for-case from `stompest.protocol.commands` (grounded in
//! `commands_test.py`): build/validate outbound frames, interpret server
//! frames. Nothing here touches connection state — that's `Session`'s job.

use std::collections::HashSet;

use crate::error::{Result, StompError};
use crate::frame::{Frame, Headers};
use crate::spec::{self, Version};

/// Inputs to `connect`/`stomp`. All fields optional, mirroring the source's
/// keyword-argument constructor.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions<'a> {
    pub login: Option<&'a str>,
    pub passcode: Option<&'a str>,
    pub extra_headers: Option<&'a Headers>,
    pub versions: Option<&'a [Version]>,
    pub host: Option<&'a str>,
    /// (client, server) heart-beat periods in milliseconds. Negative
    /// values are rejected; the source's additional "not a pair" failure
    /// mode can't occur here since the type is already a pair.
    pub heart_beats: Option<(i64, i64)>,
}

fn negotiating_1_1(versions: Option<&[Version]>) -> bool {
    versions.is_some_and(|vs| vs.iter().any(|v| *v != Version::V1_0))
}

fn build_connect(opts: &ConnectOptions, command: &str) -> Result<Frame> {
    let mut headers = Headers::new();
    if let Some(login) = opts.login {
        headers.set(spec::LOGIN_HEADER, login);
    }
    if let Some(passcode) = opts.passcode {
        headers.set(spec::PASSCODE_HEADER, passcode);
    }
    if let Some(extra) = opts.extra_headers {
        for (name, value) in extra.iter() {
            headers.set(name, value);
        }
    }
    if negotiating_1_1(opts.versions) {
        let accept_version = opts
            .versions
            .unwrap()
            .iter()
            .map(Version::as_str)
            .collect::<Vec<_>>()
            .join(",");
        headers.replace(spec::ACCEPT_VERSION_HEADER, accept_version);
        headers.set(spec::HOST_HEADER, opts.host.unwrap_or("localhost"));
        if let Some(host) = opts.host {
            headers.replace(spec::HOST_HEADER, host);
        }
        if let Some((client, server)) = opts.heart_beats {
            if client < 0 || server < 0 {
                return Err(StompError::protocol("heart-beat values must be non-negative"));
            }
            headers.replace(spec::HEART_BEAT_HEADER, format!("{client},{server}"));
        }
    }
    Ok(Frame::with_headers(command, headers))
}

/// Build a CONNECT frame.
pub fn connect(opts: &ConnectOptions) -> Result<Frame> {
    build_connect(opts, spec::CONNECT)
}

/// Build a STOMP frame (the 1.1 alias for CONNECT). Only legal when `1.1`
/// is among the caller's accepted `versions`.
pub fn stomp(opts: &ConnectOptions) -> Result<Frame> {
    let accepts_1_1 = opts.versions.is_some_and(|vs| vs.contains(&Version::V1_1));
    if !accepts_1_1 {
        return Err(StompError::protocol("STOMP command requires version 1.1 to be accepted"));
    }
    build_connect(opts, spec::STOMP)
}

fn parse_heart_beat(value: &str) -> Result<(u64, u64)> {
    let parts: Vec<&str> = value.split(spec::HEART_BEAT_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(StompError::protocol(format!("malformed heart-beat header: {value:?}")));
    }
    let client = parts[0]
        .parse::<i64>()
        .map_err(|_| StompError::protocol(format!("malformed heart-beat header: {value:?}")))?;
    let server = parts[1]
        .parse::<i64>()
        .map_err(|_| StompError::protocol(format!("malformed heart-beat header: {value:?}")))?;
    if client < 0 || server < 0 {
        return Err(StompError::protocol(format!("heart-beat values must be non-negative: {value:?}")));
    }
    Ok((client as u64, server as u64))
}

/// Interpret an inbound CONNECTED frame: `(version, server, session, (client_hb, server_hb))`.
pub fn connected(
    frame: &Frame,
    versions: Option<&[Version]>,
) -> Result<(Version, Option<String>, Option<String>, (u64, u64))> {
    if frame.command != spec::CONNECTED {
        return Err(StompError::protocol(format!("expected CONNECTED, got {}", frame.command)));
    }
    let version = match frame.headers.get(spec::VERSION_HEADER) {
        Some(v) => Version::parse(v).ok_or_else(|| StompError::protocol(format!("unsupported version: {v:?}")))?,
        None => Version::V1_0,
    };
    if let Some(accepted) = versions {
        if !accepted.contains(&version) {
            return Err(StompError::protocol(format!(
                "broker negotiated version {version} which is not among {accepted:?}"
            )));
        }
    }
    let server = frame.headers.get(spec::SERVER_HEADER).map(String::from);
    let session = frame.headers.get(spec::SESSION_HEADER).map(String::from);
    let heart_beats = if version == Version::V1_0 {
        (0, 0)
    } else {
        match frame.headers.get(spec::HEART_BEAT_HEADER) {
            Some(raw) => parse_heart_beat(raw)?,
            None => (0, 0),
        }
    };
    Ok((version, server, session, heart_beats))
}

/// Build a SEND frame.
pub fn send(destination: &str, body: &[u8], headers: Option<&Headers>, receipt: Option<&str>) -> Frame {
    let mut out = Headers::new();
    out.set(spec::DESTINATION_HEADER, destination);
    if let Some(extra) = headers {
        for (name, value) in extra.iter() {
            out.set(name, value);
        }
    }
    if let Some(receipt) = receipt {
        out.replace(spec::RECEIPT_HEADER, receipt);
    }
    Frame::with_headers(spec::SEND, out).with_body(body.to_vec())
}

/// Build a SUBSCRIBE frame. `id` is the caller/session-chosen subscription id.
pub fn subscribe(destination: &str, headers: Option<&Headers>, receipt: Option<&str>, id: Option<&str>) -> Frame {
    let mut out = Headers::new();
    out.set(spec::DESTINATION_HEADER, destination);
    if let Some(extra) = headers {
        for (name, value) in extra.iter() {
            out.set(name, value);
        }
    }
    if let Some(id) = id {
        out.replace(spec::ID_HEADER, id);
    }
    if let Some(receipt) = receipt {
        out.replace(spec::RECEIPT_HEADER, receipt);
    }
    Frame::with_headers(spec::SUBSCRIBE, out)
}

/// Build an UNSUBSCRIBE frame for the given subscription id.
pub fn unsubscribe(id: &str, receipt: Option<&str>) -> Frame {
    let mut headers = Headers::new();
    headers.set(spec::ID_HEADER, id);
    if let Some(receipt) = receipt {
        headers.replace(spec::RECEIPT_HEADER, receipt);
    }
    Frame::with_headers(spec::UNSUBSCRIBE, headers)
}

fn ack_or_nack(
    command: &str,
    frame: &Frame,
    transactions: &HashSet<String>,
    receipt: Option<&str>,
    version: Version,
) -> Result<Frame> {
    if frame.command != spec::MESSAGE {
        return Err(StompError::protocol(format!("expected MESSAGE, got {}", frame.command)));
    }
    if command == spec::NACK && version != Version::V1_1 {
        return Err(StompError::protocol("NACK requires version 1.1"));
    }
    let message_id = frame
        .headers
        .get(spec::MESSAGE_ID_HEADER)
        .ok_or_else(|| StompError::protocol("MESSAGE frame is missing the message-id header"))?;
    let subscription = frame.headers.get(spec::SUBSCRIPTION_HEADER);
    if version == Version::V1_1 && subscription.is_none() {
        return Err(StompError::protocol("MESSAGE frame is missing the subscription header required by 1.1"));
    }
    let mut headers = Headers::new();
    headers.set(spec::MESSAGE_ID_HEADER, message_id);
    if let Some(subscription) = subscription {
        headers.set(spec::SUBSCRIPTION_HEADER, subscription);
    }
    if let Some(transaction) = frame.headers.get(spec::TRANSACTION_HEADER) {
        if transactions.contains(transaction) {
            headers.set(spec::TRANSACTION_HEADER, transaction);
        }
    }
    if let Some(receipt) = receipt {
        headers.replace(spec::RECEIPT_HEADER, receipt);
    }
    Ok(Frame::with_headers(command, headers))
}

/// Build an ACK frame for a received MESSAGE. `transaction` is stripped
/// unless it names an entry in `transactions`.
pub fn ack(frame: &Frame, transactions: &HashSet<String>, receipt: Option<&str>, version: Version) -> Result<Frame> {
    ack_or_nack(spec::ACK, frame, transactions, receipt, version)
}

/// Build a NACK frame. Only legal for version 1.1.
pub fn nack(frame: &Frame, transactions: &HashSet<String>, receipt: Option<&str>, version: Version) -> Result<Frame> {
    ack_or_nack(spec::NACK, frame, transactions, receipt, version)
}

/// Build a BEGIN frame.
pub fn begin(transaction: &str, receipt: Option<&str>) -> Frame {
    transaction_frame(spec::BEGIN, transaction, receipt)
}

/// Build a COMMIT frame.
pub fn commit(transaction: &str, receipt: Option<&str>) -> Frame {
    transaction_frame(spec::COMMIT, transaction, receipt)
}

/// Build an ABORT frame.
pub fn abort(transaction: &str, receipt: Option<&str>) -> Frame {
    transaction_frame(spec::ABORT, transaction, receipt)
}

fn transaction_frame(command: &str, transaction: &str, receipt: Option<&str>) -> Frame {
    let mut headers = Headers::new();
    headers.set(spec::TRANSACTION_HEADER, transaction);
    if let Some(receipt) = receipt {
        headers.replace(spec::RECEIPT_HEADER, receipt);
    }
    Frame::with_headers(command, headers)
}

/// Build a DISCONNECT frame.
pub fn disconnect(receipt: Option<&str>) -> Frame {
    let mut headers = Headers::new();
    if let Some(receipt) = receipt {
        headers.set(spec::RECEIPT_HEADER, receipt);
    }
    Frame::with_headers(spec::DISCONNECT, headers)
}

/// Validate an inbound RECEIPT frame and return its `receipt-id`.
pub fn receipt(frame: &Frame) -> Result<String> {
    if frame.command != spec::RECEIPT {
        return Err(StompError::protocol(format!("expected RECEIPT, got {}", frame.command)));
    }
    frame
        .headers
        .get(spec::RECEIPT_ID_HEADER)
        .map(String::from)
        .ok_or_else(|| StompError::protocol("RECEIPT frame is missing the receipt-id header"))
}

/// Validate an inbound MESSAGE frame's required headers for `version`.
pub fn validate_message(frame: &Frame, version: Version) -> Result<()> {
    if frame.command != spec::MESSAGE {
        return Err(StompError::protocol(format!("expected MESSAGE, got {}", frame.command)));
    }
    if frame.headers.get(spec::MESSAGE_ID_HEADER).is_none() {
        return Err(StompError::protocol("MESSAGE frame is missing the message-id header"));
    }
    if version == Version::V1_1 && frame.headers.get(spec::SUBSCRIPTION_HEADER).is_none() {
        return Err(StompError::protocol("MESSAGE frame is missing the subscription header required by 1.1"));
    }
    Ok(())
}
