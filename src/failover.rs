//! Failover connection URI parsing.
//!
//! Supported syntaxes:
//! - Plain: `tcp://host:port`
//! - Failover: `failover:(tcp://h1:p1,tcp://h2:p2,...)?opt=val&opt=val`
//!
//! Recognised query options: `initialReconnectDelay`, `maxReconnectDelay`,
//! `useExponentialBackOff`, `maxReconnectAttempts`, `randomize` (all
//! optional; defaults below).

use rand::seq::SliceRandom;

use crate::error::{Result, StompError};

/// One broker endpoint in a failover list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Reconnect policy parsed out of a failover URI's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub use_exponential_back_off: bool,
    /// -1 (encoded as `None`) means unlimited.
    pub max_attempts: Option<u64>,
    pub randomize: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay_ms: 10,
            max_delay_ms: 30_000,
            use_exponential_back_off: true,
            max_attempts: None,
            randomize: false,
        }
    }
}

/// A resolved, repeatable attempt sequence: endpoints plus the delay to
/// apply before each one (round-robin, optionally shuffled, with
/// exponential back-off between full cycles through the endpoint list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverTarget {
    pub endpoints: Vec<Endpoint>,
    pub policy: ReconnectPolicy,
}

/// Parse `tcp://host:port` or `failover:(...)?opts` into a [`FailoverTarget`].
pub fn parse(uri: &str) -> Result<FailoverTarget> {
    if let Some(rest) = uri.strip_prefix("failover:(") {
        let close = rest
            .find(')')
            .ok_or_else(|| StompError::protocol(format!("malformed failover URI, missing ')': {uri:?}")))?;
        let endpoint_list = &rest[..close];
        let query = rest[close + 1..].strip_prefix('?').unwrap_or("");

        let endpoints = endpoint_list
            .split(',')
            .map(parse_tcp_endpoint)
            .collect::<Result<Vec<_>>>()?;
        if endpoints.is_empty() {
            return Err(StompError::protocol(format!("failover URI lists no endpoints: {uri:?}")));
        }
        let policy = parse_policy(query)?;
        Ok(FailoverTarget { endpoints, policy })
    } else if uri.starts_with("tcp://") {
        let endpoint = parse_tcp_endpoint(uri)?;
        Ok(FailoverTarget {
            endpoints: vec![endpoint],
            policy: ReconnectPolicy { initial_delay_ms: 0, max_delay_ms: 0, use_exponential_back_off: false, max_attempts: Some(1), randomize: false },
        })
    } else {
        Err(StompError::protocol(format!("unrecognised connection URI: {uri:?}")))
    }
}

fn parse_tcp_endpoint(part: &str) -> Result<Endpoint> {
    let part = part.trim();
    let rest = part
        .strip_prefix("tcp://")
        .ok_or_else(|| StompError::protocol(format!("expected tcp:// endpoint, got {part:?}")))?;
    let colon = rest
        .rfind(':')
        .ok_or_else(|| StompError::protocol(format!("endpoint missing port: {part:?}")))?;
    let host = &rest[..colon];
    let port_str = &rest[colon + 1..];
    if host.is_empty() {
        return Err(StompError::protocol(format!("endpoint missing host: {part:?}")));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| StompError::protocol(format!("invalid port {port_str:?} in endpoint {part:?}")))?;
    Ok(Endpoint { host: host.to_string(), port })
}

fn parse_policy(query: &str) -> Result<ReconnectPolicy> {
    let mut policy = ReconnectPolicy::default();
    if query.is_empty() {
        return Ok(policy);
    }
    for pair in query.split('&') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| StompError::protocol(format!("malformed query option: {pair:?}")))?;
        match key {
            "initialReconnectDelay" => {
                policy.initial_delay_ms = value.parse().map_err(|_| StompError::protocol(format!("invalid initialReconnectDelay: {value:?}")))?;
            }
            "maxReconnectDelay" => {
                policy.max_delay_ms = value.parse().map_err(|_| StompError::protocol(format!("invalid maxReconnectDelay: {value:?}")))?;
            }
            "useExponentialBackOff" => {
                policy.use_exponential_back_off = parse_bool(value)?;
            }
            "maxReconnectAttempts" => {
                let n: i64 = value.parse().map_err(|_| StompError::protocol(format!("invalid maxReconnectAttempts: {value:?}")))?;
                policy.max_attempts = if n < 0 { None } else { Some(n as u64) };
            }
            "randomize" => {
                policy.randomize = parse_bool(value)?;
            }
            _ => return Err(StompError::protocol(format!("unrecognised failover option: {key:?}"))),
        }
    }
    Ok(policy)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(StompError::protocol(format!("expected boolean, got {value:?}"))),
    }
}

/// An iterator over `(endpoint, delay_ms)` attempts, cycling the endpoint
/// list (optionally shuffled, reshuffled once per full cycle) and applying
/// exponential back-off (bounded by `max_delay_ms`) once every endpoint in
/// a cycle has been tried. Stops after `policy.max_attempts` attempts, if
/// set.
pub struct Attempts<'a> {
    target: &'a FailoverTarget,
    attempt: u64,
    cycle_delay_ms: u64,
    order: Vec<usize>,
}

impl<'a> Attempts<'a> {
    pub fn new(target: &'a FailoverTarget) -> Self {
        let mut order: Vec<usize> = (0..target.endpoints.len()).collect();
        if target.policy.randomize {
            order.shuffle(&mut rand::thread_rng());
        }
        Attempts { target, attempt: 0, cycle_delay_ms: target.policy.initial_delay_ms, order }
    }
}

impl<'a> Iterator for Attempts<'a> {
    type Item = (Endpoint, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(max) = self.target.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }
        let cycle_len = self.target.endpoints.len() as u64;
        let index = self.order[(self.attempt % cycle_len) as usize];
        let delay = if self.attempt == 0 { 0 } else { self.cycle_delay_ms };
        let endpoint = self.target.endpoints[index].clone();
        self.attempt += 1;
        if self.attempt % cycle_len == 0 {
            if self.target.policy.use_exponential_back_off {
                self.cycle_delay_ms = (self.cycle_delay_ms * 2).min(self.target.policy.max_delay_ms.max(1));
            }
            if self.target.policy.randomize {
                self.order.shuffle(&mut rand::thread_rng());
            }
        }
        Some((endpoint, delay))
    }
}
