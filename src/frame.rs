//! In-memory representation of a STOMP frame.

use std::fmt;

use crate::spec;

/// An ordered header multimap with first-occurrence-wins insert semantics.
///
/// Insertion order is preserved (needed to serialize a frame back onto the
/// wire deterministically); a second `set` for a name that is already
/// present is a no-op, matching STOMP 1.1's "the first header entry wins"
/// rule for duplicate headers received on the wire.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl PartialEq for Headers {
    /// Headers compare as an unordered set of (name, value) pairs: order
    /// only matters for wire serialization, not for structural equality.
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(k, v)| other.get(k) == Some(v.as_str()))
    }
}

impl Eq for Headers {}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Insert `name: value`, keeping the first value if `name` is already set.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.entries.iter().any(|(n, _)| *n == name) {
            self.entries.push((name, value.into()));
        }
        self
    }

    /// Insert `name: value`, overwriting any existing value for `name`.
    ///
    /// Used by command builders constructing outbound frames, where "last
    /// write wins" reflects explicit caller intent rather than wire-level
    /// duplicate resolution.
    pub fn replace(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value.into();
        } else {
            self.entries.push((name, value.into()));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        if let Some(pos) = self.entries.iter().position(|(n, _)| n == name) {
            Some(self.entries.remove(pos).1)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(k, v);
        }
        headers
    }
}

/// A discrete STOMP message: command, headers, and body. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Frame { command: command.into(), headers: Headers::new(), body: Vec::new() }
    }

    pub fn with_headers(command: impl Into<String>, headers: Headers) -> Self {
        Frame { command: command.into(), headers, body: Vec::new() }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize this frame onto the wire, per §6 of the protocol contract.
    ///
    /// `content-length` is added automatically whenever the body is
    /// non-empty, so that NUL bytes inside the body round-trip correctly.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(spec::LINE_DELIMITER);
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.push(spec::HEADER_SEPARATOR);
            out.extend_from_slice(value.as_bytes());
            out.push(spec::LINE_DELIMITER);
        }
        if !self.body.is_empty() && !self.headers.contains(spec::CONTENT_LENGTH_HEADER) {
            out.extend_from_slice(spec::CONTENT_LENGTH_HEADER.as_bytes());
            out.push(spec::HEADER_SEPARATOR);
            out.extend_from_slice(self.body.len().to_string().as_bytes());
            out.push(spec::LINE_DELIMITER);
        }
        out.push(spec::LINE_DELIMITER);
        out.extend_from_slice(&self.body);
        out.push(spec::FRAME_DELIMITER);
        out
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{command={}, headers=[", self.command)?;
        for (i, (name, value)) in self.headers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}:{value}")?;
        }
        write!(f, "], body={}}}", self.body_str())
    }
}

/// A single outbound heart-beat byte (`\n`), built by `Session::beat`.
pub fn heart_beat_bytes() -> Vec<u8> {
    vec![spec::LINE_DELIMITER]
}

/// One decoded unit handed back by the parser: either a complete frame, or
/// a heart-beat tick. Kept as one enum (not two separate queues) so the
/// parser's FIFO can interleave them in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    Frame(Frame),
    HeartBeat,
}
