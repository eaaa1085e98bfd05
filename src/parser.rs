//! Streaming byte-to-frame decoder.
//!
//! A four-state character pump (`heart-beat` → `command` → `headers` →
//! `body` → back to `heart-beat`), re-architected from the source's
//! per-character dispatch-through-a-callable-slot into an explicit state
//! tag and a `step` function, so the parser is a pure value transformer
//! usable under any IO model (spec.md §9).

use std::collections::VecDeque;

use crate::error::{Result, StompError};
use crate::frame::{Frame, Transmission};
use crate::spec::{self, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HeartBeat,
    Command,
    Headers,
    Body,
}

/// Streaming STOMP frame decoder. Feed it bytes as they arrive off the
/// wire; drain completed frames (and heart-beat ticks) with `get`.
#[derive(Debug)]
pub struct Parser {
    version: Version,
    state: State,
    buffer: Vec<u8>,
    frame: Frame,
    /// Expected body length from `content-length`, or -1 for "until delimiter".
    length: i64,
    read: i64,
    queue: VecDeque<Transmission>,
}

impl Parser {
    pub fn new(version: Version) -> Self {
        let mut parser = Parser {
            version,
            state: State::HeartBeat,
            buffer: Vec::new(),
            frame: Frame::new(""),
            length: -1,
            read: 0,
            queue: VecDeque::new(),
        };
        parser.reset();
        parser
    }

    /// Switch the version used for heart-beat tolerance and command-set
    /// validation, e.g. once a connection negotiates past 1.0.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Whether a decoded frame or heart-beat is available via `get`.
    pub fn can_read(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pop the next decoded transmission, if any, in arrival order.
    pub fn get(&mut self) -> Option<Transmission> {
        self.queue.pop_front()
    }

    /// Reset all internal state, including any queued but unread transmissions.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.start_next_frame();
    }

    fn start_next_frame(&mut self) {
        self.frame = Frame::new("");
        self.length = -1;
        self.read = 0;
        self.state = State::HeartBeat;
        self.buffer.clear();
    }

    /// Feed a chunk of wire bytes into the decoder.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        for &byte in data {
            self.feed(byte)?;
        }
        Ok(())
    }

    fn feed(&mut self, byte: u8) -> Result<()> {
        let mut pending = Some(byte);
        while let Some(b) = pending.take() {
            pending = self.step(b)?;
        }
        Ok(())
    }

    /// Advance the state machine by one byte. Returns `Some(byte)` when the
    /// same byte must be re-fed into the new state (the heart-beat →
    /// command transition on a non-delimiter character).
    fn step(&mut self, byte: u8) -> Result<Option<u8>> {
        match self.state {
            State::HeartBeat => {
                if byte != spec::LINE_DELIMITER {
                    self.state = State::Command;
                    self.buffer.clear();
                    return Ok(Some(byte));
                }
                if self.version != Version::V1_0 {
                    self.queue.push_back(Transmission::HeartBeat);
                }
                Ok(None)
            }
            State::Command => {
                if byte != spec::LINE_DELIMITER {
                    self.buffer.push(byte);
                    return Ok(None);
                }
                if self.buffer.is_empty() {
                    // Tolerate a stray newline before the command line.
                    return Ok(None);
                }
                let command = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                if !spec::known_commands(self.version).contains(command.as_str()) {
                    return Err(StompError::invalid_frame(format!("invalid command: {command:?}")));
                }
                self.frame.command = command;
                self.state = State::Headers;
                Ok(None)
            }
            State::Headers => {
                if byte != spec::LINE_DELIMITER {
                    self.buffer.push(byte);
                    return Ok(None);
                }
                if self.buffer.is_empty() {
                    self.length = self
                        .frame
                        .headers
                        .get(spec::CONTENT_LENGTH_HEADER)
                        .map(|v| {
                            v.trim()
                                .parse::<i64>()
                                .map_err(|_| StompError::invalid_frame(format!("malformed content-length: {v:?}")))
                        })
                        .transpose()?
                        .unwrap_or(-1);
                    self.read = 0;
                    self.state = State::Body;
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                match line.find(spec::HEADER_SEPARATOR as char) {
                    Some(idx) => {
                        let name = line[..idx].to_string();
                        let value = line[idx + 1..].to_string();
                        self.frame.headers.set(name, value);
                        Ok(None)
                    }
                    None => Err(StompError::invalid_frame(format!("no separator in header line: {line:?}"))),
                }
            }
            State::Body => {
                self.read += 1;
                if self.read <= self.length || byte != spec::FRAME_DELIMITER {
                    self.buffer.push(byte);
                    return Ok(None);
                }
                let mut completed = Frame::new("");
                std::mem::swap(&mut completed, &mut self.frame);
                completed.body = std::mem::take(&mut self.buffer);
                self.queue.push_back(Transmission::Frame(completed));
                self.start_next_frame();
                Ok(None)
            }
        }
    }
}
