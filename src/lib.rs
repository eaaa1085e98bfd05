//! A client-side implementation of STOMP, versions 1.0 and 1.1.
//!
//! The crate is layered bottom-up: [`frame`] and [`parser`] turn bytes
//! into [`frame::Frame`]s and back; [`commands`] builds/validates
//! individual frames; [`session`] sequences them into a connection
//! lifecycle; [`client`] drives all of that over a [`transport::Transport`]
//! on a background task. Most applications only need [`client::Client`],
//! [`config::ClientOptions`], and [`config::StompConfig`].

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod failover;
pub mod frame;
pub mod parser;
pub mod session;
pub mod spec;
pub mod transport;

pub use client::{BoxFuture, Client, MessageFailedHook, MessageHandler, SubscribeOptions};
pub use config::{ClientOptions, HeartbeatThresholds, StompConfig};
pub use error::{Result, StompError};
pub use frame::{Frame, Headers};
pub use session::SubscriptionToken;
pub use spec::Version;
