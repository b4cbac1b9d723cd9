//! Client runtime for live remote command sessions.
//!
//! Provides:
//! - [`SessionClient`]: select a session, submit messages, follow the feed
//! - [`ClientConfig`]: reconnect, heartbeat and handshake tuning
//! - An engine task translating server envelopes into transcript entries

pub mod client;
pub mod config;

mod engine;
mod link;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientError, SessionClient};
pub use config::ClientConfig;
pub use engine::SubmitError;
