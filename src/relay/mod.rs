//! The ntfy push-notification relay: subscribes to topics on an ntfy server
//! and forwards message events to the announcer's speak API.

pub mod client;
pub mod config;

pub use client::{RelayClient, RelayError};
pub use config::RelayConfig;
