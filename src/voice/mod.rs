//! Voice-channel attachment and frame-paced audio delivery.
//!
//! The platform session library (gateway handshake, voice websocket, frame
//! transport) sits behind the [`session::VoiceSession`] /
//! [`session::VoiceConnection`] traits; [`manager::VoiceManager`] owns
//! everything on this side of that boundary: join with bounded retries,
//! readiness polling, opus encoding, 20 ms pacing, and cancellation.

pub mod manager;
pub mod session;

pub use manager::{VoiceManager, VoiceTiming};
pub use session::{VoiceConnection, VoiceError, VoiceSession};
