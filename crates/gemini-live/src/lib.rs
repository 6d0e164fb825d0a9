//! Gemini Live session client.
//!
//! A client-side session manager for the bidirectional BidiGenerateContent
//! protocol. A caller opens one persistent duplex connection, the client
//! performs the setup handshake, and from then on text, audio and image input
//! can be streamed while text and audio output plus token usage arrive through
//! callbacks.
//!
//! - `client`: connection lifecycle, handshake, outbound sends, inbound dispatch.
//! - `decoder`: classification of inbound frames.
//! - `usage`: token accounting for the current connection.
//! - `protocol`: serde schemas for every frame kind.
//! - `transport`: the duplex connection seam and its WebSocket implementation.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod usage;

pub use client::{ConnectionState, SessionCallbacks, SessionClient};
pub use config::SessionConfig;
pub use decoder::{DecodedMessage, MessageKind, decode};
pub use error::{SessionError, TransportError};
pub use protocol::ResponseModality;
pub use transport::{Transport, WebSocketTransport};
pub use usage::{UsageAccumulator, UsageTotals};
