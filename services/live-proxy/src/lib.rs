//! WebSocket relay between local Live API clients and the Vertex AI endpoint.
//!
//! Browsers and terminal clients cannot attach an `Authorization` header to a
//! WebSocket handshake, so each client connection is paired with an upstream
//! connection opened here with a freshly obtained bearer token. Frames are
//! passed through as JSON text in both directions.

pub mod config;
pub mod relay;
pub mod router;
pub mod state;
pub mod token;
