use crate::client::ConnectionState;
use tokio_tungstenite::tungstenite;

/// Reasons handed to the error callback. Transport detail is only logged.
pub const CONNECTION_CLOSED: &str = "Connection closed";
pub const CONNECTION_ERROR: &str = "Connection error";

/// Errors returned synchronously to the caller of a `SessionClient` operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Operation requires an open session, current state is {state}")]
    InvalidState { state: ConnectionState },
    #[error("No connection has been established")]
    NotConnected,
    #[error("connect must be called from within a Tokio runtime")]
    NoRuntime,
    #[error("The connection task is no longer running")]
    ConnectionLost,
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures while opening a duplex connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid connection request: {0}")]
    InvalidRequest(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}
