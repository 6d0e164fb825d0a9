//! Opening the duplex connection a session runs over.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::pin::Pin;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};
use tracing::{debug, info};

/// Outbound half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
/// Inbound half of an open connection, in delivery order.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Opens ordered, reliable duplex connections.
///
/// The session client only ever talks to this trait, which keeps the
/// protocol logic independent of how bytes reach the service.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(
        &self,
        url: &str,
        access_token: &SecretString,
    ) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// The default transport: a WebSocket via `tokio-tungstenite`.
///
/// A non-empty access token is sent as a bearer `Authorization` header, so
/// the client can also talk to the service without a relay.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        url: &str,
        access_token: &SecretString,
    ) -> Result<(FrameSink, FrameStream), TransportError> {
        let mut request = url.into_client_request()?;
        let token = access_token.expose_secret();
        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, response) = connect_async(request).await?;
        info!(%url, "WebSocket connection established.");
        debug!(status = %response.status(), "Upgrade response received.");

        let (sink, stream) = ws_stream.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
