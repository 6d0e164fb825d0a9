//! Per-connection relay between a client socket and the upstream Live API.

use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{
            HeaderValue,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
        protocol::Message as UpstreamMessage,
    },
};
use tracing::{debug, error, info, instrument, warn};

/// Close reason sent to the client when no access token could be obtained.
pub const AUTH_FAILURE_REASON: &str = "Server authentication error";
/// Close reason sent to the client when the upstream connection fails.
pub const INTERNAL_FAILURE_REASON: &str = "Internal server error";

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "relay", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New client connection.");

    let token = match state.token_source.access_token().await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Could not obtain an access token.");
            close_with_error(socket, AUTH_FAILURE_REASON).await;
            return;
        }
    };

    let upstream = match connect_upstream(&state.config.service_url, &token).await {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(error = ?e, "Could not reach the upstream service.");
            close_with_error(socket, INTERNAL_FAILURE_REASON).await;
            return;
        }
    };
    info!(service_url = %state.config.service_url, "Upstream connection established.");

    if let Err(e) = relay(socket, upstream).await {
        warn!(error = ?e, "Relay stopped on a send failure.");
    }
    info!("Client connection finished.");
}

/// Opens the upstream socket with the bearer token in the handshake headers.
pub async fn connect_upstream(url: &str, token: &SecretString) -> Result<UpstreamSocket> {
    let mut request = url.into_client_request().context("Invalid upstream URL")?;
    let headers = request.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        format!("Bearer {}", token.expose_secret())
            .parse()
            .context("Access token is not a valid header value")?,
    );

    let (upstream, _) = connect_async(request)
        .await
        .context("Failed to connect to the upstream service")?;
    Ok(upstream)
}

async fn close_with_error(mut socket: WebSocket, reason: &str) {
    let frame = CloseFrame {
        code: close_code::ERROR,
        reason: reason.to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Client went away before the close frame was sent.");
    }
}

/// Re-serialises a frame payload as compact JSON text.
///
/// Returns `None`, after logging, for anything that is not JSON; such frames
/// are dropped instead of ending the relay.
pub fn relay_payload(raw: &[u8]) -> Option<String> {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => Some(value.to_string()),
        Err(e) => {
            warn!(error = %e, bytes = raw.len(), "Dropping frame that is not valid JSON.");
            None
        }
    }
}

/// Which side of the relay went away first.
enum Ended {
    Client,
    Upstream,
}

/// Pumps frames in both directions until either side goes away, then closes
/// the other side.
async fn relay(socket: WebSocket, upstream: UpstreamSocket) -> Result<()> {
    let (mut client_tx, mut client_rx) = socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let ended = loop {
        tokio::select! {
            msg = client_rx.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => relay_payload(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(data))) => relay_payload(&data),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => None,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed the connection.");
                        break Ended::Client;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Client socket error.");
                        break Ended::Client;
                    }
                };
                if let Some(json) = payload {
                    debug!(bytes = json.len(), "client -> upstream");
                    upstream_tx.send(UpstreamMessage::Text(json.into())).await?;
                }
            },
            msg = upstream_rx.next() => {
                let payload = match msg {
                    Some(Ok(UpstreamMessage::Text(text))) => {
                        relay_payload(text.as_str().as_bytes())
                    }
                    Some(Ok(UpstreamMessage::Binary(data))) => relay_payload(&data),
                    Some(Ok(UpstreamMessage::Close(frame))) => {
                        info!(?frame, "Upstream closed the connection.");
                        break Ended::Upstream;
                    }
                    Some(Ok(_)) => None,
                    None => {
                        info!("Upstream stream ended.");
                        break Ended::Upstream;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Upstream socket error.");
                        break Ended::Upstream;
                    }
                };
                if let Some(json) = payload {
                    debug!(bytes = json.len(), "upstream -> client");
                    client_tx.send(Message::Text(json.into())).await?;
                }
            },
        }
    };

    match ended {
        Ended::Client => {
            if let Err(e) = upstream_tx.close().await {
                debug!(error = %e, "Upstream already gone.");
            }
        }
        Ended::Upstream => {
            if let Err(e) = client_tx.close().await {
                debug!(error = %e, "Client already gone.");
            }
        }
    }
    Ok(())
}
