//! The live session client.
//!
//! A `SessionClient` owns at most one connection at a time. `connect` returns
//! immediately and spawns a connection task that opens the transport, sends
//! the setup handshake and then processes inbound frames strictly in arrival
//! order, invoking the installed callbacks from that task. Outbound sends are
//! non-blocking hand-offs to the same task.
//!
//! Every connection attempt gets a new epoch. The task only touches the shared
//! state (and only fires callbacks) while its epoch is current, so a replaced
//! or disconnected connection goes quiet immediately.

use crate::{
    config::SessionConfig,
    decoder::{self, DecodedMessage},
    error::{CONNECTION_CLOSED, CONNECTION_ERROR, SessionError},
    protocol::{ClientFrame, ServerFrame},
    transport::{Transport, WebSocketTransport},
    usage::{UsageAccumulator, UsageTotals},
};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{Instrument, debug, error, info, warn};

pub const AUDIO_MIME_TYPE: &str = "audio/pcm";
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Lifecycle of the client's current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

pub type ResponseCallback = Arc<dyn Fn(DecodedMessage) + Send + Sync>;
pub type StartedCallback = Arc<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Handlers invoked from the connection task. The defaults only trace.
#[derive(Clone)]
pub struct SessionCallbacks {
    pub on_receive_response: ResponseCallback,
    pub on_connection_started: StartedCallback,
    pub on_error_message: ErrorCallback,
}

impl SessionCallbacks {
    pub fn on_receive_response(
        mut self,
        handler: impl Fn(DecodedMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_receive_response = Arc::new(handler);
        self
    }

    pub fn on_connection_started(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connection_started = Arc::new(handler);
        self
    }

    pub fn on_error_message(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error_message = Arc::new(handler);
        self
    }
}

impl Default for SessionCallbacks {
    fn default() -> Self {
        Self {
            on_receive_response: Arc::new(|message: DecodedMessage| {
                debug!(?message, "Response received with no handler installed.")
            }),
            on_connection_started: Arc::new(|| {
                debug!("Connection started with no handler installed.")
            }),
            on_error_message: Arc::new(|reason: &str| {
                debug!(%reason, "Session error with no handler installed.")
            }),
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks").finish_non_exhaustive()
    }
}

/// State shared between the client handle and its connection task.
struct Shared {
    epoch: u64,
    state: ConnectionState,
    usage: UsageAccumulator,
    callbacks: SessionCallbacks,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveConnection {
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// Client for one live session at a time.
pub struct SessionClient<T: Transport = WebSocketTransport> {
    config: SessionConfig,
    access_token: SecretString,
    transport: Arc<T>,
    shared: Arc<Mutex<Shared>>,
    connection: Option<ActiveConnection>,
}

impl SessionClient<WebSocketTransport> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_transport(config, WebSocketTransport)
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        info!(
            endpoint = %config.endpoint,
            model_uri = %config.model_uri(),
            "Created live session client."
        );
        Self {
            config,
            access_token: SecretString::from(String::new()),
            transport: Arc::new(transport),
            shared: Arc::new(Mutex::new(Shared {
                epoch: 0,
                state: ConnectionState::Idle,
                usage: UsageAccumulator::new(),
                callbacks: SessionCallbacks::default(),
            })),
            connection: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Changes the project the model URI is composed from. Takes effect on the next `connect`.
    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        self.config.project_id = project_id.into();
        debug!(model_uri = %self.config.model_uri(), "Project updated.");
    }

    pub fn set_access_token(&mut self, access_token: impl Into<String>) {
        self.access_token = SecretString::from(access_token.into());
    }

    /// Replaces all handlers. May be called at any time, including while connected.
    pub fn set_callbacks(&self, callbacks: SessionCallbacks) {
        lock(&self.shared).callbacks = callbacks;
    }

    pub fn set_on_receive_response(
        &self,
        handler: impl Fn(DecodedMessage) + Send + Sync + 'static,
    ) {
        lock(&self.shared).callbacks.on_receive_response = Arc::new(handler);
    }

    pub fn set_on_connection_started(&self, handler: impl Fn() + Send + Sync + 'static) {
        lock(&self.shared).callbacks.on_connection_started = Arc::new(handler);
    }

    pub fn set_on_error_message(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        lock(&self.shared).callbacks.on_error_message = Arc::new(handler);
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Token totals for the current (or most recent) connection.
    pub fn usage(&self) -> UsageTotals {
        lock(&self.shared).usage.snapshot()
    }

    /// Starts a new connection attempt and returns without waiting for it.
    ///
    /// Any existing connection is released first and stays silent from here
    /// on. Usage totals restart from zero. Completion is reported through
    /// `on_connection_started`, failure through `on_error_message`.
    pub fn connect(&mut self, access_token: impl Into<String>) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        self.set_access_token(access_token);
        let setup_frames = self.setup_frames()?;

        // Bump the epoch before releasing the previous task.
        let (epoch, previous_state) = {
            let mut shared = lock(&self.shared);
            let previous_state = shared.state;
            shared.epoch += 1;
            shared.usage.reset();
            shared.state = ConnectionState::Connecting;
            (shared.epoch, previous_state)
        };
        if let Some(previous) = self.connection.take() {
            debug!(%previous_state, "Replacing the existing connection.");
            if previous_state == ConnectionState::Connecting {
                previous.task.abort();
            }
        }
        info!(epoch, endpoint = %self.config.endpoint, "Connecting.");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = ConnectionTask {
            epoch,
            shared: self.shared.clone(),
            transport: self.transport.clone(),
            endpoint: self.config.endpoint.clone(),
            access_token: SecretString::from(self.access_token.expose_secret().to_owned()),
            setup_frames,
        };
        let span = tracing::info_span!("live_session", epoch);
        let task = runtime.spawn(task.run(outbound_rx).instrument(span));

        self.connection = Some(ActiveConnection { outbound, task });
        Ok(())
    }

    /// Closes the current connection. No callbacks fire for it afterwards.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        let connection = self.connection.take().ok_or(SessionError::NotConnected)?;
        let previous = {
            let mut shared = lock(&self.shared);
            shared.epoch += 1;
            let previous = shared.state;
            if matches!(previous, ConnectionState::Connecting | ConnectionState::Open) {
                shared.state = ConnectionState::Closed;
            }
            previous
        };
        if previous == ConnectionState::Connecting {
            connection.task.abort();
        }
        // Dropping the sender lets the task flush pending frames and close.
        drop(connection.outbound);
        info!(%previous, "Disconnected.");
        Ok(())
    }

    /// Sends a complete single-part user text turn.
    pub fn send_text_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send_frame(&ClientFrame::user_text(text))
    }

    /// Sends one realtime media chunk. Does not complete the turn.
    pub fn send_realtime_input_message(
        &self,
        data: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send_frame(&ClientFrame::media_chunk(data, mime_type))
    }

    /// Sends base64 PCM audio.
    pub fn send_audio_message(&self, data: impl Into<String>) -> Result<(), SessionError> {
        self.send_realtime_input_message(data, AUDIO_MIME_TYPE)
    }

    /// Sends a base64 image, `image/jpeg` unless another type is given.
    pub fn send_image_message(
        &self,
        data: impl Into<String>,
        mime_type: Option<&str>,
    ) -> Result<(), SessionError> {
        self.send_realtime_input_message(data, mime_type.unwrap_or(DEFAULT_IMAGE_MIME_TYPE))
    }

    fn send_frame(&self, frame: &ClientFrame) -> Result<(), SessionError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(SessionError::InvalidState { state });
        }
        let connection = self.connection.as_ref().ok_or(SessionError::NotConnected)?;
        let payload = serde_json::to_string(frame)?;
        debug!(bytes = payload.len(), "Queueing frame.");
        connection
            .outbound
            .send(payload)
            .map_err(|_| SessionError::ConnectionLost)
    }

    fn setup_frames(&self) -> Result<Vec<String>, SessionError> {
        let mut frames = Vec::with_capacity(2);
        if self.config.send_auth_frame {
            let token = self.access_token.expose_secret();
            let bearer = (!token.is_empty()).then(|| token.to_owned());
            frames.push(serde_json::to_string(&self.config.auth_frame(bearer))?);
        }
        frames.push(serde_json::to_string(&self.config.setup_frame())?);
        Ok(frames)
    }
}

impl<T: Transport> Drop for SessionClient<T> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            lock(&self.shared).epoch += 1;
        }
    }
}

/// Drives one connection from open to close.
struct ConnectionTask<T> {
    epoch: u64,
    shared: Arc<Mutex<Shared>>,
    transport: Arc<T>,
    endpoint: String,
    access_token: SecretString,
    setup_frames: Vec<String>,
}

impl<T: Transport> ConnectionTask<T> {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<String>) {
        let opened = self
            .transport
            .open(&self.endpoint, &self.access_token)
            .await;
        let (mut sink, mut stream) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                error!(error = %e, "Failed to open connection.");
                self.terminate(ConnectionState::Error, CONNECTION_ERROR);
                return;
            }
        };

        if !self.is_current() {
            debug!("Connection was superseded while opening.");
            let _ = sink.close().await;
            return;
        }

        for frame in &self.setup_frames {
            if let Err(e) = sink.send(Message::Text(frame.clone().into())).await {
                error!(error = %e, "Failed to send setup frame.");
                self.terminate(ConnectionState::Error, CONNECTION_ERROR);
                return;
            }
        }

        let Some(on_started) = self.mark_open() else {
            debug!("Connection was superseded during setup.");
            let _ = sink.close().await;
            return;
        };
        info!(frames = self.setup_frames.len(), "Setup sent, session is open.");
        on_started();

        loop {
            tokio::select! {
                command = outbound.recv() => match command {
                    Some(payload) => {
                        if let Err(e) = sink.send(Message::Text(payload.into())).await {
                            error!(error = %e, "Failed to send frame.");
                            self.terminate(ConnectionState::Error, CONNECTION_ERROR);
                            return;
                        }
                    }
                    None => {
                        debug!("Client released the connection. Closing.");
                        let _ = sink.close().await;
                        return;
                    }
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => self.handle_frame(&bytes),
                    Some(Ok(Message::Close(close_frame))) => {
                        info!(?close_frame, "Connection closed by peer.");
                        self.terminate(ConnectionState::Closed, CONNECTION_CLOSED);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Error reading from connection.");
                        self.terminate(ConnectionState::Error, CONNECTION_ERROR);
                        return;
                    }
                    None => {
                        info!("Connection stream ended.");
                        self.terminate(ConnectionState::Closed, CONNECTION_CLOSED);
                        return;
                    }
                },
            }
        }
    }

    fn is_current(&self) -> bool {
        lock(&self.shared).epoch == self.epoch
    }

    fn mark_open(&self) -> Option<StartedCallback> {
        let mut shared = lock(&self.shared);
        if shared.epoch != self.epoch {
            return None;
        }
        shared.state = ConnectionState::Open;
        Some(shared.callbacks.on_connection_started.clone())
    }

    fn terminate(&self, state: ConnectionState, reason: &str) {
        let on_error = {
            let mut shared = lock(&self.shared);
            if shared.epoch != self.epoch {
                return;
            }
            shared.state = state;
            shared.callbacks.on_error_message.clone()
        };
        warn!(%state, reason, "Session ended.");
        on_error(reason);
    }

    fn handle_frame(&self, raw: &[u8]) {
        let frame = match ServerFrame::from_slice(raw) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Could not parse server frame.");
                None
            }
        };

        let on_response = {
            let mut shared = lock(&self.shared);
            if shared.epoch != self.epoch {
                return;
            }
            if let Some(usage) = frame.as_ref().and_then(|f| f.usage_metadata.as_ref()) {
                shared.usage.accumulate(usage);
                let totals = shared.usage.snapshot();
                debug!(
                    total_tokens = totals.total_tokens,
                    prompt_tokens = totals.prompt_tokens,
                    response_tokens = totals.response_tokens,
                    "Session usage updated."
                );
            }
            shared.callbacks.on_receive_response.clone()
        };

        let message = frame
            .as_ref()
            .map(decoder::decode_frame)
            .unwrap_or_else(DecodedMessage::unknown);
        on_response(message);
    }
}
