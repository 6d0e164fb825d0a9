//! Terminal front end for a Gemini Live session.
//!
//! Connects through the configured endpoint (usually the `live-proxy` relay),
//! sends each input line as a user turn and prints the model's answer as it
//! streams in, followed by the session's running token totals.

mod config;
mod printer;

use anyhow::{Context, Result, bail};
use clap::Parser;
use config::Config;
use gemini_live::{DecodedMessage, ResponseModality, SessionCallbacks, SessionClient};
use printer::TurnPrinter;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Chat with a Gemini Live model from the terminal")]
struct Args {
    /// Overrides LIVE_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    /// Ask for text responses only, whatever LIVE_RESPONSE_MODALITIES says.
    #[arg(long)]
    text_only: bool,
    /// Send these messages one turn at a time and exit. Reads stdin when omitted.
    #[arg(short, long = "message")]
    messages: Vec<String>,
}

/// Callback invocations forwarded from the session's connection task.
#[derive(Debug)]
enum SessionEvent {
    Started,
    Response(DecodedMessage),
    Error(String),
}

fn forward_callbacks(tx: mpsc::UnboundedSender<SessionEvent>) -> SessionCallbacks {
    let (on_response, on_started, on_error) = (tx.clone(), tx.clone(), tx);
    SessionCallbacks::default()
        .on_receive_response(move |message| {
            let _ = on_response.send(SessionEvent::Response(message));
        })
        .on_connection_started(move || {
            let _ = on_started.send(SessionEvent::Started);
        })
        .on_error_message(move |reason| {
            let _ = on_error.send(SessionEvent::Error(reason.to_string()));
        })
}

/// Prints one event. Returns true when it ended a model turn.
fn print_event(
    event: SessionEvent,
    client: &SessionClient,
    printer: &mut TurnPrinter,
) -> Result<bool> {
    match event {
        SessionEvent::Response(message) => {
            let out = printer.render(&message, client.usage());
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(out.as_bytes())?;
            stdout.flush()?;
            Ok(message.is_end_of_turn())
        }
        SessionEvent::Error(reason) => bail!("Session ended: {}", reason),
        SessionEvent::Started => Ok(false),
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Result<SessionEvent> {
    events.recv().await.context("Session callbacks were dropped")
}

/// Sends each scripted message and waits for the model to finish its turn.
async fn run_scripted(
    client: &SessionClient,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    messages: Vec<String>,
) -> Result<()> {
    let mut printer = TurnPrinter::new();
    for message in messages {
        println!("> {}", message);
        client.send_text_message(message)?;
        while !print_event(next_event(events).await?, client, &mut printer)? {}
    }
    Ok(())
}

/// Reads stdin lines as user turns while printing responses as they arrive.
async fn run_interactive(
    client: &SessionClient,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    let mut printer = TurnPrinter::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => client.send_text_message(line)?,
                None => {
                    info!("Input closed.");
                    return Ok(());
                }
            },
            event = next_event(events) => {
                print_event(event?, client, &mut printer)?;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let mut session = config.session;
    if let Some(endpoint) = args.endpoint {
        session.endpoint = endpoint;
    }
    if args.text_only {
        session.response_modalities = vec![ResponseModality::Text];
    }

    // --- 3. Connect ---
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = SessionClient::new(session);
    client.set_callbacks(forward_callbacks(events_tx));
    client
        .connect(config.access_token.unwrap_or_default())
        .context("Failed to start the session")?;

    match next_event(&mut events).await? {
        SessionEvent::Started => info!("Session open."),
        SessionEvent::Error(reason) => bail!("Could not open the session: {}", reason),
        SessionEvent::Response(message) => bail!("Unexpected response before setup: {:?}", message),
    }

    // --- 4. Converse ---
    let result = if args.messages.is_empty() {
        run_interactive(&client, &mut events).await
    } else {
        run_scripted(&client, &mut events, args.messages).await
    };

    let totals = client.usage();
    info!(
        prompt_tokens = totals.prompt_tokens,
        response_tokens = totals.response_tokens,
        total_tokens = totals.total_tokens,
        "Session finished."
    );
    if let Err(e) = client.disconnect() {
        tracing::debug!(error = %e, "Nothing to disconnect.");
    }
    result
}
