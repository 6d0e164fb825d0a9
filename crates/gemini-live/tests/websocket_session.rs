//! End-to-end session over a real WebSocket served on localhost.

use futures_util::{SinkExt, StreamExt};
use gemini_live::{
    ConnectionState, DecodedMessage, MessageKind, SessionCallbacks, SessionClient, SessionConfig,
    UsageTotals,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::Message,
    },
};

#[derive(Debug, PartialEq)]
enum Event {
    Started,
    Response(DecodedMessage),
    Error(String),
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_full_session_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let authorization = Arc::new(Mutex::new(None::<String>));

    let server = tokio::spawn({
        let authorization = authorization.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(
                stream,
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *authorization.lock().unwrap() = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    Ok(resp)
                },
            )
            .await
            .unwrap();

            let setup = next_json(&mut ws).await;
            // The service answers with JSON in binary frames.
            ws.send(Message::Binary(
                json!({ "setupComplete": {} }).to_string().into_bytes().into(),
            ))
            .await
            .unwrap();

            let turn = next_json(&mut ws).await;
            ws.send(Message::Text(
                json!({
                    "serverContent": {
                        "modelTurn": { "parts": [{ "text": "pong" }] },
                        "turnComplete": true
                    }
                })
                .to_string()
                .into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(
                json!({
                    "usageMetadata": {
                        "promptTokenCount": 4,
                        "candidatesTokenCount": 2,
                        "totalTokenCount": 6
                    }
                })
                .to_string()
                .into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
            (setup, turn)
        }
    });

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let config = SessionConfig::new(format!("ws://{}", addr), "demo-project")
        .with_system_instruction("Answer ping with pong.");
    let mut client = SessionClient::new(config);
    let (on_response, on_started, on_error) = (events_tx.clone(), events_tx.clone(), events_tx);
    client.set_callbacks(
        SessionCallbacks::default()
            .on_receive_response(move |m| {
                let _ = on_response.send(Event::Response(m));
            })
            .on_connection_started(move || {
                let _ = on_started.send(Event::Started);
            })
            .on_error_message(move |reason| {
                let _ = on_error.send(Event::Error(reason.to_string()));
            }),
    );

    client.connect("local-token").unwrap();
    assert_eq!(next_event(&mut events).await, Event::Started);
    assert_eq!(client.state(), ConnectionState::Open);

    client.send_text_message("ping").unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Event::Response(DecodedMessage {
            kind: MessageKind::SetupComplete,
            end_of_turn: None,
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Response(DecodedMessage {
            kind: MessageKind::Text {
                text: "pong".to_string()
            },
            end_of_turn: Some(true),
        })
    );
    let usage = UsageTotals {
        prompt_tokens: 4,
        response_tokens: 2,
        total_tokens: 6,
    };
    assert_eq!(
        next_event(&mut events).await,
        Event::Response(DecodedMessage {
            kind: MessageKind::UsageMetadata(usage),
            end_of_turn: None,
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Error("Connection closed".to_string())
    );
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.usage(), usage);

    let (setup, turn) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        setup["setup"]["model"],
        "projects/demo-project/locations/us-central1/publishers/google/models/gemini-2.0-flash-exp"
    );
    assert_eq!(
        setup["setup"]["system_instruction"]["parts"][0]["text"],
        "Answer ping with pong."
    );
    assert_eq!(turn["client_content"]["turns"][0]["parts"][0]["text"], "ping");
    assert_eq!(turn["client_content"]["turn_complete"], true);
    assert_eq!(
        authorization.lock().unwrap().as_deref(),
        Some("Bearer local-token")
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_connection_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = SessionClient::new(SessionConfig::new(format!("ws://{}", addr), "p"));
    client.set_on_error_message(move |reason| {
        let _ = events_tx.send(Event::Error(reason.to_string()));
    });

    client.connect("").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Event::Error("Connection error".to_string())
    );
    assert_eq!(client.state(), ConnectionState::Error);
}
