use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use draftstream::history::{HistoryEntry, HistorySink};
use draftstream::{
    session, ClientConfig, ClientRequest, ConnectionState, Lifecycle, Session, SessionEvent,
    SessionOptions, StreamClient,
};

const WAIT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<TcpStream>;

/// Local backend: runs `handler` for every accepted socket and reports each
/// accept on the returned channel.
async fn serve<F, Fut>(handler: F) -> (String, mpsc::UnboundedReceiver<()>)
where
    F: Fn(Socket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let _ = accepted_tx.send(());
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                    handler(ws).await;
                }
            });
        }
    });

    (url, accepted_rx)
}

async fn send_json(ws: &mut Socket, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn read_request(ws: &mut Socket) -> Option<Value> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistorySink for RecordingSink {
    fn record(&self, entry: HistoryEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

fn client_for(url: &str, reconnect_delay: Duration) -> StreamClient {
    StreamClient::new(ClientConfig {
        url: Some(url.to_string()),
        reconnect_delay,
    })
}

async fn wait_for_state(client: &StreamClient, wanted: ConnectionState) {
    let mut states = client.watch_state();
    timeout(WAIT, states.wait_for(|s| *s == wanted))
        .await
        .expect("timed out waiting for connection state")
        .unwrap();
}

const DOCUMENT: &str =
    "<h1>Mutual NDA</h1><p>Party A &amp; Party B agree to keep &quot;Information&quot; secret.</p>";

#[tokio::test]
async fn test_chunked_document_streams_to_display() {
    let (url, _accepts) = serve(|mut ws| async move {
        let request = read_request(&mut ws).await.unwrap();
        assert_eq!(request["action"], "generate");
        assert_eq!(request["target_pages"], 10);

        send_json(&mut ws, json!({"type": "start", "message": "Generating contract..."})).await;
        let pieces: Vec<&str> = DOCUMENT
            .as_bytes()
            .chunks(7)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect();
        for (index, piece) in pieces.iter().enumerate() {
            send_json(
                &mut ws,
                json!({"type": "chunk", "content": piece, "chunk_index": index, "is_last": index + 1 == pieces.len()}),
            )
            .await;
            if index == 3 {
                ws.send(Message::Text("not json at all".to_string().into()))
                    .await
                    .unwrap();
            }
        }
        send_json(
            &mut ws,
            json!({"type": "complete", "message": "Contract generated successfully", "metadata": {"length": DOCUMENT.len(), "chunks_sent": true}}),
        )
        .await;

        while ws.next().await.is_some() {}
    })
    .await;

    let client = client_for(&url, Duration::from_millis(200));
    let sink = Arc::new(RecordingSink::default());
    let (tx, mut events) = mpsc::unbounded_channel();
    let shared = Session::new(SessionOptions {
        tick: Duration::from_millis(1),
        ..SessionOptions::default()
    })
    .with_events(tx)
    .with_history(sink.clone())
    .into_shared();
    let _subscription = session::attach(&shared, &client);
    let mut view = shared.lock().unwrap().view();

    client.connect();
    wait_for_state(&client, ConnectionState::Connected).await;

    let request = ClientRequest::generate("Draft a simple NDA between two companies", None).unwrap();
    assert!(shared.lock().unwrap().submit(&client, &request));

    assert_eq!(
        timeout(WAIT, events.recv()).await.unwrap(),
        Some(SessionEvent::Started(Some("Generating contract...".to_string())))
    );
    match timeout(WAIT, events.recv()).await.unwrap() {
        Some(SessionEvent::Completed { message, metadata }) => {
            assert_eq!(message.as_deref(), Some("Contract generated successfully"));
            assert_eq!(metadata.and_then(|m| m.length), Some(DOCUMENT.len()));
        }
        other => panic!("unexpected event {other:?}"),
    }

    timeout(WAIT, view.drained()).await.unwrap();
    assert_eq!(view.displayed(), DOCUMENT);
    assert_eq!(shared.lock().unwrap().lifecycle(), Lifecycle::Succeeded);

    // The malformed frame left the connection alone
    assert_eq!(client.state(), ConnectionState::Connected);

    let entries = sink.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].prompt, "Draft a simple NDA between two companies");
    assert_eq!(entries[0].contract, DOCUMENT);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_error_frame_fails_generation() {
    let (url, _accepts) = serve(|mut ws| async move {
        read_request(&mut ws).await;
        send_json(&mut ws, json!({"type": "start"})).await;
        send_json(&mut ws, json!({"type": "chunk", "content": "<h1>Partial"})).await;
        send_json(&mut ws, json!({"type": "error", "error": "quota exceeded"})).await;
        while ws.next().await.is_some() {}
    })
    .await;

    let client = client_for(&url, Duration::from_millis(200));
    let (tx, mut events) = mpsc::unbounded_channel();
    let shared = Session::new(SessionOptions::default())
        .with_events(tx)
        .into_shared();
    let _subscription = session::attach(&shared, &client);

    client.connect();
    wait_for_state(&client, ConnectionState::Connected).await;
    let request = ClientRequest::generate("Consulting agreement for a designer", None).unwrap();
    assert!(shared.lock().unwrap().submit(&client, &request));

    timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(
        timeout(WAIT, events.recv()).await.unwrap(),
        Some(SessionEvent::Failed("quota exceeded".to_string()))
    );
    {
        let session = shared.lock().unwrap();
        assert_eq!(session.lifecycle(), Lifecycle::Failed);
        assert_eq!(session.raw(), "<h1>Partial");
    }
    // Generation errors do not touch the transport
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect();
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (url, mut accepts) = serve(|mut ws| async move {
        read_request(&mut ws).await;
        let _ = ws.close(None).await;
    })
    .await;

    let client = client_for(&url, Duration::from_millis(100));
    client.connect();
    timeout(WAIT, accepts.recv()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    assert!(client.send(&json!({"action": "ping"})));

    // Server closes; a single new connection follows after the delay
    timeout(WAIT, accepts.recv()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;
    assert!(client.last_error().is_none());

    client.disconnect();
    assert!(timeout(Duration::from_millis(400), accepts.recv()).await.is_err());
}

#[tokio::test]
async fn test_disconnect_after_close_suppresses_reconnect() {
    let (url, mut accepts) = serve(|mut ws| async move {
        read_request(&mut ws).await;
        let _ = ws.close(None).await;
    })
    .await;

    let client = client_for(&url, Duration::from_millis(300));
    client.connect();
    timeout(WAIT, accepts.recv()).await.unwrap();
    wait_for_state(&client, ConnectionState::Connected).await;

    assert!(client.send(&json!({"action": "ping"})));
    wait_for_state(&client, ConnectionState::Disconnected).await;
    client.disconnect();

    assert!(timeout(Duration::from_secs(1), accepts.recv()).await.is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_send_while_disconnected_transmits_nothing() {
    let (url, mut accepts) = serve(|mut ws| async move {
        while ws.next().await.is_some() {}
    })
    .await;

    let client = client_for(&url, Duration::from_millis(100));
    assert!(!client.send(&json!({"action": "generate"})));
    assert!(timeout(Duration::from_millis(200), accepts.recv()).await.is_err());
}
