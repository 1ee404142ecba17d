//! Gemini Live websocket transport.
//!
//! `open` connects, sends the setup message, and waits for `setupComplete`.
//! After that two tasks own the socket halves:
//!
//! - writer: drains [`Outbound`] and closes the socket exactly once
//! - reader: turns server messages into [`InboundEvent`]s, ending with one
//!   `Closed` or `Error`

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::io::protocol::{ClientMessage, ServerMessage};
use crate::session::config::{AgentConfig, ApiKey, SessionConfig};
use crate::session::error::TransportError;
use crate::session::transport::{Connector, InboundEvent, Outbound, SessionHandle, SessionLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, WsMessage>;
type WsRead = SplitStream<WsStream>;

pub struct LiveConnector {
    endpoint: String,
    api_key: ApiKey,
}

impl LiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.live.endpoint.clone(), config.api_key.clone())
    }

    fn url(&self) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| {
                warn!("Invalid endpoint {}: {}", self.endpoint, e);
                TransportError::Connect("Invalid voice service address".to_string())
            })?;
        if !self.api_key.is_empty() {
            url.query_pairs_mut()
                .append_pair("key", self.api_key.expose());
        }
        Ok(url)
    }
}

impl Connector for LiveConnector {
    async fn open(&self, config: &SessionConfig) -> Result<SessionLink, TransportError> {
        let session_id = Uuid::new_v4();
        let url = self.url()?;
        info!(
            %session_id,
            host = url.host_str().unwrap_or_default(),
            model = %config.model,
            "Opening live session"
        );

        let (ws, _) = connect_async(url.as_str()).await.map_err(|e| {
            warn!(%session_id, "Connect failed: {}", e);
            TransportError::Connect(describe_ws_error(&e).to_string())
        })?;
        let (mut write, mut read) = ws.split();

        let setup = ClientMessage::setup(config)
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        write.send(WsMessage::Text(setup)).await.map_err(|e| {
            warn!(%session_id, "Sending setup failed: {}", e);
            TransportError::Connect(describe_ws_error(&e).to_string())
        })?;

        await_setup_complete(&mut read).await?;
        info!(%session_id, "Live session ready");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(session_id, write, outbound_rx, events_tx.clone()));
        tokio::spawn(read_loop(session_id, read, events_tx));

        Ok(SessionLink {
            handle: Arc::new(SessionHandle::new(session_id, outbound_tx)),
            events: events_rx,
        })
    }
}

/// Short text for the status line. The full error goes to the log.
fn describe_ws_error(err: &WsError) -> &'static str {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => "Connection closed",
        WsError::Io(_) => "Network connection lost",
        WsError::Protocol(_) => "Voice service broke the connection protocol",
        WsError::Capacity(_) => "Message too large",
        WsError::Url(_) => "Invalid voice service address",
        WsError::Http(_) => "Voice service refused the connection",
        _ => "Connection error",
    }
}

fn message_bytes(msg: &WsMessage) -> Option<&[u8]> {
    match msg {
        WsMessage::Text(text) => Some(text.as_bytes()),
        WsMessage::Binary(data) => Some(data.as_slice()),
        _ => None,
    }
}

async fn await_setup_complete(read: &mut WsRead) -> Result<(), TransportError> {
    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| {
            warn!("Waiting for setup failed: {}", e);
            TransportError::Connect(describe_ws_error(&e).to_string())
        })?;
        if let WsMessage::Close(frame) = &msg {
            let reason = frame
                .as_ref()
                .map(|f| f.reason.to_string())
                .unwrap_or_else(|| "closed before setup completed".to_string());
            return Err(TransportError::Rejected(reason));
        }
        let Some(bytes) = message_bytes(&msg) else {
            continue;
        };
        match ServerMessage::parse(bytes) {
            Ok(server) if server.is_setup_complete() => return Ok(()),
            Ok(_) => debug!("Ignoring message before setup completed"),
            Err(e) => warn!("Unparseable message before setup completed: {}", e),
        }
    }
    Err(TransportError::Closed(
        "stream ended before setup completed".to_string(),
    ))
}

async fn write_loop(
    session_id: Uuid,
    mut write: WsWrite,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<InboundEvent>,
) {
    let mut sent: u64 = 0;
    while let Some(item) = outbound.recv().await {
        let chunk = match item {
            Outbound::Audio(chunk) => chunk,
            Outbound::Close => break,
        };
        let json = match ClientMessage::audio(&chunk).to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(%session_id, "Failed to serialize audio frame: {}", e);
                continue;
            }
        };
        if let Err(e) = write.send(WsMessage::Text(json)).await {
            warn!(%session_id, "Failed to send audio frame: {}", e);
            let _ = events.send(InboundEvent::Error(describe_ws_error(&e).to_string()));
            break;
        }
        sent += 1;
    }

    // Sends the close frame if the socket is still open.
    if let Err(e) = write.close().await {
        debug!(%session_id, "Close after {} frames: {}", sent, e);
    } else {
        debug!(%session_id, "Writer closed after {} frames", sent);
    }
}

async fn read_loop(
    session_id: Uuid,
    mut read: WsRead,
    events: mpsc::UnboundedSender<InboundEvent>,
) {
    let terminal = loop {
        let Some(msg) = read.next().await else {
            break InboundEvent::Closed("connection ended".to_string());
        };
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%session_id, "Read failed: {}", e);
                break InboundEvent::Error(describe_ws_error(&e).to_string());
            }
        };
        if let WsMessage::Close(frame) = &msg {
            let reason = frame
                .as_ref()
                .map(|f| f.reason.to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "closed by server".to_string());
            break InboundEvent::Closed(reason);
        }
        let Some(bytes) = message_bytes(&msg) else {
            continue;
        };

        let server = match ServerMessage::parse(bytes) {
            Ok(server) => server,
            Err(e) => {
                warn!(%session_id, "Ignoring unparseable server message: {}", e);
                continue;
            }
        };
        if let Some(go_away) = &server.go_away {
            warn!(%session_id, time_left = ?go_away.time_left, "Server is going away");
        }
        if server.turn_complete() {
            debug!(%session_id, "Turn complete");
        }
        for event in server.events() {
            if events.send(event).is_err() {
                return;
            }
        }
    };

    info!(%session_id, "Reader finished: {:?}", terminal);
    let _ = events.send(terminal);
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::audio::frame::{AudioBuffer, EncodedChunk};

    fn session_config() -> SessionConfig {
        SessionConfig {
            model: "test-model".into(),
            voice: "Zephyr".into(),
            instruction: "You sell houses.".into(),
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/live", listener.local_addr().unwrap());
        (listener, url)
    }

    #[test]
    fn test_socket_errors_read_as_short_reasons() {
        use std::io;
        use tokio_tungstenite::tungstenite::error::ProtocolError;

        let reset = WsError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "Connection reset by peer (os error 104)",
        ));
        assert_eq!(describe_ws_error(&reset), "Network connection lost");
        assert_eq!(describe_ws_error(&WsError::ConnectionClosed), "Connection closed");
        assert_eq!(
            describe_ws_error(&WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)),
            "Voice service broke the connection protocol"
        );
    }

    #[tokio::test]
    async fn test_reset_mid_session_reports_short_reason() {
        let (listener, url) = listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _setup = ws.next().await;
            ws.send(WsMessage::Text(r#"{"setupComplete":{}}"#.into()))
                .await
                .unwrap();
            // Drop the socket without a close handshake.
            drop(ws);
        });

        let connector = LiveConnector::new(url, ApiKey::default());
        let mut link = connector.open(&session_config()).await.unwrap();
        server.await.unwrap();

        match link.events.recv().await {
            Some(InboundEvent::Error(reason)) => {
                assert!(!reason.contains("os error"), "{reason}");
                assert!(
                    reason == "Voice service broke the connection protocol"
                        || reason == "Network connection lost",
                    "{reason}"
                );
            }
            Some(InboundEvent::Closed(_)) => {}
            other => panic!("expected a terminal event, got {other:?}"),
        }
        link.handle.close();
    }

    #[test]
    fn test_url_carries_key() {
        let connector = LiveConnector::new("wss://example.com/ws", ApiKey::new("abc 123"));
        assert_eq!(
            connector.url().unwrap().as_str(),
            "wss://example.com/ws?key=abc+123"
        );
        assert!(LiveConnector::new("not a url", ApiKey::default()).url().is_err());
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (listener, url) = listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let setup = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(setup.contains("\"model\":\"models/test-model\""));
            assert!(setup.contains("You sell houses."));

            ws.send(WsMessage::Text(r#"{"setupComplete":{}}"#.into()))
                .await
                .unwrap();
            ws.send(WsMessage::Binary(
                br#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}},{"text":"Hello"}]}}}"#
                    .to_vec(),
            ))
            .await
            .unwrap();

            let audio = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(audio.contains("\"realtimeInput\""));
            assert!(audio.contains("\"data\":\"AAD/fwCA\""));

            ws.close(None).await.unwrap();
            // Drain until the client acknowledges.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = LiveConnector::new(url, ApiKey::new("test"));
        let mut link = connector.open(&session_config()).await.unwrap();

        assert_eq!(
            link.events.recv().await,
            Some(InboundEvent::Audio("AAAA".into()))
        );
        assert_eq!(
            link.events.recv().await,
            Some(InboundEvent::Transcript("Hello".into()))
        );

        let chunk = EncodedChunk::encode(&AudioBuffer::<f32, 1, 16000>::mono(vec![0.0, 1.0, -1.0]));
        assert!(link.handle.send(chunk));

        let terminal = link.events.recv().await.unwrap();
        assert!(matches!(terminal, InboundEvent::Closed(_)), "{terminal:?}");

        link.handle.close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_setup_is_rejection() {
        let (listener, url) = listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _setup = ws.next().await;
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = LiveConnector::new(url, ApiKey::default());
        let result = connector.open(&session_config()).await;
        assert!(matches!(result, Err(TransportError::Rejected(_))));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (listener, url) = listener().await;
        drop(listener);

        let connector = LiveConnector::new(url, ApiKey::default());
        let result = connector.open(&session_config()).await;
        match result {
            Err(TransportError::Connect(reason)) => assert_eq!(reason, "Network connection lost"),
            Err(other) => panic!("expected a connect error, got {other:?}"),
            Ok(_) => panic!("connect unexpectedly succeeded"),
        }
    }
}
