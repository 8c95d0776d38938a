use super::messages::{ClientMessage, LiveConfig, ServerMessage};
use super::session::{LiveConnector, LiveError, LiveSession, SessionEvent};
use base64::Engine;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connects to the speech service over WebSocket
///
/// The server speaks JSON text frames: one setup message from the client,
/// then audio messages up and `ServerMessage` payloads down.
pub struct WsConnector {
    url: String,
    api_key: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn endpoint(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}?key={}", self.url, key),
            None => self.url.clone(),
        }
    }
}

#[async_trait::async_trait]
impl LiveConnector for WsConnector {
    async fn open(
        &self,
        model: &str,
        config: LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), LiveError> {
        info!("Connecting to live service at {}", self.url);

        let (stream, _) = connect_async(self.endpoint())
            .await
            .map_err(|e| LiveError::Connect(e.to_string()))?;

        let (mut sink, mut source) = stream.split();

        let setup = ClientMessage::Setup {
            model: model.to_string(),
            config,
        };
        let payload = serde_json::to_string(&setup).map_err(|e| LiveError::Send(e.to_string()))?;
        sink.send(Message::Text(payload))
            .await
            .map_err(|e| LiveError::Send(e.to_string()))?;

        info!("Live session connected, setup sent");

        let (event_tx, event_rx) = mpsc::channel(64);

        tokio::spawn(async move {
            if event_tx.send(SessionEvent::Opened).await.is_err() {
                return;
            }

            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if event_tx.send(SessionEvent::Message(message)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("ignoring unparseable server message: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(other) => {
                        debug!("ignoring {}-byte non-text frame", other.len());
                    }
                    Err(e) => {
                        error!("live session transport error: {}", e);
                        let _ = event_tx.send(SessionEvent::Errored(e.to_string())).await;
                        return;
                    }
                }
            }

            debug!("live session stream ended");
            let _ = event_tx.send(SessionEvent::Closed).await;
        });

        let session = WsSession { sink: Some(sink) };
        Ok((Box::new(session), event_rx))
    }
}

/// Write half of an open WebSocket session
struct WsSession {
    sink: Option<WsSink>,
}

#[async_trait::async_trait]
impl LiveSession for WsSession {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), LiveError> {
        let sink = self.sink.as_mut().ok_or(LiveError::Closed)?;

        let message = ClientMessage::Audio {
            audio_chunk_base64: base64::engine::general_purpose::STANDARD.encode(pcm),
        };
        let payload =
            serde_json::to_string(&message).map_err(|e| LiveError::Send(e.to_string()))?;

        sink.send(Message::Text(payload))
            .await
            .map_err(|e| LiveError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), LiveError> {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("close frame not delivered: {}", e);
            }
        }
        Ok(())
    }
}
