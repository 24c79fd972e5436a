//! WebSocket transport speaking the Live API wire format

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::wire::{self, ServerFrame};
use super::{ClientMessage, Connection, QUEUE_DEPTH, SessionSetup, Transport, TransportEvent};
use crate::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Streaming transport over a WebSocket
pub struct LiveTransport {
    endpoint: String,
    api_key: Option<SecretString>,
}

impl LiveTransport {
    /// Create a transport for `endpoint` (a `ws://` or `wss://` URL)
    #[must_use]
    pub const fn new(endpoint: String, api_key: Option<SecretString>) -> Self {
        Self { endpoint, api_key }
    }

    fn url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let sep = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{sep}key={}", self.endpoint, key.expose_secret())
            }
            None => self.endpoint.clone(),
        }
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn open(&self, setup: &SessionSetup) -> Result<Connection> {
        let (mut socket, _) = tokio_tungstenite::connect_async(self.url()).await?;
        tracing::debug!(endpoint = %self.endpoint, "live socket connected");

        socket
            .send(Message::Text(wire::setup_message(setup)?))
            .await?;

        await_setup_complete(&mut socket).await?;
        tracing::debug!(model = %setup.model, "live session ready");

        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(pump(socket, out_rx, in_tx));

        Ok(Connection::new(out_tx, in_rx))
    }
}

/// Wait for the server to acknowledge the setup message
async fn await_setup_complete(socket: &mut Socket) -> Result<()> {
    while let Some(message) = socket.next().await {
        let raw = match message? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(Error::Transport(format!("closed during setup: {reason}")));
            }
            _ => continue,
        };

        if wire::parse_server_frame(&raw)? == ServerFrame::SetupComplete {
            return Ok(());
        }
    }

    Err(Error::Transport("connection ended during setup".to_string()))
}

/// Shuttle messages between the socket and the connection queues
async fn pump(
    mut socket: Socket,
    mut outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<TransportEvent>,
) {
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(ClientMessage::Audio(chunk)) = message else {
                    // Explicit close, or the session dropped its end
                    if let Err(e) = socket.close(None).await {
                        tracing::debug!(error = %e, "live socket close failed");
                    }
                    break;
                };

                let sent = match wire::audio_message(&chunk) {
                    Ok(text) => socket.send(Message::Text(text)).await.map_err(Error::from),
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    let _ = inbound.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
            message = socket.next() => {
                let event = match message {
                    None | Some(Ok(Message::Close(_))) => TransportEvent::Closed,
                    Some(Err(e)) => TransportEvent::Error(e.to_string()),
                    Some(Ok(Message::Text(text))) => match frame_event(text.as_bytes()) {
                        Some(event) => event,
                        None => continue,
                    },
                    Some(Ok(Message::Binary(bytes))) => match frame_event(&bytes) {
                        Some(event) => event,
                        None => continue,
                    },
                    Some(Ok(_)) => continue,
                };

                let terminal = !matches!(event, TransportEvent::Message(_));
                if inbound.send(event).await.is_err() || terminal {
                    break;
                }
            }
        }
    }

    tracing::debug!("live socket pump finished");
}

fn frame_event(raw: &[u8]) -> Option<TransportEvent> {
    match wire::parse_server_frame(raw) {
        Ok(ServerFrame::Message(message)) => Some(TransportEvent::Message(message)),
        Ok(ServerFrame::SetupComplete | ServerFrame::Ignored) => None,
        Err(e) => Some(TransportEvent::Error(e.to_string())),
    }
}
