//! Bidirectional streaming transport to the conversational voice service
//!
//! The session controller is the only consumer. A [`Transport`] opens a
//! [`Connection`]: an outbound queue of client messages and an inbound
//! queue of events, both in arrival order.

mod live;
pub mod wire;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::persona::VoiceProfile;
use crate::voice::EncodedChunk;

pub use live::LiveTransport;

/// Capacity of the per-connection message queues
pub const QUEUE_DEPTH: usize = 64;

/// Configuration sent when a session is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    /// Synthesis model identifier
    pub model: String,
    pub profile: VoiceProfile,
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// One capture frame
    Audio(EncodedChunk),
    /// Ask the remote side to end the session
    Close,
}

/// Content of one server message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// Response audio, at most one chunk per message
    pub audio: Option<EncodedChunk>,
    /// The user talked over the reply; local playback must stop
    pub interrupted: bool,
    pub turn_complete: bool,
    /// The remote side is ending the session
    pub closed: bool,
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// Connection drop or protocol failure
    Error(String),
    /// Remote side closed the connection
    Closed,
}

/// An open session: send with `outbound`, receive from `inbound`
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl Connection {
    #[must_use]
    pub const fn new(
        outbound: mpsc::Sender<ClientMessage>,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// A handle for sending client messages
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.outbound.clone()
    }

    /// Next inbound event; `None` once the transport is gone
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    /// Send an explicit close to the remote side without waiting
    ///
    /// Dropping the connection afterwards releases both queues.
    pub fn close(self) {
        if let Err(e) = self.outbound.try_send(ClientMessage::Close) {
            tracing::debug!(error = %e, "close signal not delivered");
        }
    }
}

/// Opens streaming sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session and wait until the remote side reports it ready
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the connection or handshake fails
    async fn open(&self, setup: &SessionSetup) -> Result<Connection>;
}
