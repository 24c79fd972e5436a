//! Conversational session lifecycle
//!
//! Owns one live session at a time: opens the transport, wires microphone
//! capture to it, feeds response audio into the playback scheduler, and
//! tears every resource down on close, error, or local disconnect.
//!
//! ```text
//!  idle ──connect──▶ connecting ──open──▶ active ──remote close──▶ closed
//!                        │                  │   ──error──────────▶ errored
//!                        └──error──▶ errored │
//!  any ──disconnect──▶ closing ──▶ closed ◀──┘
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::persona::VoiceProfile;
use crate::transport::{
    ClientMessage, Connection, ServerMessage, SessionSetup, Transport, TransportEvent,
};
use crate::voice::{
    CapturePipeline, ChunkSink, EncodedChunk, FRAME_LEN, InputDevice, OUTPUT_FORMAT,
    OutputDevice, PlaybackEntry, PlaybackScheduler, decode,
};
use crate::{Error, Result};

/// Default live model
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Lifecycle state of a session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    /// Closed or errored
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// A session exists and a second `connect` must be refused
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Active | Self::Closing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Synthesis model identifier
    pub model: String,
    /// Upper bound on the open handshake
    pub connect_timeout: Duration,
    /// Capture frame length in samples
    pub frame_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            connect_timeout: Duration::from_secs(15),
            frame_len: FRAME_LEN,
        }
    }
}

/// Capture sink writing frames to the transport
struct AudioUplink {
    outbound: mpsc::Sender<ClientMessage>,
}

#[async_trait]
impl ChunkSink for AudioUplink {
    async fn accept(&mut self, chunk: EncodedChunk) -> bool {
        self.outbound.send(ClientMessage::Audio(chunk)).await.is_ok()
    }
}

type CloseCallback = Box<dyn FnOnce()>;

/// Drives one conversational session at a time
pub struct SessionController<T: Transport, I: InputDevice, O: OutputDevice> {
    transport: T,
    options: SessionOptions,
    capture: CapturePipeline<I>,
    scheduler: PlaybackScheduler<O>,
    connection: Option<Connection>,
    on_closed: Option<CloseCallback>,
    session_id: Option<Uuid>,
    state: watch::Sender<SessionState>,
}

impl<T: Transport, I: InputDevice, O: OutputDevice> SessionController<T, I, O> {
    #[must_use]
    pub fn new(transport: T, input: I, output: O, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            transport,
            capture: CapturePipeline::new(input, options.frame_len),
            scheduler: PlaybackScheduler::new(output),
            options,
            connection: None,
            on_closed: None,
            session_id: None,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions, e.g. to drive a listening indicator
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identifier of the current or most recent session
    #[must_use]
    pub const fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Whether the microphone is currently streaming
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    /// Response audio scheduled but not yet played
    pub fn live_playback(&mut self) -> Vec<PlaybackEntry> {
        self.scheduler.live_entries()
    }

    /// Open a session and start streaming the microphone to it
    ///
    /// `on_closed` runs exactly once if the remote side ends the session or
    /// the transport fails, including a failure while connecting. It is not
    /// run for a local `disconnect` or when the microphone is unavailable.
    ///
    /// # Errors
    ///
    /// - `Error::SessionBusy` if a session is already connecting or active
    /// - `Error::Transport` if the transport fails or times out opening
    /// - `Error::CaptureUnavailable` if the microphone cannot be acquired;
    ///   the just-opened transport is closed again
    pub async fn connect<F>(&mut self, profile: VoiceProfile, on_closed: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        let current = self.state();
        if current.is_live() {
            tracing::warn!(state = %current, "connect refused, session already live");
            return Err(Error::SessionBusy(current));
        }

        // Leftovers from a previous session that ended remotely
        self.release_resources();

        let session = Uuid::new_v4();
        self.session_id = Some(session);
        self.on_closed = Some(Box::new(on_closed));
        self.set_state(SessionState::Connecting);
        tracing::info!(%session, voice = profile.voice(), "session connecting");

        let setup = SessionSetup {
            model: self.options.model.clone(),
            profile,
        };
        let opened = tokio::time::timeout(self.options.connect_timeout, self.transport.open(&setup))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Transport(
                    "timed out waiting for session to open".to_string(),
                ))
            });

        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                self.end_remote(SessionState::Errored, Some(&e.to_string()));
                return Err(e);
            }
        };

        self.scheduler.reset();
        let uplink = AudioUplink {
            outbound: connection.sender(),
        };
        if let Err(e) = self.capture.start(uplink) {
            tracing::warn!(%session, error = %e, "microphone unavailable, abandoning session");
            connection.close();
            self.capture.stop();
            self.on_closed = None;
            self.set_state(SessionState::Errored);
            return Err(e);
        }

        self.connection = Some(connection);
        self.set_state(SessionState::Active);
        tracing::info!(%session, "session active");
        Ok(())
    }

    /// Process the next transport event
    ///
    /// Returns `false` once the session is no longer active. Cancel-safe,
    /// so it can be raced against user input in `tokio::select!`.
    pub async fn next_event(&mut self) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };

        match connection.recv().await {
            Some(TransportEvent::Message(message)) => self.handle_message(message),
            Some(TransportEvent::Error(reason)) => {
                self.end_remote(SessionState::Errored, Some(&reason));
            }
            Some(TransportEvent::Closed) | None => self.end_remote(SessionState::Closed, None),
        }

        self.state() == SessionState::Active
    }

    /// End the session locally and release every resource
    ///
    /// Safe in any state, including before `connect` reached active, and
    /// safe to call repeatedly. Sends an explicit close to the remote side
    /// first when a connection is open.
    pub fn disconnect(&mut self) {
        let before = self.state();
        if before.is_live() {
            self.set_state(SessionState::Closing);
        }

        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.release_resources();
        self.on_closed = None;

        if before != SessionState::Errored {
            self.set_state(SessionState::Closed);
        }
        if before.is_live() {
            tracing::info!(session = ?self.session_id, "session disconnected");
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        if let Some(chunk) = message.audio {
            self.play_chunk(&chunk);
        }
        if message.interrupted {
            self.scheduler.interrupt();
        }
        if message.closed {
            self.end_remote(SessionState::Closed, None);
        }
    }

    fn play_chunk(&mut self, chunk: &EncodedChunk) {
        if !matches!(self.state(), SessionState::Active | SessionState::Closing) {
            return;
        }

        let frame = match decode(chunk, OUTPUT_FORMAT) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(session = ?self.session_id, error = %e, "dropping response chunk");
                return;
            }
        };

        if let Err(e) = self.scheduler.enqueue(&frame) {
            tracing::warn!(session = ?self.session_id, error = %e, "response chunk not played");
        }
    }

    /// The remote side ended the session, or the transport failed
    fn end_remote(&mut self, state: SessionState, reason: Option<&str>) {
        self.connection = None;
        self.capture.stop();
        self.set_state(state);

        match reason {
            Some(reason) => {
                tracing::warn!(session = ?self.session_id, reason, "session failed");
            }
            None => tracing::info!(session = ?self.session_id, "session closed by remote"),
        }

        if let Some(on_closed) = self.on_closed.take() {
            on_closed();
        }
    }

    fn release_resources(&mut self) {
        self.capture.stop();
        self.scheduler.shutdown();
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state");
        }
    }
}

impl<T: Transport, I: InputDevice, O: OutputDevice> Drop for SessionController<T, I, O> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Errored.is_terminal());
        assert!(!SessionState::Idle.is_terminal());

        assert!(SessionState::Connecting.is_live());
        assert!(SessionState::Active.is_live());
        assert!(SessionState::Closing.is_live());
        assert!(!SessionState::Idle.is_live());
        assert!(!SessionState::Closed.is_live());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Active.to_string(), "active");
        assert_eq!(
            Error::SessionBusy(SessionState::Connecting).to_string(),
            "session busy: already connecting"
        );
    }
}
