//! Shared test utilities
//!
//! Scripted stand-ins for the audio hardware, the live transport and the
//! speech service, so every component runs without devices or network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use buddy_voice::persona::VoiceProfile;
use buddy_voice::transport::{
    ClientMessage, Connection, QUEUE_DEPTH, ServerMessage, SessionSetup, Transport,
    TransportEvent,
};
use buddy_voice::voice::{
    AudioFrame, EncodedChunk, InputDevice, OUTPUT_FORMAT, OutputDevice, PcmFormat,
    PlaybackHandle, SpeechSynthesizer, encode,
};
use buddy_voice::{Error, Result, SessionController, SessionOptions};

/// Everything the fake output device was asked to do
#[derive(Debug, Default)]
pub struct OutputLog {
    pub clock: Duration,
    /// (handle, start time, duration) per `start` call
    pub started: Vec<(PlaybackHandle, Duration, Duration)>,
    pub stopped: Vec<PlaybackHandle>,
    pub releases: usize,
    pending: Vec<(PlaybackHandle, Duration)>,
    finished: Vec<PlaybackHandle>,
}

/// Output device driven by a manual clock
#[derive(Debug, Clone, Default)]
pub struct FakeOutput {
    log: Arc<Mutex<OutputLog>>,
}

impl FakeOutput {
    #[must_use]
    pub fn at(clock: Duration) -> Self {
        let output = Self::default();
        output.log().clock = clock;
        output
    }

    pub fn log(&self) -> MutexGuard<'_, OutputLog> {
        self.log.lock().expect("output log poisoned")
    }

    /// Move the clock forward, finishing every buffer that ended
    pub fn advance(&self, by: Duration) {
        let mut log = self.log();
        log.clock += by;
        let now = log.clock;
        let (done, pending): (Vec<_>, Vec<_>) =
            log.pending.drain(..).partition(|(_, end)| *end <= now);
        log.pending = pending;
        log.finished.extend(done.into_iter().map(|(handle, _)| handle));
    }

    pub fn start_times(&self) -> Vec<Duration> {
        self.log().started.iter().map(|(_, at, _)| *at).collect()
    }
}

impl OutputDevice for FakeOutput {
    fn clock(&self) -> Duration {
        self.log().clock
    }

    fn start(&mut self, handle: PlaybackHandle, frame: &AudioFrame, at: Duration) -> Result<()> {
        let mut log = self.log();
        log.started.push((handle, at, frame.duration()));
        log.pending.push((handle, at + frame.duration()));
        Ok(())
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        let mut log = self.log();
        log.pending.retain(|(h, _)| *h != handle);
        log.stopped.push(handle);
    }

    fn drain_finished(&mut self) -> Vec<PlaybackHandle> {
        std::mem::take(&mut self.log().finished)
    }

    fn release(&mut self) {
        let mut log = self.log();
        log.pending.clear();
        log.releases += 1;
    }
}

#[derive(Debug, Default)]
struct InputState {
    deny: bool,
    samples: Option<mpsc::UnboundedSender<Vec<f32>>>,
    opens: usize,
    closes: usize,
}

/// Microphone fed by the test
#[derive(Debug, Clone, Default)]
pub struct FakeInput {
    state: Arc<Mutex<InputState>>,
}

impl FakeInput {
    /// A microphone whose permission prompt is always declined
    #[must_use]
    pub fn denied() -> Self {
        let input = Self::default();
        input.lock().deny = true;
        input
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().expect("input state poisoned")
    }

    /// Deliver one raw block; false when the device is closed
    pub fn push(&self, block: Vec<f32>) -> bool {
        self.lock()
            .samples
            .as_ref()
            .is_some_and(|tx| tx.send(block).is_ok())
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    pub fn is_live(&self) -> bool {
        self.lock().samples.is_some()
    }
}

impl InputDevice for FakeInput {
    fn open(&mut self, _format: PcmFormat, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<()> {
        let mut state = self.lock();
        if state.deny {
            return Err(Error::CaptureUnavailable("permission denied".to_string()));
        }
        state.samples = Some(samples);
        state.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        if state.samples.take().is_some() {
            state.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.lock().samples.is_some()
    }
}

/// The service end of a fake connection
pub struct Remote {
    /// Messages the client sent
    pub outbound: mpsc::Receiver<ClientMessage>,
    /// Events to deliver to the client
    pub inbound: mpsc::Sender<TransportEvent>,
}

impl Remote {
    /// Next client message, failing the test after one second
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        tokio::time::timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .expect("timed out waiting for client message")
    }

    pub async fn send(&self, message: ServerMessage) {
        self.inbound
            .send(TransportEvent::Message(message))
            .await
            .expect("client dropped the connection");
    }
}

#[derive(Default)]
struct TransportState {
    fail: Option<String>,
    hang: bool,
    setups: Vec<SessionSetup>,
    remotes: Vec<Remote>,
}

/// Transport opening in-memory connections
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    /// A transport whose open always fails
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        let transport = Self::default();
        transport.lock().fail = Some(reason.to_string());
        transport
    }

    /// A transport whose open never completes
    #[must_use]
    pub fn hanging() -> Self {
        let transport = Self::default();
        transport.lock().hang = true;
        transport
    }

    /// Make later opens hang or complete again
    pub fn set_hanging(&self, hang: bool) {
        self.lock().hang = hang;
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().expect("transport state poisoned")
    }

    /// Remote end of the most recently opened connection
    pub fn take_remote(&self) -> Remote {
        self.lock().remotes.pop().expect("no connection was opened")
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        self.lock().setups.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, setup: &SessionSetup) -> Result<Connection> {
        let hang = self.lock().hang;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        state.setups.push(setup.clone());
        if let Some(reason) = &state.fail {
            return Err(Error::Transport(reason.clone()));
        }

        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
        state.remotes.push(Remote {
            outbound: out_rx,
            inbound: in_tx,
        });
        Ok(Connection::new(out_tx, in_rx))
    }
}

/// Speech service with canned replies
#[derive(Default)]
pub struct ScriptedSynthesizer {
    replies: HashMap<String, (Duration, Option<EncodedChunk>)>,
}

impl ScriptedSynthesizer {
    /// Answer `text` after `delay`; `None` means a reply without audio
    #[must_use]
    pub fn reply(mut self, text: &str, delay: Duration, audio: Option<EncodedChunk>) -> Self {
        self.replies.insert(text.to_string(), (delay, audio));
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, _profile: &VoiceProfile) -> Result<EncodedChunk> {
        let Some((delay, audio)) = self.replies.get(text) else {
            return Err(Error::Transport(format!("no reply scripted for {text:?}")));
        };
        tokio::time::sleep(*delay).await;
        audio.clone().ok_or(Error::SynthesisEmpty)
    }
}

/// Response audio lasting `duration` at the output rate
#[must_use]
pub fn response_chunk(duration: Duration) -> EncodedChunk {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let samples = (duration.as_secs_f64() * f64::from(OUTPUT_FORMAT.sample_rate)).round() as usize;
    encode(&vec![0.25; samples], OUTPUT_FORMAT)
}

/// A server message carrying only audio
#[must_use]
pub fn audio_message(chunk: EncodedChunk) -> ServerMessage {
    ServerMessage {
        audio: Some(chunk),
        ..ServerMessage::default()
    }
}

pub type TestController = SessionController<FakeTransport, FakeInput, FakeOutput>;

/// Controller wired to fakes, capturing in frames of `frame_len` samples
#[must_use]
pub fn controller(
    transport: &FakeTransport,
    input: &FakeInput,
    output: &FakeOutput,
    frame_len: usize,
) -> TestController {
    let options = SessionOptions {
        model: "test-model".to_string(),
        connect_timeout: Duration::from_millis(200),
        frame_len,
    };
    SessionController::new(transport.clone(), input.clone(), output.clone(), options)
}
