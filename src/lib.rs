//! Buddy Voice - Real-time conversational audio for companion characters
//!
//! This library provides the audio core behind Buddy's voice features:
//! - PCM codec between device samples and the wire format
//! - Microphone capture with fixed-size framing and backpressure
//! - Gapless, interruptible playback scheduling
//! - Live session lifecycle over a bidirectional transport
//! - One-shot text-to-speech with last-request-wins semantics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Session Controller                  │
//! │   connect  │  next_event  │  disconnect  │  state   │
//! └───────┬──────────────────────────────────▲──────────┘
//!         │ start/stop                       │ audio, interrupted, closed
//! ┌───────▼──────────┐               ┌───────┴──────────┐
//! │ Capture Pipeline │──── encode ──▶│    Transport     │
//! │  mic → frames    │               │  (live socket)   │
//! └──────────────────┘               └───────┬──────────┘
//!                                            │ decode
//! ┌──────────────────────────────────────────▼──────────┐
//! │                 Playback Scheduler                   │
//! │   enqueue  │  interrupt  │  shutdown  → output device│
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod persona;
pub mod session;
pub mod transport;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use persona::VoiceProfile;
pub use session::{SessionController, SessionOptions, SessionState};
pub use transport::{LiveTransport, Transport};
pub use voice::{SpeakOutcome, SpeechPlayer};
