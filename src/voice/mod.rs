//! Voice processing module
//!
//! Handles the PCM codec, microphone capture, gapless playback scheduling
//! and one-shot speech. Nothing here touches the network transport except
//! the TTS request used by one-shot speech.

mod capture;
mod codec;
mod device;
mod playback;
mod scheduler;
mod speech;
mod tts;

pub use capture::{CapturePipeline, ChunkSink, CpalInput, FRAME_LEN, Framer, calculate_rms};
pub use codec::{
    AudioFrame, EncodedChunk, INPUT_FORMAT, OUTPUT_FORMAT, PcmFormat, decode, encode,
    samples_to_duration,
};
pub use device::{InputDevice, OutputDevice, PlaybackHandle};
pub use playback::CpalOutput;
pub use scheduler::{PlaybackEntry, PlaybackScheduler};
pub use speech::{SpeakOutcome, SpeechPlayer};
pub use tts::{HttpSynthesizer, SpeechSynthesizer, extract_audio};
