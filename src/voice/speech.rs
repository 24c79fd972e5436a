//! One-shot speech playback
//!
//! Last request wins: a newer utterance silences the current one as soon as
//! its audio is ready, and a reply that arrives after a newer utterance
//! already started is discarded.

use std::cell::{Cell, RefCell};

use super::codec::{self, OUTPUT_FORMAT};
use super::device::OutputDevice;
use super::scheduler::PlaybackScheduler;
use super::tts::SpeechSynthesizer;
use crate::Error;
use crate::persona::VoiceProfile;

/// What became of one `speak` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// The utterance is playing
    Played,
    /// No audio: request failed, returned nothing, or was undecodable
    Silent,
    /// A newer utterance, or a shutdown, overtook this one
    Superseded,
}

/// Speaks text through its own output device
///
/// Not `Sync`: it lives on the event loop that drives it.
pub struct SpeechPlayer<S: SpeechSynthesizer, O: OutputDevice> {
    synthesizer: S,
    scheduler: RefCell<PlaybackScheduler<O>>,
    issued: Cell<u64>,
    playing: Cell<u64>,
    /// Tickets at or below this were issued before the last shutdown
    cutoff: Cell<u64>,
}

impl<S: SpeechSynthesizer, O: OutputDevice> SpeechPlayer<S, O> {
    #[must_use]
    pub fn new(synthesizer: S, output: O) -> Self {
        Self {
            synthesizer,
            scheduler: RefCell::new(PlaybackScheduler::new(output)),
            issued: Cell::new(0),
            playing: Cell::new(0),
            cutoff: Cell::new(0),
        }
    }

    /// Synthesize `text` and play it, preempting whatever is playing
    ///
    /// Never fails the caller; failures leave the player silent.
    pub async fn speak(&self, text: &str, profile: &VoiceProfile) -> SpeakOutcome {
        let ticket = self.issued.get() + 1;
        self.issued.set(ticket);

        let chunk = match self.synthesizer.synthesize(text, profile).await {
            Ok(chunk) => chunk,
            Err(Error::SynthesisEmpty) => {
                tracing::debug!(ticket, "synthesis returned no audio");
                return SpeakOutcome::Silent;
            }
            Err(e) => {
                tracing::warn!(ticket, error = %e, "speech synthesis failed");
                return SpeakOutcome::Silent;
            }
        };

        if ticket <= self.cutoff.get() || ticket < self.playing.get() {
            tracing::debug!(ticket, "stale utterance dropped");
            return SpeakOutcome::Superseded;
        }

        let frame = match codec::decode(&chunk, OUTPUT_FORMAT) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(ticket, error = %e, "dropping undecodable utterance");
                return SpeakOutcome::Silent;
            }
        };

        let mut scheduler = self.scheduler.borrow_mut();
        scheduler.interrupt();
        match scheduler.enqueue(&frame) {
            Ok(Some(entry)) => {
                self.playing.set(ticket);
                tracing::debug!(
                    ticket,
                    voice = profile.voice(),
                    duration_ms = entry.duration.as_millis(),
                    "speaking"
                );
                SpeakOutcome::Played
            }
            Ok(None) => SpeakOutcome::Silent,
            Err(e) => {
                tracing::warn!(ticket, error = %e, "speech playback failed");
                SpeakOutcome::Silent
            }
        }
    }

    /// Silence the current utterance
    pub fn stop(&self) {
        self.scheduler.borrow_mut().interrupt();
    }

    /// Whether an utterance is still playing
    pub fn is_playing(&self) -> bool {
        self.scheduler.borrow_mut().is_playing()
    }

    /// Stop playback and release the output device
    ///
    /// Replies still in flight are discarded when they arrive.
    pub fn shutdown(&self) {
        self.cutoff.set(self.issued.get());
        self.scheduler.borrow_mut().shutdown();
    }
}
