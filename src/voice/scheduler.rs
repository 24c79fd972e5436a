//! Gapless playback scheduling
//!
//! Places decoded frames back-to-back on the output device clock so a
//! stream of response chunks plays continuously, in arrival order, no
//! matter how bursty the network delivers them.

use std::collections::BTreeMap;
use std::time::Duration;

use super::codec::AudioFrame;
use super::device::{OutputDevice, PlaybackHandle};
use crate::Result;

/// A frame placed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEntry {
    pub handle: PlaybackHandle,
    /// Start time on the device clock
    pub start_at: Duration,
    pub duration: Duration,
}

impl PlaybackEntry {
    #[must_use]
    pub fn end_at(&self) -> Duration {
        self.start_at + self.duration
    }
}

/// Schedules frames onto one output device
pub struct PlaybackScheduler<O: OutputDevice> {
    device: O,
    next_start: Duration,
    live: BTreeMap<PlaybackHandle, PlaybackEntry>,
    next_handle: u64,
    released: bool,
}

impl<O: OutputDevice> PlaybackScheduler<O> {
    /// Create a scheduler owning `device`
    #[must_use]
    pub fn new(device: O) -> Self {
        let next_start = device.clock();
        Self {
            device,
            next_start,
            live: BTreeMap::new(),
            next_handle: 0,
            released: false,
        }
    }

    /// Start a fresh timeline at the current device clock
    pub fn reset(&mut self) {
        self.interrupt();
        self.released = false;
    }

    /// Schedule `frame` right after everything already queued
    ///
    /// Never schedules into the past: if the queue has drained, the frame
    /// starts at the current device clock. Empty frames are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the output device rejects the frame
    pub fn enqueue(&mut self, frame: &AudioFrame) -> Result<Option<PlaybackEntry>> {
        self.reap();
        if frame.is_empty() {
            return Ok(None);
        }

        let start_at = self.next_start.max(self.device.clock());
        let handle = PlaybackHandle(self.next_handle);
        self.next_handle += 1;

        self.device.start(handle, frame, start_at)?;
        self.released = false;

        let entry = PlaybackEntry {
            handle,
            start_at,
            duration: frame.duration(),
        };
        self.next_start = entry.end_at();
        self.live.insert(handle, entry);

        tracing::trace!(
            %handle,
            start_ms = start_at.as_millis(),
            duration_ms = entry.duration.as_millis(),
            live = self.live.len(),
            "frame scheduled"
        );

        Ok(Some(entry))
    }

    /// Barge-in: stop everything now and restart the timeline at "now"
    pub fn interrupt(&mut self) {
        let stopped = self.stop_all();
        self.device.drain_finished();
        self.next_start = self.device.clock();

        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
    }

    /// Stop all playback and release the output device
    ///
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.released && self.live.is_empty() {
            return;
        }

        let stopped = self.stop_all();
        self.device.release();
        self.next_start = Duration::ZERO;
        self.released = true;

        tracing::debug!(stopped, "playback scheduler shut down");
    }

    /// Forget handles the device reports as finished
    pub fn reap(&mut self) {
        for handle in self.device.drain_finished() {
            self.live.remove(&handle);
        }
    }

    /// Entries scheduled but not yet finished
    pub fn live_entries(&mut self) -> Vec<PlaybackEntry> {
        self.reap();
        self.live.values().copied().collect()
    }

    /// Whether anything is still scheduled or playing
    pub fn is_playing(&mut self) -> bool {
        self.reap();
        !self.live.is_empty()
    }

    /// Start time the next enqueued frame would get if the clock stood still
    #[must_use]
    pub const fn next_start(&self) -> Duration {
        self.next_start
    }

    #[must_use]
    pub const fn device(&self) -> &O {
        &self.device
    }

    fn stop_all(&mut self) -> usize {
        let count = self.live.len();
        for handle in std::mem::take(&mut self.live).into_keys() {
            self.device.stop(handle);
        }
        count
    }
}
