//! Audio device seams
//!
//! The scheduler and capture pipeline talk to hardware only through these
//! traits, so both can be driven by scripted devices in tests.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use super::codec::{AudioFrame, PcmFormat};
use crate::Result;

/// Identity of one scheduled playback buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackHandle(pub u64);

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An output device with a monotonic clock onto which buffers are scheduled
pub trait OutputDevice {
    /// Current reading of the device clock
    ///
    /// Reads zero while the device is not open.
    fn clock(&self) -> Duration;

    /// Schedule `frame` to begin playing at `at` on the device clock
    ///
    /// Opens the device on first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the device cannot be opened or the frame
    /// does not match the device rate
    fn start(&mut self, handle: PlaybackHandle, frame: &AudioFrame, at: Duration) -> Result<()>;

    /// Stop a scheduled or playing buffer immediately
    fn stop(&mut self, handle: PlaybackHandle);

    /// Handles whose playback completed since the last call
    fn drain_finished(&mut self) -> Vec<PlaybackHandle>;

    /// Drop everything scheduled and close the device
    fn release(&mut self);
}

/// A capture device delivering raw sample blocks as they arrive
pub trait InputDevice {
    /// Acquire the device and stream mono blocks into `samples`
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureUnavailable` on permission or device failure
    fn open(&mut self, format: PcmFormat, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<()>;

    /// Release the device; a no-op when not open
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
