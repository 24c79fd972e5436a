//! Audio playback to speakers

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::codec::{AudioFrame, samples_to_duration};
use super::device::{OutputDevice, PlaybackHandle};
use crate::{Error, Result};

/// A buffer placed on the timeline at an absolute sample position
struct ScheduledBuffer {
    handle: PlaybackHandle,
    start: u64,
    samples: Arc<[f32]>,
}

impl ScheduledBuffer {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Sample-accurate mix of scheduled buffers, advanced by the output callback
#[derive(Default)]
struct Timeline {
    /// Frames rendered since the stream opened; this is the device clock
    position: u64,
    buffers: Vec<ScheduledBuffer>,
    finished: Vec<PlaybackHandle>,
}

impl Timeline {
    /// Fill `out` (interleaved, `channels` wide) and advance the clock
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut pos = self.position;

        for frame in out.chunks_mut(channels) {
            let mut value = 0.0;
            for buffer in &self.buffers {
                if pos >= buffer.start && pos < buffer.end() {
                    #[allow(clippy::cast_possible_truncation)]
                    let index = (pos - buffer.start) as usize;
                    value += buffer.samples[index];
                }
            }

            let value = value.clamp(-1.0, 1.0);
            frame.fill(value);
            pos += 1;
        }

        self.position = pos;

        let finished = &mut self.finished;
        self.buffers.retain(|buffer| {
            let done = buffer.end() <= pos;
            if done {
                finished.push(buffer.handle);
            }
            !done
        });
    }
}

/// Plays scheduled buffers on the default output device
///
/// The stream is opened lazily on the first `start` and closed on `release`.
pub struct CpalOutput {
    sample_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Create an output that plays at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            timeline: Arc::new(Mutex::new(Timeline::default())),
            stream: None,
        }
    }

    fn with_timeline<R>(&self, f: impl FnOnce(&mut Timeline) -> R) -> R {
        let mut timeline = self
            .timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut timeline)
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(self.sample_rate);
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                // Fallback: stereo, duplicating the mono signal
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        self.with_timeline(|t| *t = Timeline::default());
        let timeline = Arc::clone(&self.timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut timeline) = timeline.lock() {
                        timeline.render(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = self.sample_rate,
            channels,
            "audio playback opened"
        );

        self.stream = Some(stream);
        Ok(())
    }

    /// Convert a clock reading to the nearest sample position
    fn to_position(&self, at: Duration) -> u64 {
        let rate = u128::from(self.sample_rate);
        let samples = (at.as_nanos() * rate + 500_000_000) / 1_000_000_000;
        u64::try_from(samples).unwrap_or(u64::MAX)
    }
}

impl OutputDevice for CpalOutput {
    fn clock(&self) -> Duration {
        if self.stream.is_none() {
            return Duration::ZERO;
        }
        let position = self.with_timeline(|t| t.position);
        samples_to_duration(position, self.sample_rate)
    }

    fn start(&mut self, handle: PlaybackHandle, frame: &AudioFrame, at: Duration) -> Result<()> {
        if frame.sample_rate() != self.sample_rate {
            return Err(Error::Audio(format!(
                "frame rate {} does not match output rate {}",
                frame.sample_rate(),
                self.sample_rate
            )));
        }

        self.ensure_open()?;

        let buffer = ScheduledBuffer {
            handle,
            start: self.to_position(at),
            samples: frame.to_mono().into(),
        };
        self.with_timeline(|t| t.buffers.push(buffer));
        Ok(())
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.with_timeline(|t| t.buffers.retain(|b| b.handle != handle));
    }

    fn drain_finished(&mut self) -> Vec<PlaybackHandle> {
        self.with_timeline(|t| std::mem::take(&mut t.finished))
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback closed");
        }
        self.with_timeline(|t| *t = Timeline::default());
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.release();
    }
}
