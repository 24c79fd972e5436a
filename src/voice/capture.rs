//! Audio capture from microphone
//!
//! The capture device pushes raw blocks into an unbounded channel; a
//! forwarder task cuts them into fixed-size frames, encodes each one and
//! hands it to a [`ChunkSink`]. The sink may apply backpressure, but no
//! frame is ever dropped while the pipeline runs.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::codec::{self, EncodedChunk, INPUT_FORMAT, PcmFormat};
use super::device::InputDevice;
use crate::{Error, Result};

/// Samples per capture frame (256 ms at 16 kHz)
pub const FRAME_LEN: usize = 4096;

/// Receives encoded capture frames in capture order
#[async_trait]
pub trait ChunkSink: Send + 'static {
    /// Deliver one chunk, waiting for capacity if needed
    ///
    /// Returns `false` once the sink can no longer accept chunks.
    async fn accept(&mut self, chunk: EncodedChunk) -> bool;
}

#[async_trait]
impl ChunkSink for mpsc::Sender<EncodedChunk> {
    async fn accept(&mut self, chunk: EncodedChunk) -> bool {
        self.send(chunk).await.is_ok()
    }
}

/// Cuts a stream of arbitrarily sized blocks into fixed-size frames
#[derive(Debug)]
pub struct Framer {
    frame_len: usize,
    pending: Vec<f32>,
}

impl Framer {
    #[must_use]
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Append `block` and return every frame it completes
    pub fn push(&mut self, block: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = block;

        while !rest.is_empty() {
            let take = (self.frame_len - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_len {
                frames.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_len),
                ));
            }
        }

        frames
    }

    /// Samples waiting for the next frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Microphone to sink pipeline
pub struct CapturePipeline<I: InputDevice> {
    device: I,
    format: PcmFormat,
    frame_len: usize,
    forwarder: Option<JoinHandle<()>>,
}

impl<I: InputDevice> CapturePipeline<I> {
    /// Create a pipeline capturing 16 kHz mono in `frame_len` frames
    #[must_use]
    pub fn new(device: I, frame_len: usize) -> Self {
        Self {
            device,
            format: INPUT_FORMAT,
            frame_len,
            forwarder: None,
        }
    }

    /// Acquire the input device and start delivering frames to `sink`
    ///
    /// Must be called from within a tokio runtime. A no-op if already
    /// running.
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureUnavailable` if the device cannot be acquired
    pub fn start<S: ChunkSink>(&mut self, mut sink: S) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<f32>>();
        self.device.open(self.format, tx)?;

        let format = self.format;
        let mut framer = Framer::new(self.frame_len);
        self.forwarder = Some(tokio::spawn(async move {
            let mut sent = 0u64;
            'blocks: while let Some(block) = rx.recv().await {
                for frame in framer.push(&block) {
                    let chunk = codec::encode(&frame, format);
                    if !sink.accept(chunk).await {
                        tracing::debug!(sent, "capture sink closed");
                        break 'blocks;
                    }
                    sent += 1;
                }
            }
            tracing::trace!(sent, "capture forwarder finished");
        }));

        tracing::debug!(frame_len = self.frame_len, "capture pipeline started");
        Ok(())
    }

    /// Release the input device and stop forwarding
    ///
    /// Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        let was_running = self.forwarder.is_some() || self.device.is_open();

        if self.device.is_open() {
            self.device.close();
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if was_running {
            tracing::debug!("capture pipeline stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.forwarder.is_some()
    }

    #[must_use]
    pub const fn device(&self) -> &I {
        &self.device
    }
}

impl<I: InputDevice> Drop for CapturePipeline<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Captures audio from the default input device
#[derive(Default)]
pub struct CpalInput {
    stream: Option<Stream>,
}

impl CpalInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputDevice for CpalInput {
    fn open(&mut self, format: PcmFormat, samples: mpsc::UnboundedSender<Vec<f32>>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnavailable("no input device available".to_string()))?;

        let rate = SampleRate(format.sample_rate);
        let supported = || {
            device
                .supported_input_configs()
                .map_err(|e| Error::CaptureUnavailable(e.to_string()))
        };
        let supported_config = supported()?
            .find(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                // Fallback: any channel count, keeping the first channel
                supported()
                    .ok()?
                    .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            })
            .ok_or_else(|| {
                Error::CaptureUnavailable("no suitable audio config found".to_string())
            })?;

        let config = supported_config.with_sample_rate(rate).config();
        let channels = usize::from(config.channels).max(1);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let block = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.iter().step_by(channels).copied().collect()
                    };
                    // Receiver gone means the pipeline is stopping
                    let _ = samples.send(block);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels,
            "audio capture opened"
        );

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Root-mean-square level of a block of samples
#[must_use]
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean.sqrt()
}
