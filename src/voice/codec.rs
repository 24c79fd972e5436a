//! 16-bit PCM codec
//!
//! Converts between normalized `f32` samples and the base64 transport
//! encoding used on the wire. Pure and stateless.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scale between normalized floats and signed 16-bit samples
const PCM_SCALE: f32 = 32768.0;

/// Sample rate and channel count of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Capture format sent to the service (16 kHz mono)
pub const INPUT_FORMAT: PcmFormat = PcmFormat::mono(16_000);

/// Playback format received from the service (24 kHz mono)
pub const OUTPUT_FORMAT: PcmFormat = PcmFormat::mono(24_000);

impl PcmFormat {
    /// Single-channel format at `sample_rate`
    #[must_use]
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// MIME tag for this format, e.g. `audio/pcm;rate=16000`
    #[must_use]
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!(
                "audio/pcm;rate={};channels={}",
                self.sample_rate, self.channels
            )
        }
    }

    /// Parse a MIME tag such as `audio/pcm;rate=24000` or
    /// `audio/L16;codec=pcm;rate=24000`
    ///
    /// Missing parameters are taken from `fallback`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Codec` for non-PCM types or malformed parameters
    pub fn from_mime(mime: &str, fallback: Self) -> Result<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next().unwrap_or_default().to_ascii_lowercase();
        if essence != "audio/pcm" && essence != "audio/l16" {
            return Err(Error::Codec(format!("unsupported audio type: {mime}")));
        }

        let mut format = fallback;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => {
                    format.sample_rate = value
                        .trim()
                        .parse()
                        .map_err(|_| Error::Codec(format!("bad rate in {mime}")))?;
                }
                "channels" => {
                    format.channels = value
                        .trim()
                        .parse()
                        .map_err(|_| Error::Codec(format!("bad channel count in {mime}")))?;
                }
                _ => {}
            }
        }

        if format.sample_rate == 0 || format.channels == 0 {
            return Err(Error::Codec(format!("degenerate format in {mime}")));
        }

        Ok(format)
    }
}

/// Wire representation of an audio frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    /// Encoding tag, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 of interleaved little-endian `i16` samples
    pub data: String,
}

/// Decoded audio: one plane of normalized samples per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    sample_rate: u32,
    planes: Vec<Vec<f32>>,
}

impl AudioFrame {
    /// Build a single-channel frame
    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            planes: vec![samples],
        }
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Samples per channel
    #[must_use]
    pub fn len(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of one channel
    #[must_use]
    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }

    /// Playback length, rounded to the nearest nanosecond
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.len() as u64, self.sample_rate)
    }

    /// Average all channels into one
    #[must_use]
    pub fn to_mono(&self) -> Vec<f32> {
        match self.planes.as_slice() {
            [] => Vec::new(),
            [only] => only.clone(),
            planes => {
                #[allow(clippy::cast_precision_loss)]
                let count = planes.len() as f32;
                (0..self.len())
                    .map(|i| planes.iter().map(|p| p[i]).sum::<f32>() / count)
                    .collect()
            }
        }
    }
}

/// Convert a sample count at `sample_rate` into a `Duration`
#[must_use]
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u128::from(sample_rate);
    let nanos = (u128::from(samples) * 1_000_000_000 + rate / 2) / rate;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Quantize one normalized sample to `i16`
///
/// Scales by 32768 and saturates; the float-to-int cast truncates toward zero.
#[allow(clippy::cast_possible_truncation)]
fn quantize(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i16
}

/// Encode mono samples in `[-1, 1]` for transmission
#[must_use]
pub fn encode(samples: &[f32], format: PcmFormat) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }

    EncodedChunk {
        mime_type: format.mime_type(),
        data: STANDARD.encode(bytes),
    }
}

/// Decode a received chunk into per-channel float planes
///
/// Parameters absent from the chunk's MIME tag are taken from `fallback`.
///
/// # Errors
///
/// Returns `Error::Codec` if the payload is not valid base64, is not a whole
/// number of sample frames, or carries an unsupported MIME type
pub fn decode(chunk: &EncodedChunk, fallback: PcmFormat) -> Result<AudioFrame> {
    let format = PcmFormat::from_mime(&chunk.mime_type, fallback)?;
    let bytes = STANDARD
        .decode(chunk.data.as_bytes())
        .map_err(|e| Error::Codec(format!("invalid base64: {e}")))?;

    let channels = usize::from(format.channels);
    let frame_bytes = 2 * channels;
    if bytes.len() % frame_bytes != 0 {
        return Err(Error::Codec(format!(
            "payload of {} bytes is not a multiple of {frame_bytes}",
            bytes.len()
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planes[i % channels].push(f32::from(sample) / PCM_SCALE);
    }

    Ok(AudioFrame {
        sample_rate: format.sample_rate,
        planes,
    })
}
