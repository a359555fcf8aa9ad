use crate::error::{Result, ToneDecodeError};
use serde::{Deserialize, Serialize};

/// Decoded mono audio handed to the decode engine.
///
/// Immutable once built: every decode call borrows it read-only, so one
/// buffer can be shared between threads without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate_hz: u32,
}

impl SampleBuffer {
    /// Build a buffer from mono samples normalized to [-1.0, 1.0]
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(ToneDecodeError::InvalidSampleRate(sample_rate_hz));
        }
        if samples.is_empty() {
            return Err(ToneDecodeError::EmptyBuffer);
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ToneDecodeError::InvalidInput(format!(
                "non-finite sample at index {}",
                pos
            )));
        }

        Ok(Self {
            samples,
            sample_rate_hz,
        })
    }

    /// Build a buffer from interleaved multi-channel samples by averaging
    /// the channels of every frame
    ///
    /// # Arguments
    /// * `interleaved` - Samples laid out as [c0, c1, .., c0, c1, ..]
    /// * `channels` - Number of channels per frame
    /// * `sample_rate_hz` - Frames per second
    pub fn from_interleaved(interleaved: &[f32], channels: u16, sample_rate_hz: u32) -> Result<Self> {
        if channels == 0 {
            return Err(ToneDecodeError::InvalidInput("zero channels".to_string()));
        }
        let channels = channels as usize;
        if interleaved.len() % channels != 0 {
            return Err(ToneDecodeError::InvalidInput(format!(
                "{} samples is not a whole number of {}-channel frames",
                interleaved.len(),
                channels
            )));
        }

        Self::new(downmix(interleaved, channels), sample_rate_hz)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed buffer; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }

    /// Convert seconds to a sample count at this buffer's rate
    pub fn seconds_to_samples(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate_hz as f64).round().max(0.0) as usize
    }
}

/// Average interleaved channels into mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks(channels) {
        let sum: f32 = frame.iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}

/// Half-open sample range `[start_sample, end_sample)` of a candidate tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneWindow {
    pub start_sample: usize,
    pub end_sample: usize,
}

impl ToneWindow {
    /// Returns None unless `start < end`
    pub fn new(start_sample: usize, end_sample: usize) -> Option<Self> {
        if start_sample < end_sample {
            Some(Self {
                start_sample,
                end_sample,
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.end_sample <= self.start_sample
    }

    pub fn duration_s(&self, sample_rate_hz: u32) -> f64 {
        self.len() as f64 / sample_rate_hz as f64
    }

    /// Borrow the window's samples, clamped to the buffer length
    pub fn slice<'a>(&self, buffer: &'a SampleBuffer) -> &'a [f32] {
        let end = self.end_sample.min(buffer.len());
        let start = self.start_sample.min(end);
        &buffer.samples()[start..end]
    }

    /// Central sub-window after trimming `trim_ratio` of the length from each
    /// edge and capping the result at `max_len` samples
    pub fn centered(&self, trim_ratio: f64, max_len: usize) -> ToneWindow {
        let len = self.len();
        let trim = ((len as f64) * trim_ratio.clamp(0.0, 0.45)).floor() as usize;
        let mut inner = len - 2 * trim;
        if max_len > 0 && inner > max_len {
            inner = max_len;
        }
        let start = self.start_sample + (len - inner) / 2;
        ToneWindow {
            start_sample: start,
            end_sample: start + inner,
        }
    }
}
