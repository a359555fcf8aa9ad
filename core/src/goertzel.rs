//! Goertzel-based dominant frequency estimator
//!
//! Sweeps a band of candidate frequencies and evaluates the single-bin
//! Goertzel magnitude of the window at each one. The target frequency is
//! used as-is (no rounding to an FFT bin centre), so a sweep can land on
//! any frequency the resolution allows.
//!
//! Sweep layout:
//! - Coarse pass across the whole band, spaced at the finer of half a DFT bin
//!   and the requested resolution
//! - Fine pass at the requested resolution, one coarse step either side of
//!   the coarse peak
//! - Parabolic interpolation over the three fine samples around the maximum

use crate::MAX_SWEEP_CANDIDATES;
use log::trace;
use std::f64::consts::PI;

/// Purity reported when no competing peak exists outside the exclusion zone
pub const PURITY_CEILING: f64 = 1000.0;

/// Competing peaks closer than this many DFT bins to the primary are part of
/// its main lobe or near sidelobes and are ignored for purity
const PEAK_EXCLUSION_BINS: f64 = 8.0;

/// Magnitudes at or below this are numerical silence
const MAGNITUDE_FLOOR: f64 = 1e-12;

/// Dominant frequency of one analysed window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyEstimate {
    pub frequency_hz: f64,
    /// Normalized so a full-window sine of amplitude A reads about A / 2
    pub magnitude: f64,
    /// Peak magnitude over the next-largest local peak, capped at `PURITY_CEILING`
    pub purity: f64,
}

impl FrequencyEstimate {
    /// No resolvable tone in the window
    pub fn absent() -> Self {
        Self {
            frequency_hz: 0.0,
            magnitude: 0.0,
            purity: 0.0,
        }
    }

    pub fn is_tone(&self, min_magnitude: f64) -> bool {
        self.frequency_hz > 0.0 && self.magnitude > min_magnitude.max(MAGNITUDE_FLOOR)
    }
}

/// Compute the DFT magnitude of `samples` at exactly `freq_hz`
pub fn goertzel_magnitude(samples: &[f64], sample_rate_hz: f64, freq_hz: f64) -> f64 {
    let omega = 2.0 * PI * freq_hz / sample_rate_hz;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0;
    let mut q2 = 0.0;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    let power = q1 * q1 + q2 * q2 - coeff * q1 * q2;
    power.max(0.0).sqrt()
}

/// Estimate the dominant frequency of `window` within `[band_lo_hz, band_hi_hz]`
pub fn estimate(
    window: &[f32],
    sample_rate_hz: u32,
    band_lo_hz: f64,
    band_hi_hz: f64,
    resolution_hz: f64,
) -> FrequencyEstimate {
    GoertzelEstimator::new(sample_rate_hz, band_lo_hz, band_hi_hz, resolution_hz).estimate(window)
}

#[derive(Debug, Clone, Copy)]
pub struct GoertzelEstimator {
    sample_rate_hz: f64,
    band_lo_hz: f64,
    band_hi_hz: f64,
    resolution_hz: f64,
}

impl GoertzelEstimator {
    /// The upper band edge is pulled below Nyquist for the given sample rate
    pub fn new(sample_rate_hz: u32, band_lo_hz: f64, band_hi_hz: f64, resolution_hz: f64) -> Self {
        let sample_rate_hz = sample_rate_hz as f64;
        let nyquist = sample_rate_hz / 2.0;
        Self {
            sample_rate_hz,
            band_lo_hz,
            band_hi_hz: band_hi_hz.min(nyquist - resolution_hz.max(0.0)),
            resolution_hz,
        }
    }

    pub fn estimate(&self, window: &[f32]) -> FrequencyEstimate {
        let lo = self.band_lo_hz;
        let hi = self.band_hi_hz;
        if !(lo > 0.0 && hi > lo && self.resolution_hz > 0.0 && self.sample_rate_hz > 0.0) {
            return FrequencyEstimate::absent();
        }

        // Less than one period of the lowest band frequency cannot resolve it
        let min_len = (self.sample_rate_hz / lo).ceil() as usize;
        if window.len() < min_len.max(3) {
            trace!("window of {} samples shorter than {} needed", window.len(), min_len);
            return FrequencyEstimate::absent();
        }

        let (conditioned, weight_sum) = condition(window);
        if weight_sum <= 0.0 {
            return FrequencyEstimate::absent();
        }

        let bin_hz = self.sample_rate_hz / window.len() as f64;
        let coarse_step = self.resolution_hz.max(bin_hz / 2.0);
        let count = (((hi - lo) / coarse_step).floor() as usize + 1).min(MAX_SWEEP_CANDIDATES);

        let freq_at = |i: usize| lo + i as f64 * coarse_step;
        let magnitudes: Vec<f64> = (0..count)
            .map(|i| self.magnitude(&conditioned, freq_at(i), weight_sum))
            .collect();

        let peak_idx = argmax(&magnitudes);
        let peak_mag = magnitudes[peak_idx];
        if peak_mag <= MAGNITUDE_FLOOR {
            return FrequencyEstimate::absent();
        }
        let peak_freq = freq_at(peak_idx);

        let exclusion_hz = self.resolution_hz.max(PEAK_EXCLUSION_BINS * bin_hz);
        let competitor = (1..count.saturating_sub(1))
            .filter(|&i| magnitudes[i] > magnitudes[i - 1] && magnitudes[i] > magnitudes[i + 1])
            .filter(|&i| (freq_at(i) - peak_freq).abs() >= exclusion_hz)
            .map(|i| magnitudes[i])
            .fold(0.0f64, f64::max);

        let purity = if competitor > MAGNITUDE_FLOOR {
            (peak_mag / competitor).min(PURITY_CEILING)
        } else {
            PURITY_CEILING
        };

        let (frequency_hz, magnitude) = if coarse_step > self.resolution_hz {
            self.refine(&conditioned, peak_freq, coarse_step, weight_sum)
        } else {
            let offset = neighbours(&magnitudes, peak_idx)
                .map(|(a, b, c)| parabolic_offset(a, b, c))
                .unwrap_or(0.0);
            (peak_freq + offset * coarse_step, peak_mag)
        };

        trace!(
            "coarse peak {:.2} Hz ({} candidates), refined {:.3} Hz, purity {:.1}",
            peak_freq,
            count,
            frequency_hz,
            purity
        );

        FrequencyEstimate {
            frequency_hz: frequency_hz.clamp(lo, hi),
            magnitude,
            purity,
        }
    }

    /// Fine sweep at the requested resolution around a coarse peak
    fn refine(&self, conditioned: &[f64], center_hz: f64, span_hz: f64, weight_sum: f64) -> (f64, f64) {
        let steps = ((2.0 * span_hz) / self.resolution_hz).round() as usize;
        let steps = steps.min(MAX_SWEEP_CANDIDATES);
        let start = center_hz - span_hz;

        let freq_at = |j: usize| start + j as f64 * self.resolution_hz;
        let magnitudes: Vec<f64> = (0..=steps)
            .map(|j| self.magnitude(conditioned, freq_at(j), weight_sum))
            .collect();

        let best = argmax(&magnitudes);
        let offset = neighbours(&magnitudes, best)
            .map(|(a, b, c)| parabolic_offset(a, b, c))
            .unwrap_or(0.0);

        (freq_at(best) + offset * self.resolution_hz, magnitudes[best])
    }

    fn magnitude(&self, conditioned: &[f64], freq_hz: f64, weight_sum: f64) -> f64 {
        goertzel_magnitude(conditioned, self.sample_rate_hz, freq_hz) / weight_sum
    }
}

/// Remove DC and apply a raised-cosine window; returns the samples and the
/// sum of window weights used for magnitude normalization
fn condition(window: &[f32]) -> (Vec<f64>, f64) {
    let len = window.len();
    let mean = window.iter().map(|&s| s as f64).sum::<f64>() / len as f64;
    let weights = raised_cosine_window(len, len / 2);
    let weight_sum = weights.iter().sum::<f64>();

    let conditioned = window
        .iter()
        .zip(weights.iter())
        .map(|(&s, &w)| (s as f64 - mean) * w)
        .collect();

    (conditioned, weight_sum)
}

/// Raised-cosine window with `taper_len` samples of attack and decay
fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f64> {
    let taper = taper_len.min(len / 2);
    let mut window = vec![1.0; len];
    if taper == 0 {
        return window;
    }

    for i in 0..taper {
        let progress = (i as f64 + 0.5) / taper as f64;
        let value = (PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn neighbours(values: &[f64], idx: usize) -> Option<(f64, f64, f64)> {
    if idx == 0 || idx + 1 >= values.len() {
        return None;
    }
    Some((values[idx - 1], values[idx], values[idx + 1]))
}

/// Vertex of the parabola through three equally spaced samples, in steps
/// relative to the middle one
fn parabolic_offset(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom >= 0.0 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / RATE as f64).sin()) as f32)
            .collect()
    }

    /// Simple PRNG for reproducible noise
    fn simple_rand(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((*seed >> 32) as f64) / (u32::MAX as f64) * 2.0 - 1.0
    }

    #[test]
    fn test_goertzel_peaks_at_non_bin_aligned_frequency() {
        let samples: Vec<f64> = sine(1234.56, 0.5, 4000).into_iter().map(f64::from).collect();
        let at_target = goertzel_magnitude(&samples, RATE as f64, 1234.56);

        // Half a hertz either side is still inside the main lobe but lower
        for offset in [-0.5, 0.5] {
            let near = goertzel_magnitude(&samples, RATE as f64, 1234.56 + offset);
            assert!(at_target > near, "target {} vs {:+} Hz {}", at_target, offset, near);
        }

        // One full bin (2 Hz for 4000 samples at 8 kHz) away sits on a null
        for offset in [-2.0, 2.0] {
            let null = goertzel_magnitude(&samples, RATE as f64, 1234.56 + offset);
            assert!(at_target > 10.0 * null, "target {} vs {:+} Hz {}", at_target, offset, null);
        }
    }

    #[test]
    fn test_estimate_pure_tone_frequency() {
        for &freq in &[288.5, 697.3, 1153.4, 2468.9] {
            let window = sine(freq, 0.5, 4000);
            let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
            assert!(
                (est.frequency_hz - freq).abs() < 0.25,
                "expected {} Hz, got {} Hz",
                freq,
                est.frequency_hz
            );
            assert!(est.is_tone(1e-4));
        }
    }

    #[test]
    fn test_estimate_magnitude_scale() {
        let window = sine(1000.0, 0.5, 4000);
        let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
        assert!((est.magnitude - 0.25).abs() < 0.02, "magnitude {}", est.magnitude);
    }

    #[test]
    fn test_pure_tone_has_ceiling_purity() {
        let window = sine(900.0, 0.5, 4000);
        let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
        assert!(est.purity > 100.0, "purity {}", est.purity);
    }

    #[test]
    fn test_purity_reflects_competing_tone() {
        let strong = sine(800.0, 0.5, 4000);
        let weak = sine(1500.0, 0.25, 4000);
        let mixed: Vec<f32> = strong.iter().zip(weak.iter()).map(|(a, b)| a + b).collect();

        let est = estimate(&mixed, RATE, 200.0, 3000.0, 0.1);
        assert!((est.frequency_hz - 800.0).abs() < 0.25);
        assert!(est.purity > 1.6 && est.purity < 2.4, "purity {}", est.purity);
    }

    #[test]
    fn test_noise_lowers_purity() {
        let clean = sine(1100.0, 0.5, 4000);
        let mut seed = 12345u64;
        let noisy: Vec<f32> = clean
            .iter()
            .map(|&s| s + (simple_rand(&mut seed) * 0.2) as f32)
            .collect();

        let clean_est = estimate(&clean, RATE, 200.0, 3000.0, 0.1);
        let noisy_est = estimate(&noisy, RATE, 200.0, 3000.0, 0.1);
        assert!(noisy_est.purity < clean_est.purity);
        assert!((noisy_est.frequency_hz - 1100.0).abs() < 0.5);
    }

    #[test]
    fn test_window_shorter_than_one_period_is_absent() {
        // One period of 200 Hz at 8 kHz is 40 samples
        let window = sine(1000.0, 0.5, 30);
        let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
        assert_eq!(est.magnitude, 0.0);
        assert!(!est.is_tone(0.0));
    }

    #[test]
    fn test_silence_is_absent() {
        let window = vec![0.0f32; 4000];
        let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
        assert!(!est.is_tone(1e-4));
    }

    #[test]
    fn test_dc_offset_ignored() {
        let window: Vec<f32> = sine(650.0, 0.4, 4000).into_iter().map(|s| s + 0.3).collect();
        let est = estimate(&window, RATE, 200.0, 3000.0, 0.1);
        assert!((est.frequency_hz - 650.0).abs() < 0.25);
    }

    #[test]
    fn test_band_clamped_below_nyquist() {
        // 3000 Hz band edge is above Nyquist at 4 kHz sampling; must not panic
        let low_rate = 4000;
        let window: Vec<f32> = (0..2000)
            .map(|i| (0.5 * (2.0 * PI * 1500.0 * i as f64 / low_rate as f64).sin()) as f32)
            .collect();
        let est = estimate(&window, low_rate, 200.0, 3000.0, 0.1);
        assert!((est.frequency_hz - 1500.0).abs() < 0.5);
    }

    #[test]
    fn test_parabolic_offset() {
        assert_eq!(parabolic_offset(1.0, 2.0, 1.0), 0.0);
        assert!(parabolic_offset(1.5, 2.0, 1.0) < 0.0);
        assert!(parabolic_offset(1.0, 2.0, 1.5) > 0.0);
        // Not a maximum
        assert_eq!(parabolic_offset(2.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn test_raised_cosine_window() {
        let window = raised_cosine_window(100, 10);
        assert_eq!(window.len(), 100);
        assert!(window[0] < 0.1, "Window should start near 0");
        assert!(window[9] > 0.9, "Window should reach 1.0");
        assert_eq!(window[50], 1.0, "Window should be 1.0 in middle");
        assert!(window[99] < 0.1, "Window should end near 0");
    }
}
