use crate::error::{Result, ToneDecodeError};
use crate::{
    DEFAULT_BAND_HI_HZ, DEFAULT_BAND_LO_HZ, DEFAULT_RESOLUTION_HZ, DEFAULT_TOLERANCE_HZ,
    MAX_SWEEP_CANDIDATES, MIN_RESOLUTION_HZ,
};
use serde::{Deserialize, Serialize};

/// Everything a decode call needs besides the audio and the tone table.
///
/// Every field has a default, so a TOML file only has to name the values it
/// changes:
///
/// ```toml
/// tolerance_hz = 3.0
///
/// [segments.tone2]
/// nominal_s = 2.0
/// min_s = 1.5
/// max_s = 2.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Lower edge of the frequency search band
    pub band_lo_hz: f64,
    /// Upper edge of the frequency search band
    pub band_hi_hz: f64,
    /// Spacing of the fine frequency sweep
    pub resolution_hz: f64,
    /// Max deviation between a detected tone and a table entry
    pub tolerance_hz: f64,
    pub segments: SegmentParams,
    pub analysis: AnalysisParams,
    pub weights: ConfidenceWeights,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            band_lo_hz: DEFAULT_BAND_LO_HZ,
            band_hi_hz: DEFAULT_BAND_HI_HZ,
            resolution_hz: DEFAULT_RESOLUTION_HZ,
            tolerance_hz: DEFAULT_TOLERANCE_HZ,
            segments: SegmentParams::default(),
            analysis: AnalysisParams::default(),
            weights: ConfidenceWeights::default(),
        }
    }
}

impl DecodeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.band_lo_hz.is_finite() && self.band_lo_hz > 0.0) {
            return Err(invalid(format!("band_lo_hz must be positive, got {}", self.band_lo_hz)));
        }
        if !(self.band_hi_hz.is_finite() && self.band_hi_hz > self.band_lo_hz) {
            return Err(invalid(format!(
                "band_hi_hz ({}) must exceed band_lo_hz ({})",
                self.band_hi_hz, self.band_lo_hz
            )));
        }
        if !(self.resolution_hz.is_finite() && self.resolution_hz >= MIN_RESOLUTION_HZ) {
            return Err(invalid(format!(
                "resolution_hz must be at least {} Hz, got {}",
                MIN_RESOLUTION_HZ, self.resolution_hz
            )));
        }
        let candidates = (self.band_hi_hz - self.band_lo_hz) / self.resolution_hz;
        if candidates > MAX_SWEEP_CANDIDATES as f64 {
            return Err(invalid(format!(
                "sweep of {:.0} candidates exceeds the limit of {}",
                candidates, MAX_SWEEP_CANDIDATES
            )));
        }
        if !(self.tolerance_hz.is_finite() && self.tolerance_hz >= 0.0) {
            return Err(invalid(format!("tolerance_hz must be >= 0, got {}", self.tolerance_hz)));
        }

        self.segments.validate()?;
        self.analysis.validate()?;
        self.weights.validate()
    }
}

/// Timing and envelope parameters for the segment locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    pub tone1: ToneTiming,
    pub tone2: ToneTiming,
    pub gap: GapWindow,
    pub envelope: EnvelopeParams,
    pub split: SplitParams,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            tone1: ToneTiming::new(1.0, 0.6, 1.4),
            tone2: ToneTiming::new(3.0, 2.0, 4.0),
            gap: GapWindow {
                min_s: 0.0,
                max_s: 0.5,
            },
            envelope: EnvelopeParams::default(),
            split: SplitParams::default(),
        }
    }
}

impl SegmentParams {
    pub fn validate(&self) -> Result<()> {
        self.tone1.validate("tone1")?;
        self.tone2.validate("tone2")?;
        self.gap.validate()?;
        self.envelope.validate()?;
        self.split.validate()
    }
}

/// Expected duration of one tone and the band of accepted durations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneTiming {
    pub nominal_s: f64,
    pub min_s: f64,
    pub max_s: f64,
}

impl ToneTiming {
    pub fn new(nominal_s: f64, min_s: f64, max_s: f64) -> Self {
        Self {
            nominal_s,
            min_s,
            max_s,
        }
    }

    pub fn accepts(&self, duration_s: f64) -> bool {
        duration_s >= self.min_s && duration_s <= self.max_s
    }

    /// 1.0 at the nominal duration, falling linearly to 0.0 at the band edge
    /// on the side the duration deviates towards
    pub fn conformance(&self, duration_s: f64) -> f64 {
        let deviation = duration_s - self.nominal_s;
        let half_width = if deviation >= 0.0 {
            self.max_s - self.nominal_s
        } else {
            self.nominal_s - self.min_s
        };
        if half_width <= 0.0 {
            return if deviation == 0.0 { 1.0 } else { 0.0 };
        }
        (1.0 - deviation.abs() / half_width).clamp(0.0, 1.0)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let ordered = self.min_s >= 0.0 && self.min_s <= self.nominal_s && self.nominal_s <= self.max_s;
        if !(ordered && self.max_s > 0.0 && self.max_s.is_finite()) {
            return Err(invalid(format!(
                "{} timing must satisfy 0 <= min_s <= nominal_s <= max_s, got {:?}",
                name, self
            )));
        }
        Ok(())
    }
}

/// Accepted silence between the end of tone1 and the start of tone2
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapWindow {
    pub min_s: f64,
    pub max_s: f64,
}

impl GapWindow {
    pub fn accepts(&self, gap_s: f64) -> bool {
        gap_s >= self.min_s && gap_s <= self.max_s
    }

    /// 1.0 at `min_s`, falling linearly to 0.0 at `max_s`
    pub fn conformance(&self, gap_s: f64) -> f64 {
        if !self.accepts(gap_s) {
            return 0.0;
        }
        let width = self.max_s - self.min_s;
        if width <= 0.0 {
            return 1.0;
        }
        1.0 - (gap_s - self.min_s) / width
    }

    fn validate(&self) -> Result<()> {
        if !(self.min_s >= 0.0 && self.min_s <= self.max_s && self.max_s.is_finite()) {
            return Err(invalid(format!("gap must satisfy 0 <= min_s <= max_s, got {:?}", self)));
        }
        Ok(())
    }
}

/// Short-time energy envelope settings
///
/// A frame is active when its smoothed RMS exceeds
/// `noise_floor * floor_factor`, where the noise floor is the
/// `noise_percentile` quantile of the smoothed envelope. The result is kept
/// between `min_peak_ratio` and `max_peak_ratio` of the loudest frame and
/// never drops below `min_rms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    pub frame_ms: f64,
    pub hop_ms: f64,
    /// Quantile of the envelope taken as the noise floor
    pub noise_percentile: f64,
    pub floor_factor: f64,
    pub min_peak_ratio: f64,
    pub max_peak_ratio: f64,
    /// Absolute RMS floor; a clip quieter than this everywhere has no tones
    pub min_rms: f64,
    /// Running median length in frames (odd, 1 disables smoothing)
    pub median_kernel: usize,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            frame_ms: 20.0,
            hop_ms: 10.0,
            noise_percentile: 0.1,
            floor_factor: 2.0,
            min_peak_ratio: 0.1,
            max_peak_ratio: 0.5,
            min_rms: 1e-3,
            median_kernel: 3,
        }
    }
}

impl EnvelopeParams {
    fn validate(&self) -> Result<()> {
        if !(self.frame_ms > 0.0 && self.frame_ms.is_finite()) {
            return Err(invalid(format!("envelope frame_ms must be positive, got {}", self.frame_ms)));
        }
        if !(self.hop_ms > 0.0 && self.hop_ms <= self.frame_ms) {
            return Err(invalid(format!(
                "envelope hop_ms must be in (0, frame_ms], got {}",
                self.hop_ms
            )));
        }
        if !(self.noise_percentile >= 0.0 && self.noise_percentile < 1.0) {
            return Err(invalid(format!(
                "envelope noise_percentile must be in [0, 1), got {}",
                self.noise_percentile
            )));
        }
        if !(self.floor_factor >= 1.0 && self.floor_factor.is_finite()) {
            return Err(invalid(format!(
                "envelope floor_factor must be >= 1, got {}",
                self.floor_factor
            )));
        }
        let ordered = self.min_peak_ratio > 0.0 && self.min_peak_ratio <= self.max_peak_ratio;
        if !(ordered && self.max_peak_ratio < 1.0) {
            return Err(invalid(format!(
                "envelope peak ratios must satisfy 0 < min_peak_ratio <= max_peak_ratio < 1, got {} and {}",
                self.min_peak_ratio, self.max_peak_ratio
            )));
        }
        if !(self.min_rms >= 0.0 && self.min_rms.is_finite()) {
            return Err(invalid(format!("envelope min_rms must be >= 0, got {}", self.min_rms)));
        }
        if self.median_kernel == 0 || self.median_kernel % 2 == 0 {
            return Err(invalid(format!(
                "envelope median_kernel must be odd, got {}",
                self.median_kernel
            )));
        }
        Ok(())
    }
}

/// Cutting an active run where the dominant frequency moves
///
/// Tones that follow each other without a silent gap share one energy run;
/// a run is cut once `confirm_frames` consecutive frames agree on a
/// frequency more than `split_hz` away from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub split_hz: f64,
    pub confirm_frames: usize,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            split_hz: 10.0,
            confirm_frames: 3,
        }
    }
}

impl SplitParams {
    fn validate(&self) -> Result<()> {
        if !(self.split_hz > 0.0 && self.split_hz.is_finite()) {
            return Err(invalid(format!("split_hz must be positive, got {}", self.split_hz)));
        }
        if self.confirm_frames == 0 {
            return Err(invalid("split confirm_frames must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Which part of a located tone window is handed to the estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Fraction of the window dropped from each edge (onset/decay transients)
    pub edge_trim_ratio: f64,
    /// Longest analysed stretch, centered in the trimmed window
    pub max_window_s: f64,
    /// Estimates at or below this magnitude count as "no tone"
    pub min_magnitude: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            edge_trim_ratio: 0.1,
            max_window_s: 0.5,
            min_magnitude: 1e-4,
        }
    }
}

impl AnalysisParams {
    fn validate(&self) -> Result<()> {
        if !(self.edge_trim_ratio >= 0.0 && self.edge_trim_ratio < 0.45) {
            return Err(invalid(format!(
                "analysis edge_trim_ratio must be in [0, 0.45), got {}",
                self.edge_trim_ratio
            )));
        }
        if !(self.max_window_s > 0.0 && self.max_window_s.is_finite()) {
            return Err(invalid(format!(
                "analysis max_window_s must be positive, got {}",
                self.max_window_s
            )));
        }
        if !(self.min_magnitude >= 0.0 && self.min_magnitude.is_finite()) {
            return Err(invalid(format!(
                "analysis min_magnitude must be >= 0, got {}",
                self.min_magnitude
            )));
        }
        Ok(())
    }
}

/// Weights of the confidence terms; non-negative, not required to sum to one
/// (the score is clamped)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub purity1: f64,
    pub purity2: f64,
    pub timing: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            purity1: 0.4,
            purity2: 0.4,
            timing: 0.2,
        }
    }
}

impl ConfidenceWeights {
    fn validate(&self) -> Result<()> {
        let weights = [self.purity1, self.purity2, self.timing];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(invalid(format!("confidence weights must be >= 0, got {:?}", self)));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("confidence weights must not all be zero".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ToneDecodeError {
    ToneDecodeError::InvalidConfig(message)
}
