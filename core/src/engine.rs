use crate::buffer::{SampleBuffer, ToneWindow};
use crate::confidence::ConfidenceScorer;
use crate::config::DecodeConfig;
use crate::error::{Result, ToneDecodeError};
use crate::goertzel::{FrequencyEstimate, GoertzelEstimator};
use crate::segment::{self, SegmentPair};
use crate::table::{match_detections, MatchedEntry, ToneTableEntry, ToneTableSnapshot};
use log::debug;
use serde::{Deserialize, Serialize};

/// Whether a tone slot produced a frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Detection {
    Detected(f64),
    NotDetected,
}

impl Detection {
    pub fn hz(&self) -> Option<f64> {
        match *self {
            Detection::Detected(hz) => Some(hz),
            Detection::NotDetected => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Detected(_))
    }

    fn is_not_detected(&self) -> bool {
        !self.is_detected()
    }
}

impl Default for Detection {
    fn default() -> Self {
        Detection::NotDetected
    }
}

impl From<Option<f64>> for Detection {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Detection::NotDetected, Detection::Detected)
    }
}

impl From<Detection> for Option<f64> {
    fn from(value: Detection) -> Self {
        value.hz()
    }
}

/// Terminal classification of one decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOutcome {
    /// No tone1 segment located
    NoSequence,
    /// Tone1 without a qualifying tone2
    Incomplete,
    /// Both tones, nothing in the table within tolerance
    Unmatched,
    Matched,
}

impl DecodeOutcome {
    pub fn message(&self, label: Option<&str>) -> String {
        match self {
            DecodeOutcome::NoSequence => "No two-tone sequence detected.".to_string(),
            DecodeOutcome::Incomplete => "Only one tone detected; sequence incomplete.".to_string(),
            DecodeOutcome::Unmatched => "Tones detected but no matching entry in database.".to_string(),
            DecodeOutcome::Matched => format!("Tones detected and matched to {}.", label.unwrap_or("")),
        }
    }
}

/// Progress of a single decode, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    AwaitingTone1,
    Tone1Found,
    AwaitingTone2,
    Tone2Found,
    Scored,
    Matched,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    #[serde(rename = "tone1_detected_hz", default, skip_serializing_if = "Detection::is_not_detected")]
    pub tone1: Detection,
    #[serde(rename = "tone2_detected_hz", default, skip_serializing_if = "Detection::is_not_detected")]
    pub tone2: Detection,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_entry: Option<MatchedEntry>,
    pub outcome: DecodeOutcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone1_window: Option<ToneWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone2_window: Option<ToneWindow>,
    #[serde(default)]
    pub table_version: u64,
}

impl DecodeResult {
    fn no_sequence(table_version: u64) -> Self {
        Self {
            tone1: Detection::NotDetected,
            tone2: Detection::NotDetected,
            confidence: 0.0,
            matched_entry: None,
            outcome: DecodeOutcome::NoSequence,
            message: DecodeOutcome::NoSequence.message(None),
            tone1_window: None,
            tone2_window: None,
            table_version,
        }
    }
}

/// Runs the locate -> estimate -> score -> match pipeline
///
/// Holds only validated configuration, so one engine can serve any number
/// of concurrent decodes.
#[derive(Debug, Clone)]
pub struct DecodeEngine {
    config: DecodeConfig,
    scorer: ConfidenceScorer,
}

impl DecodeEngine {
    pub fn new(config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        let scorer = ConfidenceScorer::new(config.weights, config.analysis.min_magnitude);
        Ok(Self { config, scorer })
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode against a versioned table snapshot
    pub fn decode_snapshot(&self, buffer: &SampleBuffer, snapshot: &ToneTableSnapshot) -> Result<DecodeResult> {
        self.run(buffer, &snapshot.entries, snapshot.version)
    }

    pub fn decode(&self, buffer: &SampleBuffer, table: &[ToneTableEntry]) -> Result<DecodeResult> {
        self.run(buffer, table, 0)
    }

    fn run(&self, buffer: &SampleBuffer, table: &[ToneTableEntry], table_version: u64) -> Result<DecodeResult> {
        if buffer.sample_rate_hz() == 0 {
            return Err(ToneDecodeError::InvalidSampleRate(0));
        }
        if buffer.is_empty() {
            return Err(ToneDecodeError::EmptyBuffer);
        }

        let rate = buffer.sample_rate_hz();
        let estimator = GoertzelEstimator::new(
            rate,
            self.config.band_lo_hz,
            self.config.band_hi_hz,
            self.config.resolution_hz,
        );
        let mut stage = DecodeStage::AwaitingTone1;
        debug!(
            "decoding {:.2} s at {} Hz against {} table entries",
            buffer.duration_s(),
            rate,
            table.len()
        );

        let located = segment::locate(
            buffer,
            &self.config.segments,
            self.config.band_lo_hz,
            self.config.band_hi_hz,
        );

        let Some((window1, est1)) = located.tone1.and_then(|w| self.analyse(&estimator, buffer, w)) else {
            debug!("{:?}: no tone1", stage);
            return Ok(DecodeResult::no_sequence(table_version));
        };
        stage = advance(stage, DecodeStage::Tone1Found);
        debug!(
            "tone1 {:.2} Hz in samples {}..{} (purity {:.1})",
            est1.frequency_hz,
            window1.start_sample,
            window1.end_sample,
            est1.purity
        );
        stage = advance(stage, DecodeStage::AwaitingTone2);

        let second = located.tone2.and_then(|w| self.analyse(&estimator, buffer, w));
        let Some((window2, est2)) = second else {
            let partial = SegmentPair {
                tone1: Some(window1),
                tone2: None,
            };
            let timing = segment::timing_conformance(&partial, rate, &self.config.segments);
            let confidence = self.scorer.score(Some(&est1), None, timing);
            debug!("{:?}: no qualifying tone2, confidence {:.3}", stage, confidence);

            return Ok(DecodeResult {
                tone1: Detection::Detected(est1.frequency_hz),
                tone2: Detection::NotDetected,
                confidence,
                matched_entry: None,
                outcome: DecodeOutcome::Incomplete,
                message: DecodeOutcome::Incomplete.message(None),
                tone1_window: Some(window1),
                tone2_window: None,
                table_version,
            });
        };
        stage = advance(stage, DecodeStage::Tone2Found);
        debug!(
            "tone2 {:.2} Hz in samples {}..{} (purity {:.1})",
            est2.frequency_hz,
            window2.start_sample,
            window2.end_sample,
            est2.purity
        );

        let pair = SegmentPair {
            tone1: Some(window1),
            tone2: Some(window2),
        };
        let timing = segment::timing_conformance(&pair, rate, &self.config.segments);
        let confidence = self.scorer.score(Some(&est1), Some(&est2), timing);
        stage = advance(stage, DecodeStage::Scored);

        let tone1 = Detection::Detected(est1.frequency_hz);
        let tone2 = Detection::Detected(est2.frequency_hz);
        let matched = match_detections(tone1.hz(), tone2.hz(), table, self.config.tolerance_hz);
        let outcome = match matched {
            Some(_) => {
                advance(stage, DecodeStage::Matched);
                DecodeOutcome::Matched
            }
            None => {
                advance(stage, DecodeStage::Unmatched);
                DecodeOutcome::Unmatched
            }
        };

        Ok(DecodeResult {
            tone1,
            tone2,
            confidence,
            matched_entry: matched.map(MatchedEntry::from),
            outcome,
            message: outcome.message(matched.map(|e| e.label.as_str())),
            tone1_window: Some(window1),
            tone2_window: Some(window2),
            table_version,
        })
    }

    /// Estimate the tone in the centre of a located window; None when the
    /// window holds nothing resolvable
    fn analyse(
        &self,
        estimator: &GoertzelEstimator,
        buffer: &SampleBuffer,
        window: ToneWindow,
    ) -> Option<(ToneWindow, FrequencyEstimate)> {
        let analysis = &self.config.analysis;
        let max_len = buffer.seconds_to_samples(analysis.max_window_s);
        let core = window.centered(analysis.edge_trim_ratio, max_len);
        let estimate = estimator.estimate(core.slice(buffer));

        if estimate.is_tone(analysis.min_magnitude) {
            Some((window, estimate))
        } else {
            debug!(
                "window {}..{} has no resolvable tone (magnitude {:.2e})",
                window.start_sample,
                window.end_sample,
                estimate.magnitude
            );
            None
        }
    }
}

fn advance(from: DecodeStage, to: DecodeStage) -> DecodeStage {
    debug!("{:?} -> {:?}", from, to);
    to
}

/// Decode `buffer` against `table` with `config`
///
/// The only failures are malformed input and invalid configuration; "no
/// tones" and "no match" are ordinary results.
pub fn decode(buffer: &SampleBuffer, table: &[ToneTableEntry], config: &DecodeConfig) -> Result<DecodeResult> {
    DecodeEngine::new(config.clone())?.decode(buffer, table)
}
