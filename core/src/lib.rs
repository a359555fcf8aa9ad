//! Two-tone sequential paging decoder
//!
//! Locates a tone1 burst followed by a tone2 burst in a mono recording,
//! measures both frequencies with a Goertzel sweep and matches the pair
//! against a table of known units.

pub mod buffer;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod goertzel;
pub mod segment;
pub mod table;

pub use buffer::{SampleBuffer, ToneWindow};
pub use confidence::{purity_score, ConfidenceScorer};
pub use config::{AnalysisParams, ConfidenceWeights, DecodeConfig, EnvelopeParams, GapWindow, SegmentParams, SplitParams, ToneTiming};
pub use engine::{decode, DecodeEngine, DecodeOutcome, DecodeResult, DecodeStage, Detection};
pub use error::{Result, ToneDecodeError};
pub use goertzel::{FrequencyEstimate, GoertzelEstimator};
pub use segment::SegmentPair;
pub use table::{match_detections, match_entry, MatchedEntry, ToneTableEntry, ToneTableSnapshot, ToneTableSource};

// Search band
pub const DEFAULT_BAND_LO_HZ: f64 = 200.0;
pub const DEFAULT_BAND_HI_HZ: f64 = 3000.0;

// Sweep resolution
pub const DEFAULT_RESOLUTION_HZ: f64 = 0.1;
pub const MIN_RESOLUTION_HZ: f64 = 0.01;
pub const MAX_SWEEP_CANDIDATES: usize = 1_000_000; // per sweep stage

// Matching
pub const DEFAULT_TOLERANCE_HZ: f64 = 2.0;
