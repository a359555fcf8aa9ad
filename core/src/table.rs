use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One known unit: a label and the tone pair that pages it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneTableEntry {
    pub id: u64,
    pub label: String,
    pub tone1_hz: f64,
    pub tone2_hz: f64,
}

impl ToneTableEntry {
    pub fn new(id: u64, label: impl Into<String>, tone1_hz: f64, tone2_hz: f64) -> Self {
        Self {
            id,
            label: label.into(),
            tone1_hz,
            tone2_hz,
        }
    }

    /// Sum of absolute deviations from a detected pair
    pub fn deviation(&self, tone1_hz: f64, tone2_hz: f64) -> f64 {
        (self.tone1_hz - tone1_hz).abs() + (self.tone2_hz - tone2_hz).abs()
    }

    fn within(&self, tone1_hz: f64, tone2_hz: f64, tolerance_hz: f64) -> bool {
        (self.tone1_hz - tone1_hz).abs() <= tolerance_hz && (self.tone2_hz - tone2_hz).abs() <= tolerance_hz
    }
}

/// Reference to the matched entry as reported in a decode result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedEntry {
    pub id: u64,
    pub label: String,
}

impl From<&ToneTableEntry> for MatchedEntry {
    fn from(entry: &ToneTableEntry) -> Self {
        Self {
            id: entry.id,
            label: entry.label.clone(),
        }
    }
}

/// Point-in-time copy of the tone table
///
/// Cloning shares the entries; the owner bumps `version` on every change so
/// a result can be traced back to the table it was matched against.
#[derive(Debug, Clone)]
pub struct ToneTableSnapshot {
    pub version: u64,
    pub entries: Arc<[ToneTableEntry]>,
}

impl Default for ToneTableSnapshot {
    fn default() -> Self {
        Self::new(0, Vec::new())
    }
}

impl ToneTableSnapshot {
    pub fn new(version: u64, entries: Vec<ToneTableEntry>) -> Self {
        Self {
            version,
            entries: entries.into(),
        }
    }
}

/// Anything that can hand out a consistent snapshot of the tone table
pub trait ToneTableSource {
    fn snapshot(&self) -> ToneTableSnapshot;
}

impl ToneTableSource for ToneTableSnapshot {
    fn snapshot(&self) -> ToneTableSnapshot {
        self.clone()
    }
}

/// Best entry whose tones are both within `tolerance_hz` of the detected pair
///
/// Best means the smallest summed deviation; equal deviations go to the
/// lowest id, whatever order the table is in.
pub fn match_entry(
    tone1_hz: f64,
    tone2_hz: f64,
    table: &[ToneTableEntry],
    tolerance_hz: f64,
) -> Option<&ToneTableEntry> {
    if !(tone1_hz.is_finite() && tone2_hz.is_finite()) {
        return None;
    }

    table
        .iter()
        .filter(|entry| entry.within(tone1_hz, tone2_hz, tolerance_hz))
        .min_by(|a, b| {
            a.deviation(tone1_hz, tone2_hz)
                .total_cmp(&b.deviation(tone1_hz, tone2_hz))
                .then(a.id.cmp(&b.id))
        })
}

/// Match only when both tones were detected; never matches on one tone
pub fn match_detections(
    tone1_hz: Option<f64>,
    tone2_hz: Option<f64>,
    table: &[ToneTableEntry],
    tolerance_hz: f64,
) -> Option<&ToneTableEntry> {
    match (tone1_hz, tone2_hz) {
        (Some(t1), Some(t2)) => match_entry(t1, t2, table, tolerance_hz),
        _ => None,
    }
}
