use crate::config::ConfidenceWeights;
use crate::goertzel::FrequencyEstimate;

/// Combines spectral purity and timing conformance into a single [0, 1] score
///
/// Every term is non-decreasing in its input and the weights are
/// non-negative, so a purer estimate or better timing never lowers the score.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
    min_magnitude: f64,
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights, min_magnitude: f64) -> Self {
        Self {
            weights,
            min_magnitude,
        }
    }

    pub fn score(
        &self,
        est1: Option<&FrequencyEstimate>,
        est2: Option<&FrequencyEstimate>,
        timing_conformance: f64,
    ) -> f64 {
        let p1 = self.purity_term(est1);
        let p2 = self.purity_term(est2);
        let timing = if timing_conformance.is_finite() {
            timing_conformance.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let total = self.weights.purity1 * p1 + self.weights.purity2 * p2 + self.weights.timing * timing;
        total.clamp(0.0, 1.0)
    }

    fn purity_term(&self, estimate: Option<&FrequencyEstimate>) -> f64 {
        match estimate {
            Some(est) if est.is_tone(self.min_magnitude) => purity_score(est.purity),
            _ => 0.0,
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ConfidenceWeights::default(), 0.0)
    }
}

/// Map a peak ratio (>= 1 for a real peak) onto [0, 1]
pub fn purity_score(purity: f64) -> f64 {
    if !(purity > 1.0) {
        return 0.0;
    }
    (1.0 - 1.0 / purity).clamp(0.0, 1.0)
}
