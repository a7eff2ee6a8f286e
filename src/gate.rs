// Confidence gate
//
// Keeps a candidate iff its label is in the threshold map and its confidence
// meets that brand's threshold. Unknown labels are dropped silently: this is how
// only the selected brands are considered when the model knows more.

use crate::detector::Candidate;
use crate::thresholds::ThresholdMap;

pub fn passes(candidate: &Candidate, thresholds: &ThresholdMap) -> bool {
    thresholds
        .get(&candidate.label)
        .map(|threshold| candidate.confidence >= threshold)
        .unwrap_or(false)
}

/// Filter raw candidates, preserving detector order.
pub fn apply(candidates: Vec<Candidate>, thresholds: &ThresholdMap) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| passes(c, thresholds))
        .collect()
}
