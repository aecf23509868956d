//! Threshold band evaluation.

use mlr_config::{ThresholdBand, ThresholdBands};

/// The single highest band whose lower bound is at or below `ratio`.
///
/// Bands are checked from the highest bound down, so a ratio above the top
/// band never also yields the lower ones. Non-finite ratios match nothing.
pub fn evaluate(ratio: f64, bands: &ThresholdBands) -> Option<&ThresholdBand> {
    if !ratio.is_finite() {
        return None;
    }
    bands
        .highest_first()
        .into_iter()
        .find(|band| band.lower_bound <= ratio)
}
