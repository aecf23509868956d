//! Threshold band configuration.
//!
//! Bands are data: an ordered list of `(lower_bound, label)` pairs with
//! bounds expressed in percent. The defaults match the alert tiers the
//! dashboard has always used.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One severity tier, triggered once a ratio reaches `lower_bound` percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdBand {
    /// Inclusive lower bound in percent.
    pub lower_bound: f64,

    /// Band label (e.g. "watch", "critical").
    pub label: String,
}

impl ThresholdBand {
    pub fn new(lower_bound: f64, label: impl Into<String>) -> Self {
        Self {
            lower_bound,
            label: label.into(),
        }
    }
}

/// The `[thresholds]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdBands {
    #[serde(default = "default_bands")]
    pub bands: Vec<ThresholdBand>,
}

fn default_bands() -> Vec<ThresholdBand> {
    vec![
        ThresholdBand::new(65.0, "watch"),
        ThresholdBand::new(75.0, "warning"),
        ThresholdBand::new(85.0, "critical"),
    ]
}

impl Default for ThresholdBands {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

impl ThresholdBands {
    pub fn new(bands: Vec<ThresholdBand>) -> Self {
        Self { bands }
    }

    /// Bands ordered from the highest lower bound to the lowest.
    pub fn highest_first(&self) -> Vec<&ThresholdBand> {
        let mut sorted: Vec<&ThresholdBand> = self.bands.iter().collect();
        sorted.sort_by(|a, b| b.lower_bound.total_cmp(&a.lower_bound));
        sorted
    }

    /// Look up a band by label.
    pub fn get(&self, label: &str) -> Option<&ThresholdBand> {
        self.bands.iter().find(|b| b.label == label)
    }

    /// The lowest configured bound, if any.
    pub fn lowest_bound(&self) -> Option<f64> {
        self.bands
            .iter()
            .map(|b| b.lower_bound)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_watch_warning_critical() {
        let bands = ThresholdBands::default();
        let pairs: Vec<(f64, &str)> = bands
            .bands
            .iter()
            .map(|b| (b.lower_bound, b.label.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![(65.0, "watch"), (75.0, "warning"), (85.0, "critical")]
        );
    }

    #[test]
    fn highest_first_ignores_declaration_order() {
        let bands = ThresholdBands::new(vec![
            ThresholdBand::new(75.0, "warning"),
            ThresholdBand::new(85.0, "critical"),
            ThresholdBand::new(65.0, "watch"),
        ]);
        let labels: Vec<&str> = bands
            .highest_first()
            .into_iter()
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(labels, vec!["critical", "warning", "watch"]);
        assert_eq!(bands.lowest_bound(), Some(65.0));
        assert_eq!(bands.get("warning").map(|b| b.lower_bound), Some(75.0));
    }
}
