//! Per-ROI noise level and hysteresis thresholds.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coarse classification of an ROI's baseline variability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NoiseLevel {
    Low,
    High,
    /// Baseline SD was unusable (non-finite or zero).
    Unknown,
}

impl NoiseLevel {
    /// Label used in reports and plot annotations.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for NoiseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for one ROI, all in ΔF/F units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdSet {
    /// `standard_deviation * sd_multiplier`.
    pub basic_threshold: f64,
    /// Level that must be exceeded to open an event.
    pub upper_threshold: f64,
    /// Level the trace must drop below to close an event.
    pub lower_threshold: f64,
    pub noise_level: NoiseLevel,
    /// Baseline SD the thresholds were derived from.
    pub standard_deviation: f64,
}

impl ThresholdSet {
    /// A set carrying only the (unusable) SD, with NaN thresholds.
    #[must_use]
    pub fn unknown(standard_deviation: f64) -> Self {
        Self {
            basic_threshold: f64::NAN,
            upper_threshold: f64::NAN,
            lower_threshold: f64::NAN,
            noise_level: NoiseLevel::Unknown,
            standard_deviation,
        }
    }

    /// Returns true if the noise level is known.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.noise_level != NoiseLevel::Unknown
    }

    /// Checks `upper >= lower > 0`. NaN thresholds fail.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.upper_threshold >= self.lower_threshold && self.lower_threshold > 0.0
    }
}
