//! Analysis configuration.
//!
//! A single immutable [`AnalysisConfig`] is passed by reference into every
//! stage. Nothing in the pipeline reads settings from global state.
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Experiment kind, which selects the response-filter behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExperimentType {
    /// One stimulus per trial (1AP).
    #[default]
    SingleStimulus,
    /// Two stimuli per trial (paired-pulse facilitation).
    PairedPulse,
}

impl ExperimentType {
    /// Short label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleStimulus => "1AP",
            Self::PairedPulse => "PPF",
        }
    }
}

impl std::fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Baseline window settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BaselineConfig {
    /// First baseline frame (0-based, inclusive).
    pub start_frame: usize,
    /// End of the baseline window (exclusive). Clipped to the first
    /// stimulus frame and to the trace length.
    pub end_frame: usize,
    /// Minimum number of frames the effective window must span.
    pub min_frames: usize,
    /// Floor applied to F0 before it is used as a divisor.
    pub min_f0: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            start_frame: 0,
            end_frame: 200,
            min_frames: 20,
            min_f0: 1e-6,
        }
    }
}

impl BaselineConfig {
    /// Sets the baseline frame range (`start..end`).
    #[must_use]
    pub fn with_range(mut self, start_frame: usize, end_frame: usize) -> Self {
        self.start_frame = start_frame;
        self.end_frame = end_frame;
        self
    }

    /// Sets the minimum baseline length in frames.
    #[must_use]
    pub fn with_min_frames(mut self, frames: usize) -> Self {
        self.min_frames = frames;
        self
    }

    /// Sets the F0 floor.
    #[must_use]
    pub fn with_min_f0(mut self, min_f0: f64) -> Self {
        self.min_f0 = min_f0;
        self
    }
}

/// Noise classification and hysteresis threshold multipliers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThresholdConfig {
    /// `basic = sd * sd_multiplier`.
    pub sd_multiplier: f64,
    /// ROIs with `basic <= low_noise_cutoff` are low noise.
    pub low_noise_cutoff: f64,
    /// Upper threshold multiplier in the low-noise regime.
    pub low_upper_multiplier: f64,
    /// Upper threshold multiplier in the high-noise regime.
    pub high_upper_multiplier: f64,
    /// `lower = basic * lower_multiplier` in both regimes.
    pub lower_multiplier: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sd_multiplier: 3.0,
            low_noise_cutoff: 0.02,
            low_upper_multiplier: 1.0,
            high_upper_multiplier: 1.5,
            lower_multiplier: 0.5,
        }
    }
}

impl ThresholdConfig {
    /// Sets the SD multiplier.
    #[must_use]
    pub fn with_sd_multiplier(mut self, multiplier: f64) -> Self {
        self.sd_multiplier = multiplier;
        self
    }

    /// Sets the low-noise cutoff.
    #[must_use]
    pub fn with_low_noise_cutoff(mut self, cutoff: f64) -> Self {
        self.low_noise_cutoff = cutoff;
        self
    }

    /// Sets the per-regime upper multipliers.
    #[must_use]
    pub fn with_upper_multipliers(mut self, low: f64, high: f64) -> Self {
        self.low_upper_multiplier = low;
        self.high_upper_multiplier = high;
        self
    }

    /// Sets the lower multiplier.
    #[must_use]
    pub fn with_lower_multiplier(mut self, multiplier: f64) -> Self {
        self.lower_multiplier = multiplier;
        self
    }
}

/// Hysteresis detector settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectionConfig {
    /// Number of frames searched after each stimulus.
    pub post_stimulus_window: usize,
    /// Minimum duration for an event to count as valid.
    pub min_event_duration_ms: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            post_stimulus_window: 30,
            // Two frames at 200 Hz.
            min_event_duration_ms: 10.0,
        }
    }
}

impl DetectionConfig {
    /// Sets the post-stimulus search window in frames.
    #[must_use]
    pub fn with_post_stimulus_window(mut self, frames: usize) -> Self {
        self.post_stimulus_window = frames;
        self
    }

    /// Sets the minimum valid event duration.
    #[must_use]
    pub fn with_min_event_duration_ms(mut self, duration_ms: f64) -> Self {
        self.min_event_duration_ms = duration_ms;
        self
    }
}

/// How many evaluated trials must pass for an ROI (or peak) to be accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrialRequirement {
    /// At least this many passing trials.
    Count(usize),
    /// At least this fraction of evaluated trials must pass.
    Fraction(f64),
}

impl Default for TrialRequirement {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl TrialRequirement {
    /// Returns true if `passing` out of `evaluated` trials satisfies the requirement.
    #[allow(clippy::cast_precision_loss)]
    pub fn is_met(self, passing: usize, evaluated: usize) -> bool {
        if evaluated == 0 {
            return false;
        }
        match self {
            Self::Count(n) => passing >= n,
            Self::Fraction(fraction) => passing as f64 / evaluated as f64 >= fraction,
        }
    }
}

/// Response filter settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResponseConfig {
    /// Passing-trial requirement.
    pub min_trials: TrialRequirement,
    /// Minimum peak ΔF/F among valid events (0 = disabled).
    pub min_response_amplitude: f64,
    /// ROIs whose baseline SD (ΔF/F units) exceeds this are rejected.
    pub max_baseline_noise: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            min_trials: TrialRequirement::Count(1),
            min_response_amplitude: 0.0,
            max_baseline_noise: 0.1,
        }
    }
}

impl ResponseConfig {
    /// Sets the passing-trial requirement.
    #[must_use]
    pub fn with_min_trials(mut self, requirement: TrialRequirement) -> Self {
        self.min_trials = requirement;
        self
    }

    /// Sets the minimum response amplitude.
    #[must_use]
    pub fn with_min_response_amplitude(mut self, amplitude: f64) -> Self {
        self.min_response_amplitude = amplitude;
        self
    }

    /// Sets the maximum tolerated baseline noise.
    #[must_use]
    pub fn with_max_baseline_noise(mut self, sd: f64) -> Self {
        self.max_baseline_noise = sd;
        self
    }
}

/// Complete settings object for one analysis run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    pub experiment_type: ExperimentType,
    pub baseline: BaselineConfig,
    pub thresholds: ThresholdConfig,
    pub detection: DetectionConfig,
    pub response: ResponseConfig,
}

impl AnalysisConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default configuration for paired-pulse experiments.
    pub fn paired_pulse() -> Self {
        Self::default().with_experiment_type(ExperimentType::PairedPulse)
    }

    /// Sets the experiment type.
    #[must_use]
    pub fn with_experiment_type(mut self, experiment_type: ExperimentType) -> Self {
        self.experiment_type = experiment_type;
        self
    }

    /// Replaces the baseline settings.
    #[must_use]
    pub fn with_baseline(mut self, baseline: BaselineConfig) -> Self {
        self.baseline = baseline;
        self
    }

    /// Replaces the threshold settings.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replaces the detection settings.
    #[must_use]
    pub fn with_detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    /// Replaces the response filter settings.
    #[must_use]
    pub fn with_response(mut self, response: ResponseConfig) -> Self {
        self.response = response;
        self
    }

    /// Checks that every constant is usable.
    ///
    /// Positive multipliers and a lower multiplier no larger than either
    /// upper multiplier guarantee `upper >= lower > 0` for any positive SD.
    pub fn validate(&self) -> Result<()> {
        let b = &self.baseline;
        if b.end_frame <= b.start_frame {
            return Err(config_error(format!(
                "baseline range {}..{} is empty",
                b.start_frame, b.end_frame
            )));
        }
        if b.min_frames < 2 {
            return Err(config_error(
                "baseline needs at least 2 frames for a standard deviation",
            ));
        }
        if !(b.min_f0.is_finite() && b.min_f0 > 0.0) {
            return Err(config_error(format!("min_f0 must be positive, got {}", b.min_f0)));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("sd_multiplier", t.sd_multiplier),
            ("low_noise_cutoff", t.low_noise_cutoff),
            ("low_upper_multiplier", t.low_upper_multiplier),
            ("high_upper_multiplier", t.high_upper_multiplier),
            ("lower_multiplier", t.lower_multiplier),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(config_error(format!("{name} must be positive, got {value}")));
            }
        }
        if t.lower_multiplier > t.low_upper_multiplier.min(t.high_upper_multiplier) {
            return Err(config_error(format!(
                "lower_multiplier {} exceeds an upper multiplier",
                t.lower_multiplier
            )));
        }

        let d = &self.detection;
        if d.post_stimulus_window == 0 {
            return Err(config_error("post_stimulus_window must be at least one frame"));
        }
        if !(d.min_event_duration_ms.is_finite() && d.min_event_duration_ms >= 0.0) {
            return Err(config_error(format!(
                "min_event_duration_ms must be non-negative, got {}",
                d.min_event_duration_ms
            )));
        }

        let r = &self.response;
        match r.min_trials {
            TrialRequirement::Count(0) => {
                return Err(config_error("min_trials count must be at least 1"));
            }
            TrialRequirement::Fraction(f) if !(f > 0.0 && f <= 1.0) => {
                return Err(config_error(format!(
                    "min_trials fraction must be in (0, 1], got {f}"
                )));
            }
            _ => {}
        }
        if r.min_response_amplitude.is_nan() || r.min_response_amplitude < 0.0 {
            return Err(config_error(format!(
                "min_response_amplitude must be non-negative, got {}",
                r.min_response_amplitude
            )));
        }
        if r.max_baseline_noise.is_nan() || r.max_baseline_noise <= 0.0 {
            return Err(config_error(format!(
                "max_baseline_noise must be positive, got {}",
                r.max_baseline_noise
            )));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::ConfigError(message.into())
}
