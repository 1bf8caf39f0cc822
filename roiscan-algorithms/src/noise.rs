//! Adaptive noise classification.
//!
//! Noisy ROIs get a higher upper threshold so baseline fluctuations do not
//! trigger events, while quiet ROIs keep their sensitivity.
#![allow(clippy::cast_precision_loss)]

use roiscan_core::config::ThresholdConfig;
use roiscan_core::threshold::{NoiseLevel, ThresholdSet};
use roiscan_core::trace::BaselineStats;

/// Classifies a baseline SD (ΔF/F units) and derives its hysteresis thresholds.
///
/// A non-finite or non-positive SD yields [`NoiseLevel::Unknown`].
pub fn classify(sd: f64, config: &ThresholdConfig) -> ThresholdSet {
    if !(sd.is_finite() && sd > 0.0) {
        return ThresholdSet::unknown(sd);
    }

    let basic = sd * config.sd_multiplier;
    let noise_level = if basic <= config.low_noise_cutoff {
        NoiseLevel::Low
    } else {
        NoiseLevel::High
    };
    let upper_multiplier = match noise_level {
        NoiseLevel::Low => config.low_upper_multiplier,
        _ => config.high_upper_multiplier,
    };

    ThresholdSet {
        basic_threshold: basic,
        upper_threshold: basic * upper_multiplier,
        lower_threshold: basic * config.lower_multiplier,
        noise_level,
        standard_deviation: sd,
    }
}

/// Mean baseline SD in ΔF/F units over an ROI's trials. NaN if there are none.
pub fn pooled_sd<'a, I>(baselines: I) -> f64
where
    I: IntoIterator<Item = &'a BaselineStats>,
{
    let (sum, count) = baselines
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), stats| {
            (sum + stats.relative_sd(), count + 1)
        });
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
