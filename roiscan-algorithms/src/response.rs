//! Per-ROI response filters.
//!
//! Each experiment type implements [`ResponseFilter`]: it names the response
//! windows of a trial and turns the per-trial detector results into one
//! accept/reject verdict.
#![allow(clippy::cast_precision_loss, clippy::must_use_candidate)]

use crate::hysteresis::search_window;
use roiscan_core::config::{AnalysisConfig, DetectionConfig, ExperimentType, ResponseConfig};
use roiscan_core::response::{
    Peak, RejectReason, ResponseCategory, RoiVerdict, TrialOutcome,
};
use roiscan_core::threshold::ThresholdSet;
use roiscan_core::trace::Stimulus;
use std::ops::Range;

/// Common contract of the per-experiment response filters.
pub trait ResponseFilter: Send + Sync {
    /// Filter name for logs.
    fn name(&self) -> &'static str;

    /// Experiment type this filter handles.
    fn experiment_type(&self) -> ExperimentType;

    /// Response windows searched in a trial of `frames` frames.
    fn windows(&self, stimulus: Stimulus, frames: usize) -> Vec<(Peak, Range<usize>)>;

    /// Aggregates one ROI's trial outcomes into a verdict.
    fn verdict(&self, thresholds: &ThresholdSet, trials: &[TrialOutcome]) -> RoiVerdict;
}

/// Checks that apply before any trial is looked at.
fn screen_noise(thresholds: &ThresholdSet, config: &ResponseConfig) -> Option<RejectReason> {
    if !thresholds.is_classified() {
        return Some(RejectReason::UnclassifiedNoise);
    }
    if thresholds.standard_deviation > config.max_baseline_noise {
        return Some(RejectReason::BaselineTooNoisy {
            sd: thresholds.standard_deviation,
            limit: config.max_baseline_noise,
        });
    }
    None
}

/// Applies the trial requirement and amplitude gate to one peak.
///
/// Returns the largest valid-event amplitude over passing trials.
fn evaluate_peak(
    trials: &[TrialOutcome],
    peak: Peak,
    config: &ResponseConfig,
) -> Result<f64, RejectReason> {
    let results: Vec<_> = trials.iter().filter_map(|trial| trial.result(peak)).collect();
    let evaluated = results.len();
    let passing = results.iter().filter(|result| result.passes).count();

    if !config.min_trials.is_met(passing, evaluated) {
        return Err(RejectReason::TooFewPassingTrials { passing, evaluated });
    }

    let amplitude = results
        .iter()
        .filter_map(|result| result.max_valid_amplitude())
        .fold(f64::NEG_INFINITY, f64::max);
    if amplitude < config.min_response_amplitude {
        return Err(RejectReason::BelowMinAmplitude {
            amplitude,
            minimum: config.min_response_amplitude,
        });
    }
    Ok(amplitude)
}

/// Single-stimulus (1AP) filter.
#[derive(Clone, Debug)]
pub struct SingleStimulusFilter {
    detection: DetectionConfig,
    response: ResponseConfig,
}

impl SingleStimulusFilter {
    /// Creates the filter from the analysis settings.
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            detection: config.detection.clone(),
            response: config.response.clone(),
        }
    }
}

impl ResponseFilter for SingleStimulusFilter {
    fn name(&self) -> &'static str {
        "SingleStimulus"
    }

    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::SingleStimulus
    }

    fn windows(&self, stimulus: Stimulus, frames: usize) -> Vec<(Peak, Range<usize>)> {
        vec![(
            Peak::First,
            search_window(
                stimulus.first_frame(),
                self.detection.post_stimulus_window,
                frames,
            ),
        )]
    }

    fn verdict(&self, thresholds: &ThresholdSet, trials: &[TrialOutcome]) -> RoiVerdict {
        if let Some(reason) = screen_noise(thresholds, &self.response) {
            return RoiVerdict::rejected(reason);
        }
        match evaluate_peak(trials, Peak::First, &self.response) {
            Ok(_) => RoiVerdict::accepted(ResponseCategory::Responsive),
            Err(reason) => RoiVerdict::rejected(reason),
        }
    }
}

/// Paired-pulse (PPF) filter.
///
/// The detector runs independently after each stimulus and the ROI is
/// classified by which peaks respond.
#[derive(Clone, Debug)]
pub struct PairedPulseFilter {
    detection: DetectionConfig,
    response: ResponseConfig,
}

impl PairedPulseFilter {
    /// Creates the filter from the analysis settings.
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            detection: config.detection.clone(),
            response: config.response.clone(),
        }
    }

    /// Mean second-peak over mean first-peak amplitude, over trials where
    /// both peaks pass.
    fn paired_pulse_ratio(trials: &[TrialOutcome]) -> Option<f64> {
        let (sum_first, sum_second, count) = trials
            .iter()
            .filter_map(|trial| {
                let first = trial.result(Peak::First)?.max_valid_amplitude()?;
                let second = trial.result(Peak::Second)?.max_valid_amplitude()?;
                Some((first, second))
            })
            .fold((0.0, 0.0, 0usize), |(a, b, n), (first, second)| {
                (a + first, b + second, n + 1)
            });

        if count == 0 || sum_first <= 0.0 {
            return None;
        }
        let n = count as f64;
        Some((sum_second / n) / (sum_first / n))
    }
}

impl ResponseFilter for PairedPulseFilter {
    fn name(&self) -> &'static str {
        "PairedPulse"
    }

    fn experiment_type(&self) -> ExperimentType {
        ExperimentType::PairedPulse
    }

    fn windows(&self, stimulus: Stimulus, frames: usize) -> Vec<(Peak, Range<usize>)> {
        let post = self.detection.post_stimulus_window;
        match stimulus {
            Stimulus::Paired { first, second } => vec![
                // Peak 1 must not run into the second response.
                (Peak::First, search_window(first, post, (second + 1).min(frames))),
                (Peak::Second, search_window(second, post, frames)),
            ],
            Stimulus::Single { frame } => vec![(Peak::First, search_window(frame, post, frames))],
        }
    }

    fn verdict(&self, thresholds: &ThresholdSet, trials: &[TrialOutcome]) -> RoiVerdict {
        if let Some(reason) = screen_noise(thresholds, &self.response) {
            return RoiVerdict::rejected(reason);
        }

        let first = evaluate_peak(trials, Peak::First, &self.response);
        let second = evaluate_peak(trials, Peak::Second, &self.response);
        match (first, second) {
            (Ok(_), Ok(_)) => RoiVerdict::accepted(ResponseCategory::BothPeaks)
                .with_paired_pulse_ratio(Self::paired_pulse_ratio(trials)),
            (Ok(_), Err(_)) => RoiVerdict::accepted(ResponseCategory::FirstPeakOnly),
            (Err(_), Ok(_)) => RoiVerdict::accepted(ResponseCategory::SecondPeakOnly),
            (Err(reason), Err(_)) => RoiVerdict::rejected(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use roiscan_core::config::TrialRequirement;
    use roiscan_core::error::InvalidTraceReason;
    use roiscan_core::response::{Event, TrialFilterResult, TrialStatus};
    use roiscan_core::threshold::NoiseLevel;

    fn thresholds() -> ThresholdSet {
        ThresholdSet {
            basic_threshold: 0.015,
            upper_threshold: 0.015,
            lower_threshold: 0.0075,
            noise_level: NoiseLevel::Low,
            standard_deviation: 0.005,
        }
    }

    fn event(valid: bool, peak_amplitude: f64) -> Event {
        Event {
            start_frame: 51,
            end_frame: if valid { 52 } else { 51 },
            duration_ms: if valid { 10.0 } else { 5.0 },
            peak_amplitude,
            peak_frame: 51,
            valid,
        }
    }

    fn trial(index: usize, results: Vec<TrialFilterResult>) -> TrialOutcome {
        TrialOutcome {
            trial: index,
            baseline: None,
            status: TrialStatus::Evaluated(results),
        }
    }

    fn window(peak: Peak, events: Vec<Event>) -> TrialFilterResult {
        TrialFilterResult::from_events(peak, events)
    }

    #[test]
    fn test_single_accepts_valid_event() {
        let filter = SingleStimulusFilter::new(&AnalysisConfig::default());
        let trials = vec![
            trial(0, vec![window(Peak::First, vec![event(true, 0.2)])]),
            trial(1, vec![window(Peak::First, vec![])]),
        ];
        let verdict = filter.verdict(&thresholds(), &trials);
        assert!(verdict.accepted);
        assert_eq!(verdict.category, ResponseCategory::Responsive);
    }

    #[test]
    fn test_single_rejects_short_events_only() {
        let filter = SingleStimulusFilter::new(&AnalysisConfig::default());
        let trials = vec![trial(0, vec![window(Peak::First, vec![event(false, 0.5)])])];
        let verdict = filter.verdict(&thresholds(), &trials);
        assert!(!verdict.accepted);
        assert_eq!(
            verdict.reject_reason,
            Some(RejectReason::TooFewPassingTrials {
                passing: 0,
                evaluated: 1
            })
        );
    }

    #[test]
    fn test_excluded_trials_are_not_counted() {
        let config = AnalysisConfig::default().with_response(
            ResponseConfig::default().with_min_trials(TrialRequirement::Fraction(1.0)),
        );
        let filter = SingleStimulusFilter::new(&config);
        let trials = vec![
            trial(0, vec![window(Peak::First, vec![event(true, 0.2)])]),
            TrialOutcome {
                trial: 1,
                baseline: None,
                status: TrialStatus::Excluded(InvalidTraceReason::AllNonFinite),
            },
        ];
        assert!(filter.verdict(&thresholds(), &trials).accepted);
    }

    #[test]
    fn test_amplitude_and_noise_gates() {
        let config = AnalysisConfig::default().with_response(
            ResponseConfig::default()
                .with_min_response_amplitude(0.3)
                .with_max_baseline_noise(0.004),
        );
        let filter = SingleStimulusFilter::new(&config);
        let trials = vec![trial(0, vec![window(Peak::First, vec![event(true, 0.2)])])];

        let noisy = filter.verdict(&thresholds(), &trials);
        assert!(matches!(
            noisy.reject_reason,
            Some(RejectReason::BaselineTooNoisy { .. })
        ));

        let quiet = ThresholdSet {
            standard_deviation: 0.001,
            ..thresholds()
        };
        let small = filter.verdict(&quiet, &trials);
        assert!(matches!(
            small.reject_reason,
            Some(RejectReason::BelowMinAmplitude { .. })
        ));
    }

    #[test]
    fn test_unknown_noise_is_rejected() {
        let filter = SingleStimulusFilter::new(&AnalysisConfig::default());
        let verdict = filter.verdict(&ThresholdSet::unknown(0.0), &[]);
        assert_eq!(verdict.reject_reason, Some(RejectReason::UnclassifiedNoise));
    }

    #[test]
    fn test_paired_windows() {
        let filter = PairedPulseFilter::new(&AnalysisConfig::paired_pulse());
        let windows = filter.windows(
            Stimulus::Paired {
                first: 100,
                second: 110,
            },
            400,
        );
        assert_eq!(windows, vec![(Peak::First, 101..111), (Peak::Second, 111..141)]);
    }

    #[test]
    fn test_paired_categories() {
        let filter = PairedPulseFilter::new(&AnalysisConfig::paired_pulse());
        let both = vec![trial(
            0,
            vec![
                window(Peak::First, vec![event(true, 0.2)]),
                window(Peak::Second, vec![event(true, 0.3)]),
            ],
        )];
        let verdict = filter.verdict(&thresholds(), &both);
        assert_eq!(verdict.category, ResponseCategory::BothPeaks);
        assert_relative_eq!(verdict.paired_pulse_ratio.unwrap(), 1.5, epsilon = 1e-12);

        let first_only = vec![trial(
            0,
            vec![
                window(Peak::First, vec![event(true, 0.2)]),
                window(Peak::Second, vec![event(false, 0.3)]),
            ],
        )];
        let verdict = filter.verdict(&thresholds(), &first_only);
        assert!(verdict.accepted);
        assert_eq!(verdict.category, ResponseCategory::FirstPeakOnly);
        assert_eq!(verdict.paired_pulse_ratio, None);

        let second_only = vec![trial(
            0,
            vec![
                window(Peak::First, vec![]),
                window(Peak::Second, vec![event(true, 0.3)]),
            ],
        )];
        assert_eq!(
            filter.verdict(&thresholds(), &second_only).category,
            ResponseCategory::SecondPeakOnly
        );

        let none = vec![trial(
            0,
            vec![window(Peak::First, vec![]), window(Peak::Second, vec![])],
        )];
        let verdict = filter.verdict(&thresholds(), &none);
        assert!(!verdict.accepted);
        assert_eq!(verdict.category, ResponseCategory::None);
    }
}
