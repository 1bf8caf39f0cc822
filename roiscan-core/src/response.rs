//! Detection and response-filter results.
//!
//! These types carry the per-trial detector output and the per-ROI accept /
//! reject decision from the analysis stage to the report writer.

use crate::config::ExperimentType;
use crate::error::{InvalidTraceReason, TraceError};
use crate::threshold::{NoiseLevel, ThresholdSet};
use crate::trace::BaselineStats;
use std::collections::{BTreeMap, BTreeSet};

/// A completed run above the upper threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// First frame above the upper threshold.
    pub start_frame: usize,
    /// Last frame still at or above the lower threshold.
    pub end_frame: usize,
    /// `(end_frame - start_frame + 1) * ms_per_frame`.
    pub duration_ms: f64,
    /// Largest ΔF/F value inside the run.
    pub peak_amplitude: f64,
    /// Frame of `peak_amplitude`.
    pub peak_frame: usize,
    /// `duration_ms >= min_event_duration_ms`.
    pub valid: bool,
}

/// Which stimulus a response window follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Peak {
    First,
    Second,
}

impl Peak {
    /// 1-based peak number for reports.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Why a trial window passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialReason {
    /// At least one event met the duration requirement.
    ValidEvent,
    /// The trace crossed the upper threshold but never long enough.
    OnlyShortEvents,
    /// The trace never exceeded the upper threshold.
    NoCrossing,
}

impl TrialReason {
    /// Label used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidEvent => "valid_event",
            Self::OnlyShortEvents => "only_short_events",
            Self::NoCrossing => "no_crossing",
        }
    }
}

/// Detector result for one (ROI, trial, peak).
#[derive(Debug, Clone, PartialEq)]
pub struct TrialFilterResult {
    pub peak: Peak,
    pub passes: bool,
    pub events: Vec<Event>,
    pub reason: TrialReason,
}

impl TrialFilterResult {
    /// Builds a result from the events found in one window.
    #[must_use]
    pub fn from_events(peak: Peak, events: Vec<Event>) -> Self {
        let passes = events.iter().any(|event| event.valid);
        let reason = if passes {
            TrialReason::ValidEvent
        } else if events.is_empty() {
            TrialReason::NoCrossing
        } else {
            TrialReason::OnlyShortEvents
        };
        Self {
            peak,
            passes,
            events,
            reason,
        }
    }

    /// True if at least one event (valid or not) was recorded.
    #[must_use]
    pub fn triggered(&self) -> bool {
        !self.events.is_empty()
    }

    /// Largest peak amplitude among valid events.
    #[must_use]
    pub fn max_valid_amplitude(&self) -> Option<f64> {
        self.events
            .iter()
            .filter(|event| event.valid)
            .map(|event| event.peak_amplitude)
            .reduce(f64::max)
    }
}

/// Whether a trial was evaluated or excluded.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialStatus {
    /// One result per response window.
    Evaluated(Vec<TrialFilterResult>),
    /// Trace unusable; counted as neither pass nor fail.
    Excluded(InvalidTraceReason),
}

/// Outcome of one trial for one ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// Index of the trial within its group.
    pub trial: usize,
    /// Baseline statistics, when the baseline was usable.
    pub baseline: Option<BaselineStats>,
    pub status: TrialStatus,
}

impl TrialOutcome {
    /// Result for a given peak, if the trial was evaluated.
    #[must_use]
    pub fn result(&self, peak: Peak) -> Option<&TrialFilterResult> {
        match &self.status {
            TrialStatus::Evaluated(results) => results.iter().find(|r| r.peak == peak),
            TrialStatus::Excluded(_) => None,
        }
    }

    /// Returns true if the trial was excluded.
    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self.status, TrialStatus::Excluded(_))
    }
}

/// Response classification of an ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseCategory {
    /// Single-stimulus ROI with a genuine response.
    Responsive,
    /// Paired-pulse ROI responding to both stimuli.
    BothPeaks,
    /// Paired-pulse ROI responding to the first stimulus only.
    FirstPeakOnly,
    /// Paired-pulse ROI responding to the second stimulus only.
    SecondPeakOnly,
    /// No accepted response.
    None,
}

impl ResponseCategory {
    /// Label used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Responsive => "responsive",
            Self::BothPeaks => "both_peaks",
            Self::FirstPeakOnly => "peak1_only",
            Self::SecondPeakOnly => "peak2_only",
            Self::None => "none",
        }
    }
}

/// Why an ROI was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Noise level could not be determined.
    UnclassifiedNoise,
    /// Baseline SD above the configured maximum.
    BaselineTooNoisy { sd: f64, limit: f64 },
    /// Not enough trials with a valid event.
    TooFewPassingTrials { passing: usize, evaluated: usize },
    /// Valid events exist but peak amplitude is below the minimum.
    BelowMinAmplitude { amplitude: f64, minimum: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnclassifiedNoise => write!(f, "unclassified noise"),
            Self::BaselineTooNoisy { sd, limit } => {
                write!(f, "baseline sd {sd:.5} above {limit:.5}")
            }
            Self::TooFewPassingTrials { passing, evaluated } => {
                write!(f, "{passing}/{evaluated} trials passing")
            }
            Self::BelowMinAmplitude { amplitude, minimum } => {
                write!(f, "amplitude {amplitude:.5} below {minimum:.5}")
            }
        }
    }
}

/// Accept/reject decision for one ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiVerdict {
    pub accepted: bool,
    pub category: ResponseCategory,
    /// First failed check. For paired-pulse ROIs rejected per peak this is
    /// the first peak's reason.
    pub reject_reason: Option<RejectReason>,
    /// Mean second / mean first peak amplitude, for `BothPeaks` ROIs.
    pub paired_pulse_ratio: Option<f64>,
}

impl RoiVerdict {
    /// An accepted ROI.
    #[must_use]
    pub fn accepted(category: ResponseCategory) -> Self {
        Self {
            accepted: true,
            category,
            reject_reason: None,
            paired_pulse_ratio: None,
        }
    }

    /// A rejected ROI.
    #[must_use]
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            category: ResponseCategory::None,
            reject_reason: Some(reason),
            paired_pulse_ratio: None,
        }
    }

    /// Attaches a paired-pulse ratio.
    #[must_use]
    pub fn with_paired_pulse_ratio(mut self, ratio: Option<f64>) -> Self {
        self.paired_pulse_ratio = ratio;
        self
    }
}

/// Complete result for one ROI in a group.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiAnalysis {
    pub roi: u32,
    pub thresholds: ThresholdSet,
    pub trials: Vec<TrialOutcome>,
    pub verdict: RoiVerdict,
}

impl RoiAnalysis {
    /// Trials that were not excluded.
    pub fn evaluated_trials(&self) -> impl Iterator<Item = &TrialOutcome> {
        self.trials.iter().filter(|trial| !trial.is_excluded())
    }

    /// Number of excluded trials.
    #[must_use]
    pub fn excluded_trials(&self) -> usize {
        self.trials.iter().filter(|trial| trial.is_excluded()).count()
    }

    /// Number of evaluated trials passing for `peak`.
    #[must_use]
    pub fn passing_trials(&self, peak: Peak) -> usize {
        self.trials
            .iter()
            .filter_map(|trial| trial.result(peak))
            .filter(|result| result.passes)
            .count()
    }
}

/// An ROI that could not be analyzed at all.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiFailure {
    pub roi: u32,
    pub error: TraceError,
    /// Trials that recorded this ROI, all of them excluded.
    pub excluded_trials: usize,
}

/// Summary counts for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStatistics {
    pub rois_observed: usize,
    pub rois_accepted: usize,
    pub rois_rejected: usize,
    pub rois_failed: usize,
    pub trials_excluded: usize,
    pub low_noise: usize,
    pub high_noise: usize,
    pub unknown_noise: usize,
    pub categories: BTreeMap<ResponseCategory, usize>,
}

impl GroupStatistics {
    /// Tallies analyzed and failed ROIs.
    #[must_use]
    pub fn from_rois(rois: &[RoiAnalysis], failures: &[RoiFailure]) -> Self {
        let mut stats = Self {
            rois_observed: rois.len() + failures.len(),
            rois_failed: failures.len(),
            ..Self::default()
        };
        for roi in rois {
            if roi.verdict.accepted {
                stats.rois_accepted += 1;
            } else {
                stats.rois_rejected += 1;
            }
            stats.trials_excluded += roi.excluded_trials();
            match roi.thresholds.noise_level {
                NoiseLevel::Low => stats.low_noise += 1,
                NoiseLevel::High => stats.high_noise += 1,
                NoiseLevel::Unknown => stats.unknown_noise += 1,
            }
            *stats.categories.entry(roi.verdict.category).or_insert(0) += 1;
        }
        stats.trials_excluded += failures
            .iter()
            .map(|failure| failure.excluded_trials)
            .sum::<usize>();
        stats
    }
}

/// Analysis of a whole group, before the threshold cache is built.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAnalysis {
    pub name: String,
    pub experiment_type: ExperimentType,
    /// Analyzed ROIs in ascending ROI order.
    pub rois: Vec<RoiAnalysis>,
    /// ROIs excluded entirely, in ascending ROI order.
    pub failures: Vec<RoiFailure>,
    pub statistics: GroupStatistics,
}

impl GroupAnalysis {
    /// Assembles a group analysis and its statistics.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        experiment_type: ExperimentType,
        rois: Vec<RoiAnalysis>,
        failures: Vec<RoiFailure>,
    ) -> Self {
        let statistics = GroupStatistics::from_rois(&rois, &failures);
        Self {
            name: name.into(),
            experiment_type,
            rois,
            failures,
            statistics,
        }
    }

    /// ROIs that passed the response filter.
    pub fn accepted_rois(&self) -> impl Iterator<Item = &RoiAnalysis> {
        self.rois.iter().filter(|roi| roi.verdict.accepted)
    }

    /// ROI numbers of the filtered (accepted) dataset.
    #[must_use]
    pub fn organized_roi_numbers(&self) -> BTreeSet<u32> {
        self.accepted_rois().map(|roi| roi.roi).collect()
    }

    /// Looks up an ROI by number.
    #[must_use]
    pub fn roi(&self, roi: u32) -> Option<&RoiAnalysis> {
        self.rois
            .binary_search_by_key(&roi, |analysis| analysis.roi)
            .ok()
            .map(|index| &self.rois[index])
    }
}
