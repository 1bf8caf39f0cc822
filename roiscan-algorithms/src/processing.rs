//! Group and batch processing that chains every stage and builds the cache.

use crate::baseline;
use crate::hysteresis::SchmittTrigger;
use crate::noise;
use crate::normalize;
use crate::response::{PairedPulseFilter, ResponseFilter, SingleStimulusFilter};
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use roiscan_core::cache::{ThresholdCache, ThresholdCacheBuilder};
use roiscan_core::config::{AnalysisConfig, ExperimentType};
use roiscan_core::error::{CacheValidationError, Error, InvalidTraceReason, Result, TraceError};
use roiscan_core::response::{
    GroupAnalysis, RoiAnalysis, RoiFailure, TrialFilterResult, TrialOutcome, TrialStatus,
};
use roiscan_core::trace::{BaselineStats, ExperimentGroup, RawTrace};
use std::sync::Arc;

/// A fully processed group: analysis plus its validated threshold cache.
#[derive(Debug, Clone)]
pub struct GroupResult {
    /// Per-ROI results and group statistics.
    pub analysis: GroupAnalysis,
    /// Validated, read-only threshold cache shared by all report consumers.
    pub cache: Arc<ThresholdCache>,
}

/// Stage-one output for one trial.
struct PreparedTrial<'a> {
    trace: &'a RawTrace,
    /// Per column; an error excludes that ROI from this trial only.
    baselines: Vec<std::result::Result<BaselineStats, InvalidTraceReason>>,
    normalized: Array2<f32>,
}

fn prepare_trial<'a>(
    trace: &'a RawTrace,
    config: &AnalysisConfig,
) -> std::result::Result<PreparedTrial<'a>, TraceError> {
    let baselines = baseline::estimate_trace(trace, &config.baseline)?
        .into_iter()
        .map(|stats| match stats {
            Ok(stats) => Ok(Ok(stats)),
            Err(TraceError::InvalidTrace { reason, .. }) => Ok(Err(reason)),
            Err(other) => Err(other),
        })
        .collect::<std::result::Result<Vec<_>, TraceError>>()?;

    let f0: Vec<Option<BaselineStats>> = baselines.iter().map(|stats| stats.ok()).collect();
    let normalized = normalize::normalize_trace(trace, &f0)?;

    Ok(PreparedTrial {
        trace,
        baselines,
        normalized,
    })
}

fn analyze_roi<F: ResponseFilter>(
    roi: u32,
    trials: &[PreparedTrial<'_>],
    config: &AnalysisConfig,
    filter: &F,
) -> std::result::Result<RoiAnalysis, RoiFailure> {
    // (trial index, trial, column) for every trial that recorded this ROI.
    let present: Vec<(usize, &PreparedTrial<'_>, usize)> = trials
        .iter()
        .enumerate()
        .filter_map(|(index, trial)| {
            trial
                .trace
                .column_of(roi)
                .map(|column| (index, trial, column))
        })
        .collect();

    let valid: Vec<BaselineStats> = present
        .iter()
        .filter_map(|&(_, trial, column)| trial.baselines[column].ok())
        .collect();

    if valid.is_empty() {
        let reason = present
            .iter()
            .find_map(|&(_, trial, column)| trial.baselines[column].err())
            .unwrap_or(InvalidTraceReason::AllNonFinite);
        warn!("ROI {roi}: excluded from every trial ({reason})");
        return Err(RoiFailure {
            roi,
            error: TraceError::InvalidTrace { roi, reason },
            excluded_trials: present.len(),
        });
    }

    let thresholds = noise::classify(noise::pooled_sd(&valid), &config.thresholds);

    let outcomes: Vec<TrialOutcome> = present
        .iter()
        .map(|&(index, trial, column)| match trial.baselines[column] {
            Ok(stats) => {
                let trigger = SchmittTrigger::from_thresholds(
                    &thresholds,
                    trial.trace.ms_per_frame(),
                    &config.detection,
                );
                let samples = trial.normalized.column(column);
                let results = filter
                    .windows(trial.trace.stimulus(), trial.trace.frames())
                    .into_iter()
                    .map(|(peak, window)| {
                        TrialFilterResult::from_events(peak, trigger.detect(samples, window))
                    })
                    .collect();
                TrialOutcome {
                    trial: index,
                    baseline: Some(stats),
                    status: TrialStatus::Evaluated(results),
                }
            }
            Err(reason) => {
                warn!("ROI {roi}, trial {index}: excluded ({reason})");
                TrialOutcome {
                    trial: index,
                    baseline: None,
                    status: TrialStatus::Excluded(reason),
                }
            }
        })
        .collect();

    let verdict = filter.verdict(&thresholds, &outcomes);
    match verdict.reject_reason {
        None => debug!(
            "ROI {roi}: {} ({} noise, upper {:.5})",
            verdict.category.as_str(),
            thresholds.noise_level,
            thresholds.upper_threshold
        ),
        Some(reason) => debug!("ROI {roi}: rejected, {reason}"),
    }

    Ok(RoiAnalysis {
        roi,
        thresholds,
        trials: outcomes,
        verdict,
    })
}

fn analyze_with<F: ResponseFilter>(
    group: &ExperimentGroup,
    config: &AnalysisConfig,
    filter: &F,
) -> Result<GroupAnalysis> {
    // Stage 1: baseline and normalization, one task per trial.
    let prepared = group
        .trials
        .par_iter()
        .map(|trace| prepare_trial(trace, config))
        .collect::<std::result::Result<Vec<_>, TraceError>>()?;

    // Stage 2: classification, detection and verdict, one task per ROI.
    let outcomes: Vec<_> = group
        .roi_numbers()
        .par_iter()
        .map(|&roi| analyze_roi(roi, &prepared, config, filter))
        .collect();

    let mut rois = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(analysis) => rois.push(analysis),
            Err(failure) => failures.push(failure),
        }
    }

    let analysis = GroupAnalysis::new(group.name.clone(), filter.experiment_type(), rois, failures);
    let stats = &analysis.statistics;
    info!(
        "group '{}' ({}, {} filter): {}/{} ROIs accepted, {} rejected, {} failed, {} trials excluded",
        analysis.name,
        analysis.experiment_type,
        filter.name(),
        stats.rois_accepted,
        stats.rois_observed,
        stats.rois_rejected,
        stats.rois_failed,
        stats.trials_excluded
    );
    Ok(analysis)
}

/// Runs baseline estimation, normalization, noise classification, detection
/// and the response filter over every ROI of a group.
///
/// # Errors
/// Group-level failures only: invalid settings, an empty group, a trial
/// whose stimulus layout does not match the experiment type, or a baseline
/// window shorter than the configured minimum. Per-ROI problems are recorded
/// in [`GroupAnalysis::failures`] and excluded trials in each ROI's outcomes.
pub fn analyze_group(group: &ExperimentGroup, config: &AnalysisConfig) -> Result<GroupAnalysis> {
    config.validate()?;
    if group.trials.is_empty() {
        return Err(Error::EmptyGroup(group.name.clone()));
    }
    for trial in &group.trials {
        let actual = trial.stimulus().experiment_type();
        if actual != config.experiment_type {
            return Err(Error::StimulusMismatch {
                expected: config.experiment_type.as_str(),
                actual: actual.as_str(),
            });
        }
        baseline::check_window(trial, &config.baseline)?;
    }

    match config.experiment_type {
        ExperimentType::SingleStimulus => {
            analyze_with(group, config, &SingleStimulusFilter::new(config))
        }
        ExperimentType::PairedPulse => analyze_with(group, config, &PairedPulseFilter::new(config)),
    }
}

/// Builds and validates the threshold cache from a group's accepted ROIs.
///
/// # Errors
/// [`CacheValidationError`] if the cache is empty or violates an invariant.
/// The caller must then skip every consumer of this group.
pub fn build_threshold_cache(
    analysis: &GroupAnalysis,
) -> std::result::Result<ThresholdCache, CacheValidationError> {
    let organized = analysis.organized_roi_numbers();
    let mut builder = ThresholdCacheBuilder::new(analysis.experiment_type);
    for roi in analysis.accepted_rois() {
        builder.insert(roi.roi, &roi.thresholds);
    }
    builder.build(&organized)
}

/// Analyzes a group and builds its threshold cache.
///
/// # Errors
/// Any error from [`analyze_group`], or [`Error::CacheValidation`].
pub fn process_group(group: &ExperimentGroup, config: &AnalysisConfig) -> Result<GroupResult> {
    let analysis = analyze_group(group, config)?;
    let cache = build_threshold_cache(&analysis).map_err(|error| {
        warn!("group '{}': threshold cache rejected: {error}", analysis.name);
        error
    })?;
    info!(
        "group '{}': threshold cache validated with {} ROIs",
        analysis.name,
        cache.len()
    );
    Ok(GroupResult {
        analysis,
        cache: Arc::new(cache),
    })
}

/// Processes groups in parallel. A failed group never affects the others.
///
/// Results keep the input order.
pub fn process_batch(
    groups: &[ExperimentGroup],
    config: &AnalysisConfig,
) -> Vec<(String, Result<GroupResult>)> {
    groups
        .par_iter()
        .map(|group| (group.name.clone(), process_group(group, config)))
        .collect()
}
