#![allow(clippy::cast_precision_loss, clippy::uninlined_format_args)]
use ndarray::Array2;
use roiscan_algorithms::{
    analyze_group, build_threshold_cache, process_batch, process_group, AnalysisConfig,
};
use roiscan_core::{
    BaselineConfig, CacheValidationError, ExperimentGroup, NoiseLevel, Peak, RawTrace,
    ResponseCategory, Stimulus, ThresholdCacheBuilder,
};

const FRAMES: usize = 160;
const FIRST: usize = 60;
const SECOND: usize = 80;

/// Raw column around F = 200 with a deterministic wobble of `noise` (raw
/// units) and a 4-frame response after each `(stimulus, ΔF/F)` pair.
fn column(noise: f32, responses: &[(usize, f32)]) -> Vec<f32> {
    (0..FRAMES)
        .map(|frame| {
            let wobble = ((frame * 5 % 11) as f32 - 5.0) / 5.0;
            let mut value = 200.0 + noise * wobble;
            for &(stimulus, amplitude) in responses {
                if frame > stimulus && frame <= stimulus + 4 {
                    value += 200.0 * amplitude;
                }
            }
            value
        })
        .collect()
}

fn trace(columns: &[(u32, Vec<f32>)], stimulus: Stimulus) -> RawTrace {
    let mut data = Array2::<f32>::zeros((FRAMES, columns.len()));
    for (index, (_, values)) in columns.iter().enumerate() {
        data.column_mut(index)
            .iter_mut()
            .zip(values)
            .for_each(|(out, &value)| *out = value);
    }
    RawTrace::new(
        data,
        columns.iter().map(|(roi, _)| *roi).collect(),
        5.0,
        stimulus,
    )
    .unwrap()
}

fn config() -> AnalysisConfig {
    AnalysisConfig::default().with_baseline(BaselineConfig::default().with_range(0, 60))
}

fn paired_config() -> AnalysisConfig {
    AnalysisConfig::paired_pulse().with_baseline(BaselineConfig::default().with_range(0, 60))
}

fn paired_group() -> ExperimentGroup {
    let stimulus = Stimulus::Paired {
        first: FIRST,
        second: SECOND,
    };
    let trials = (0..4)
        .map(|_| {
            trace(
                &[
                    (10, column(1.0, &[(FIRST, 0.10), (SECOND, 0.15)])),
                    (11, column(1.0, &[(FIRST, 0.10)])),
                    (12, column(1.0, &[(SECOND, 0.15)])),
                    (13, column(1.0, &[])),
                    // High-noise ROI: wobble of 4 raw units on F = 200.
                    (14, column(4.0, &[(FIRST, 0.3), (SECOND, 0.3)])),
                ],
                stimulus,
            )
        })
        .collect();
    ExperimentGroup::new("ppf", trials)
}

#[test]
fn test_pipeline_is_idempotent() {
    let group = paired_group();
    let cfg = paired_config();

    let first = process_group(&group, &cfg).unwrap();
    let second = process_group(&group, &cfg).unwrap();

    assert_eq!(first.analysis, second.analysis);
    assert_eq!(*first.cache, *second.cache);
    assert_eq!(format!("{:?}", first.cache), format!("{:?}", second.cache));
}

#[test]
fn test_paired_pulse_categories() {
    let cfg = paired_config();
    let analysis = analyze_group(&paired_group(), &cfg).unwrap();

    let category = |roi| analysis.roi(roi).unwrap().verdict.category;
    assert_eq!(category(10), ResponseCategory::BothPeaks);
    assert_eq!(category(11), ResponseCategory::FirstPeakOnly);
    assert_eq!(category(12), ResponseCategory::SecondPeakOnly);
    assert_eq!(category(13), ResponseCategory::None);
    assert_eq!(category(14), ResponseCategory::BothPeaks);

    let both = analysis.roi(10).unwrap();
    assert_eq!(both.passing_trials(Peak::First), 4);
    assert_eq!(both.passing_trials(Peak::Second), 4);
    let ratio = both.verdict.paired_pulse_ratio.unwrap();
    assert!((ratio - 1.5).abs() < 0.05, "ratio {}", ratio);

    assert_eq!(analysis.roi(14).unwrap().thresholds.noise_level, NoiseLevel::High);
    assert_eq!(analysis.statistics.categories[&ResponseCategory::BothPeaks], 2);
    assert_eq!(analysis.statistics.rois_accepted, 4);
}

#[test]
fn test_first_peak_window_stops_at_second_stimulus() {
    // A response only after the second stimulus must not count for peak 1,
    // even with a post-stimulus window long enough to reach it.
    let cfg = paired_config();
    let analysis = analyze_group(&paired_group(), &cfg).unwrap();
    let second_only = analysis.roi(12).unwrap();
    assert_eq!(second_only.passing_trials(Peak::First), 0);
}

#[test]
fn test_cache_matches_accepted_rois() {
    let cfg = paired_config();
    let result = process_group(&paired_group(), &cfg).unwrap();

    let cached: Vec<u32> = result.cache.roi_numbers().collect();
    assert_eq!(cached, vec![10, 11, 12, 14]);
    for roi in result.analysis.accepted_rois() {
        let entry = result.cache.get(roi.roi).unwrap();
        assert_eq!(*entry, roi.thresholds);
        assert!(entry.upper_threshold >= entry.lower_threshold);
        assert!(entry.lower_threshold > 0.0);
    }

    let annotation = result.cache.annotation(14).unwrap();
    assert_eq!(annotation.noise_level, NoiseLevel::High);
    assert!(result.cache.annotation(13).is_none());
}

#[test]
fn test_incomplete_cache_is_rejected() {
    let analysis = analyze_group(&paired_group(), &paired_config()).unwrap();
    let organized = analysis.organized_roi_numbers();

    // Leave one accepted ROI without any entry.
    let mut builder = ThresholdCacheBuilder::new(analysis.experiment_type);
    for roi in analysis.accepted_rois().skip(1) {
        builder.insert(roi.roi, &roi.thresholds);
    }
    assert!(!builder.has_filtering_stats(&organized));
    assert!(matches!(
        builder.build(&organized),
        Err(CacheValidationError::Incomplete { roi: 10, .. })
    ));

    // The real build is complete.
    assert!(build_threshold_cache(&analysis).is_ok());
}

#[test]
fn test_all_nan_roi_is_excluded_not_fatal() {
    let stimulus = Stimulus::Single { frame: FIRST };
    let trials = (0..2)
        .map(|_| {
            trace(
                &[
                    (1, column(1.0, &[(FIRST, 0.1)])),
                    (2, vec![f32::NAN; FRAMES]),
                ],
                stimulus,
            )
        })
        .collect();
    let result = process_group(&ExperimentGroup::new("nan", trials), &config()).unwrap();

    assert_eq!(result.analysis.failures.len(), 1);
    assert_eq!(result.analysis.failures[0].roi, 2);
    assert!(result.analysis.roi(2).is_none());
    assert_eq!(result.cache.roi_numbers().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_batch_runs_every_group() {
    let good = ExperimentGroup::new(
        "good",
        vec![trace(
            &[(1, column(1.0, &[(FIRST, 0.1)]))],
            Stimulus::Single { frame: FIRST },
        )],
    );
    // Paired layout under a single-stimulus configuration.
    let mismatched = ExperimentGroup::new(
        "mismatched",
        vec![trace(
            &[(1, column(1.0, &[(FIRST, 0.1)]))],
            Stimulus::Paired {
                first: FIRST,
                second: SECOND,
            },
        )],
    );

    let results = process_batch(&[mismatched, good], &config());
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "mismatched");
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, "good");
    assert_eq!(results[1].1.as_ref().unwrap().cache.len(), 1);
}
