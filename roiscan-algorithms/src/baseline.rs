//! Baseline estimation over the pre-stimulus frame window.
#![allow(clippy::cast_precision_loss, clippy::missing_errors_doc)]

use ndarray::ArrayView1;
use roiscan_core::config::BaselineConfig;
use roiscan_core::error::{InvalidTraceReason, TraceError};
use roiscan_core::trace::{BaselineStats, RawTrace};
use std::ops::Range;

/// Effective baseline frames for a trace.
///
/// The configured range is clipped to the first stimulus frame and to the
/// trace length, so the baseline never contains evoked signal.
pub fn effective_window(
    frames: usize,
    first_stimulus: usize,
    config: &BaselineConfig,
) -> Range<usize> {
    let end = config.end_frame.min(first_stimulus).min(frames);
    let start = config.start_frame.min(end);
    start..end
}

/// Resolves the baseline window of a trial and checks its length.
///
/// # Errors
/// [`TraceError::InsufficientBaseline`] if the window is shorter than
/// `config.min_frames`. The window is shared by every ROI of the trial, so
/// this is a group-level failure.
pub fn check_window(trace: &RawTrace, config: &BaselineConfig) -> Result<Range<usize>, TraceError> {
    let window = effective_window(trace.frames(), trace.stimulus().first_frame(), config);
    if window.len() < config.min_frames {
        return Err(TraceError::InsufficientBaseline {
            available: window.len(),
            required: config.min_frames,
        });
    }
    Ok(window)
}

/// Baseline mean and sample SD of one ROI trace.
///
/// Only finite samples contribute. `f0` is floored at `config.min_f0`.
///
/// # Errors
/// [`TraceError::InvalidTrace`] if the trace has no finite samples at all,
/// or the window has fewer than `config.min_frames` finite samples.
pub fn estimate(
    roi: u32,
    samples: ArrayView1<'_, f32>,
    window: Range<usize>,
    config: &BaselineConfig,
) -> Result<BaselineStats, TraceError> {
    if !samples.iter().any(|value| value.is_finite()) {
        return Err(TraceError::InvalidTrace {
            roi,
            reason: InvalidTraceReason::AllNonFinite,
        });
    }

    let end = window.end.min(samples.len());
    let start = window.start.min(end);
    let finite: Vec<f64> = samples
        .iter()
        .skip(start)
        .take(end - start)
        .filter(|value| value.is_finite())
        .map(|&value| f64::from(value))
        .collect();

    if finite.len() < config.min_frames.max(2) {
        return Err(TraceError::InvalidTrace {
            roi,
            reason: InvalidTraceReason::NonFiniteBaseline {
                finite: finite.len(),
                required: config.min_frames.max(2),
            },
        });
    }

    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    Ok(BaselineStats {
        f0: mean.max(config.min_f0),
        sd: variance.sqrt(),
    })
}

/// Baseline statistics for every ROI column of a trial.
///
/// The outer error is group-level (window too short); inner errors are
/// per-ROI and leave the other columns unaffected.
pub fn estimate_trace(
    trace: &RawTrace,
    config: &BaselineConfig,
) -> Result<Vec<Result<BaselineStats, TraceError>>, TraceError> {
    let window = check_window(trace, config)?;
    Ok(trace
        .roi_numbers()
        .iter()
        .zip(trace.data().columns())
        .map(|(&roi, column)| estimate(roi, column, window.clone(), config))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};
    use roiscan_core::trace::Stimulus;

    fn config() -> BaselineConfig {
        BaselineConfig::default().with_range(0, 4).with_min_frames(3)
    }

    #[test]
    fn test_window_clipped_to_stimulus() {
        let cfg = BaselineConfig::default();
        assert_eq!(effective_window(1000, 150, &cfg), 0..150);
        assert_eq!(effective_window(100, 150, &cfg), 0..100);
        assert_eq!(effective_window(1000, 500, &cfg), 0..200);
    }

    #[test]
    fn test_mean_and_sample_sd() {
        let samples: Array1<f32> = array![2.0, 4.0, 4.0, 6.0, 100.0];
        let stats = estimate(1, samples.view(), 0..4, &config()).unwrap();

        assert_relative_eq!(stats.f0, 4.0);
        // Sample variance of [2, 4, 4, 6] is 8 / 3.
        assert_relative_eq!(stats.sd, (8.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_f0_is_floor_clamped() {
        let samples: Array1<f32> = array![-1.0, 1.0, -1.0, 1.0];
        let stats = estimate(1, samples.view(), 0..4, &config()).unwrap();
        assert_relative_eq!(stats.f0, 1e-6);
    }

    #[test]
    fn test_all_nan_trace_is_invalid() {
        let samples: Array1<f32> = Array1::from_elem(10, f32::NAN);
        let err = estimate(7, samples.view(), 0..4, &config()).unwrap_err();
        assert_eq!(
            err,
            TraceError::InvalidTrace {
                roi: 7,
                reason: InvalidTraceReason::AllNonFinite
            }
        );
    }

    #[test]
    fn test_nan_baseline_is_invalid() {
        let samples: Array1<f32> = array![f32::NAN, f32::NAN, 1.0, 1.0, 5.0, 6.0];
        let err = estimate(2, samples.view(), 0..4, &config()).unwrap_err();
        assert!(matches!(
            err,
            TraceError::InvalidTrace {
                reason: InvalidTraceReason::NonFiniteBaseline {
                    finite: 2,
                    required: 3
                },
                ..
            }
        ));
    }

    #[test]
    fn test_insufficient_baseline_is_group_level() {
        let data = Array2::<f32>::ones((10, 2));
        let trace = RawTrace::new(data, vec![1, 2], 5.0, Stimulus::Single { frame: 2 }).unwrap();

        let err = estimate_trace(&trace, &config()).unwrap_err();
        assert_eq!(
            err,
            TraceError::InsufficientBaseline {
                available: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_estimate_trace_isolates_bad_columns() {
        let mut data = Array2::<f32>::from_elem((8, 2), 10.0);
        data.column_mut(1).fill(f32::NAN);
        data[[1, 0]] = 12.0;
        let trace = RawTrace::new(data, vec![4, 5], 5.0, Stimulus::Single { frame: 5 }).unwrap();

        let stats = estimate_trace(&trace, &config()).unwrap();
        assert_eq!(stats.len(), 2);
        assert_relative_eq!(stats[0].as_ref().unwrap().f0, 10.5);
        assert!(stats[1].is_err());
    }
}
