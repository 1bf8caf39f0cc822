//! ΔF/F0 normalization.
#![allow(clippy::cast_possible_truncation, clippy::missing_errors_doc)]

use ndarray::{Array1, Array2, ArrayView1, Zip};
use roiscan_core::error::TraceError;
use roiscan_core::trace::{BaselineStats, RawTrace};

/// `(raw - f0) / f0`. NaN in, NaN out.
#[inline]
fn delta_f_over_f(raw: f32, f0: f64) -> f32 {
    ((f64::from(raw) - f0) / f0) as f32
}

/// Normalizes a single ROI trace.
pub fn normalize(samples: ArrayView1<'_, f32>, stats: &BaselineStats) -> Array1<f32> {
    samples.mapv(|raw| delta_f_over_f(raw, stats.f0))
}

/// Normalizes every ROI of a trial in one pass.
///
/// `baselines` is indexed by column. Columns without baseline statistics
/// come out as all-NaN rather than zero.
///
/// # Errors
/// [`TraceError::ShapeMismatch`] if `baselines` does not have one entry per column.
pub fn normalize_trace(
    trace: &RawTrace,
    baselines: &[Option<BaselineStats>],
) -> Result<Array2<f32>, TraceError> {
    if baselines.len() != trace.roi_count() {
        return Err(TraceError::ShapeMismatch {
            expected: trace.roi_count(),
            actual: baselines.len(),
        });
    }

    let f0: Array1<f64> = baselines
        .iter()
        .map(|stats| stats.map_or(f64::NAN, |s| s.f0))
        .collect();

    let data = trace.data();
    let mut normalized = Array2::<f32>::zeros(data.raw_dim());
    Zip::from(&mut normalized)
        .and(data)
        .and_broadcast(&f0)
        .for_each(|out, &raw, &f0| *out = delta_f_over_f(raw, f0));

    Ok(normalized)
}
