//! Error types for roiscan-core.

use thiserror::Error;

/// Result type alias for roiscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a trace could not be used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTraceReason {
    /// Every sample in the trace is NaN or infinite.
    AllNonFinite,
    /// The baseline window holds too few finite samples.
    NonFiniteBaseline { finite: usize, required: usize },
}

impl InvalidTraceReason {
    /// Short label used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllNonFinite => "all_non_finite",
            Self::NonFiniteBaseline { .. } => "non_finite_baseline",
        }
    }
}

impl std::fmt::Display for InvalidTraceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllNonFinite => write!(f, "trace contains no finite samples"),
            Self::NonFiniteBaseline { finite, required } => write!(
                f,
                "baseline has {finite} finite samples, {required} required"
            ),
        }
    }
}

/// Per-trace errors. These are recoverable: the affected ROI or trial is
/// recorded and excluded while the rest of the group proceeds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    /// The baseline window is shorter than the configured minimum.
    #[error("insufficient baseline: {available} frames available, {required} required")]
    InsufficientBaseline { available: usize, required: usize },

    /// All-NaN or otherwise non-finite trace.
    #[error("invalid trace for ROI {roi}: {reason}")]
    InvalidTrace { roi: u32, reason: InvalidTraceReason },

    /// Array dimensions do not line up.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

impl TraceError {
    /// Short label used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientBaseline { .. } => "insufficient_baseline",
            Self::InvalidTrace { reason, .. } => reason.as_str(),
            Self::ShapeMismatch { .. } => "shape_mismatch",
        }
    }
}

/// Threshold cache failed completeness or invariant checks.
///
/// A cache that fails validation is discarded whole; consumers for that
/// group must be skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheValidationError {
    /// No ROI made it into the cache.
    #[error("threshold cache is empty")]
    Empty,

    /// A required sub-map has no entry for this ROI.
    #[error("ROI {roi} is missing {missing}")]
    Incomplete { roi: u32, missing: &'static str },

    /// `upper >= lower > 0` does not hold.
    #[error("ROI {roi} has inconsistent thresholds (upper {upper}, lower {lower})")]
    InconsistentThresholds { roi: u32, upper: f64, lower: f64 },

    /// Cache holds ROIs that are not in the organized group data.
    #[error("ROI set mismatch: {unexpected:?} not in the group data")]
    RoiSetMismatch { unexpected: Vec<u32> },
}

/// Core error types for roiscan operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Trace-level error that was fatal for the whole group.
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    /// Threshold cache validation failed.
    #[error("cache validation error: {0}")]
    CacheValidation(#[from] CacheValidationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Trace stimulus layout does not fit the configured experiment type.
    #[error("stimulus mismatch: expected {expected}, got {actual}")]
    StimulusMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A group without any trials.
    #[error("group '{0}' has no trials")]
    EmptyGroup(String),

    /// Raw trace could not be constructed.
    #[error("invalid raw trace: {0}")]
    InvalidRawTrace(String),
}
