//! roiscan-core: Core types for evoked-response classification of ROI traces.
//!
//! This crate provides the data model shared by every stage of the
//! pipeline: raw traces, baseline statistics, threshold sets, detected
//! events, per-group analysis results, and the validated threshold cache
//! that report writers and plot renderers read from.
//!

pub mod cache;
pub mod config;
pub mod error;
pub mod response;
pub mod threshold;
pub mod trace;

pub use cache::{ThresholdAnnotation, ThresholdCache, ThresholdCacheBuilder};
pub use config::{
    AnalysisConfig, BaselineConfig, DetectionConfig, ExperimentType, ResponseConfig,
    ThresholdConfig, TrialRequirement,
};
pub use error::{CacheValidationError, Error, InvalidTraceReason, Result, TraceError};
pub use response::{
    Event, GroupAnalysis, GroupStatistics, Peak, RejectReason, ResponseCategory, RoiAnalysis,
    RoiFailure, RoiVerdict, TrialFilterResult, TrialOutcome, TrialReason, TrialStatus,
};
pub use threshold::{NoiseLevel, ThresholdSet};
pub use trace::{BaselineStats, ExperimentGroup, RawTrace, Stimulus};
