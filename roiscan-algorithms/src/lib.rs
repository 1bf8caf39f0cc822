//! roiscan-algorithms: Signal classification for ROI fluorescence traces.
//!
//! Stages, in data-flow order:
//! - **Baseline** - per-ROI F0 and SD over the pre-stimulus window
//! - **Normalize** - ΔF/F0 traces
//! - **Noise** - adaptive low/high noise classification and thresholds
//! - **Hysteresis** - Schmitt-trigger event detection after each stimulus
//! - **Response** - per-ROI accept/reject for 1AP and PPF experiments
//!
//! [`process_group`] runs all stages and builds the validated threshold cache.
//!
#![warn(missing_docs)]

pub mod baseline;
pub mod hysteresis;
pub mod noise;
pub mod normalize;
mod processing;
mod response;

pub use hysteresis::{search_window, SchmittTrigger};
pub use processing::{
    analyze_group, build_threshold_cache, process_batch, process_group, GroupResult,
};
pub use response::{PairedPulseFilter, ResponseFilter, SingleStimulusFilter};

// Re-export core configuration for convenience
pub use roiscan_core::config::{AnalysisConfig, ExperimentType};
