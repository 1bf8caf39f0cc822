//! roiscan-io: Trace input, settings and report output for roiscan.
//!
//! - [`read_trace`] / [`read_group_dir`] load raw traces from CSV
//! - [`load_settings`] loads a validated [`roiscan_core::AnalysisConfig`] from JSON
//! - [`ReportWriter`] writes the per-group threshold table, event table and
//!   cache export, reading thresholds only from a validated cache
//!

mod error;
mod reader;
mod settings;
mod writer;

pub use error::{Error, Result};
pub use reader::{parse_roi_number, read_group_dir, read_trace, read_trace_from, TraceTiming};
pub use settings::{load_settings, settings_from_json};
pub use writer::{ReportPaths, ReportWriter};
