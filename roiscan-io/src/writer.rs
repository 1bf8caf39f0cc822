//! Per-group report files.
//!
//! Every threshold and noise label written here is read from a validated
//! [`ThresholdCache`]. A group without one has nothing to write.

use crate::Result;
use log::info;
use roiscan_core::cache::ThresholdCache;
use roiscan_core::response::{Event, GroupAnalysis, RoiAnalysis, TrialStatus};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const THRESHOLDS_HEADER: [&str; 11] = [
    "roi",
    "noise_level",
    "basic_threshold",
    "upper_threshold",
    "lower_threshold",
    "standard_deviation",
    "category",
    "paired_pulse_ratio",
    "passing_trials",
    "evaluated_trials",
    "label",
];

const EVENTS_HEADER: [&str; 15] = [
    "roi",
    "accepted",
    "category",
    "noise_level",
    "trial",
    "peak",
    "status",
    "reason",
    "event",
    "start_frame",
    "end_frame",
    "duration_ms",
    "peak_amplitude",
    "peak_frame",
    "valid",
];

/// Files written for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub thresholds: PathBuf,
    pub events: PathBuf,
    pub cache: PathBuf,
}

/// Writes `<group>_thresholds.csv`, `<group>_events.csv` and
/// `<group>_cache.json` into an output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Creates the writer, creating the output directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    fn path_for(&self, group: &str, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{group}_{suffix}"))
    }

    /// Writes all three report files for a group.
    ///
    /// # Errors
    /// Returns the first file error.
    pub fn write_group(
        &self,
        analysis: &GroupAnalysis,
        cache: &ThresholdCache,
    ) -> Result<ReportPaths> {
        let paths = ReportPaths {
            thresholds: self.write_thresholds(analysis, cache)?,
            events: self.write_events(analysis, cache)?,
            cache: self.write_cache_json(&analysis.name, cache)?,
        };
        info!(
            "group '{}': reports written to {}",
            analysis.name,
            self.output_dir.display()
        );
        Ok(paths)
    }

    /// One row per cached ROI, in ROI order.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_thresholds(
        &self,
        analysis: &GroupAnalysis,
        cache: &ThresholdCache,
    ) -> Result<PathBuf> {
        let path = self.path_for(&analysis.name, "thresholds.csv");
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(THRESHOLDS_HEADER)?;

        for (roi, set) in cache.iter() {
            let roi_analysis = analysis.roi(roi);
            let category = roi_analysis.map_or("", |r| r.verdict.category.as_str());
            let ratio = roi_analysis
                .and_then(|r| r.verdict.paired_pulse_ratio)
                .map(|ratio| ratio.to_string())
                .unwrap_or_default();
            let (passing, evaluated) = roi_analysis.map_or((0, 0), trial_counts);
            let label = cache
                .annotation(roi)
                .map(|annotation| annotation.to_string())
                .unwrap_or_default();

            writer.write_record([
                roi.to_string(),
                set.noise_level.as_str().to_string(),
                set.basic_threshold.to_string(),
                set.upper_threshold.to_string(),
                set.lower_threshold.to_string(),
                set.standard_deviation.to_string(),
                category.to_string(),
                ratio,
                passing.to_string(),
                evaluated.to_string(),
                label,
            ])?;
        }

        writer.flush()?;
        Ok(path)
    }

    /// Per ROI, trial and peak: pass/fail and every detected event.
    ///
    /// Rejected and failed ROIs are listed too; their noise level is blank
    /// because they have no cache entry.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_events(
        &self,
        analysis: &GroupAnalysis,
        cache: &ThresholdCache,
    ) -> Result<PathBuf> {
        let path = self.path_for(&analysis.name, "events.csv");
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(EVENTS_HEADER)?;

        for roi in &analysis.rois {
            let noise_level = cache.get(roi.roi).map_or("", |set| set.noise_level.as_str());
            let head = |trial: usize, peak: String, status: &str, reason: &str| {
                [
                    roi.roi.to_string(),
                    roi.verdict.accepted.to_string(),
                    roi.verdict.category.as_str().to_string(),
                    noise_level.to_string(),
                    trial.to_string(),
                    peak,
                    status.to_string(),
                    reason.to_string(),
                ]
            };
            for trial in &roi.trials {
                match &trial.status {
                    TrialStatus::Excluded(reason) => {
                        let row = head(trial.trial, String::new(), "excluded", reason.as_str());
                        writer.write_record(events_row(row, None))?;
                    }
                    TrialStatus::Evaluated(results) => {
                        for result in results {
                            let status = if result.passes { "pass" } else { "fail" };
                            let row = head(
                                trial.trial,
                                result.peak.number().to_string(),
                                status,
                                result.reason.as_str(),
                            );
                            if result.events.is_empty() {
                                writer.write_record(events_row(row.clone(), None))?;
                            }
                            for event in result.events.iter().enumerate() {
                                writer.write_record(events_row(row.clone(), Some(event)))?;
                            }
                        }
                    }
                }
            }
        }

        for failure in &analysis.failures {
            let row = [
                failure.roi.to_string(),
                false.to_string(),
                "none".to_string(),
                String::new(),
                String::new(),
                String::new(),
                "failed".to_string(),
                failure.error.as_str().to_string(),
            ];
            writer.write_record(events_row(row, None))?;
        }

        writer.flush()?;
        Ok(path)
    }

    /// Serializes the cache as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_cache_json(&self, group: &str, cache: &ThresholdCache) -> Result<PathBuf> {
        let path = self.path_for(group, "cache.json");
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, cache)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(path)
    }
}

/// Completes an events row with the event columns, left blank when there
/// is no event.
fn events_row(head: [String; 8], event: Option<(usize, &Event)>) -> Vec<String> {
    let mut row = Vec::from(head);
    match event {
        Some((index, event)) => row.extend([
            index.to_string(),
            event.start_frame.to_string(),
            event.end_frame.to_string(),
            event.duration_ms.to_string(),
            event.peak_amplitude.to_string(),
            event.peak_frame.to_string(),
            event.valid.to_string(),
        ]),
        None => row.resize(EVENTS_HEADER.len(), String::new()),
    }
    row
}

/// (passing, evaluated) trial counts over all peaks of an ROI.
fn trial_counts(roi: &RoiAnalysis) -> (usize, usize) {
    let evaluated = roi.evaluated_trials().count();
    let passing = roi
        .evaluated_trials()
        .filter(|trial| match &trial.status {
            TrialStatus::Evaluated(results) => results.iter().any(|result| result.passes),
            TrialStatus::Excluded(_) => false,
        })
        .count();
    (passing, evaluated)
}
