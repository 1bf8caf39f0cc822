//! JSON settings files.
//!
//! Every section and field is optional; missing values take the defaults of
//! [`AnalysisConfig`]. For example:
//!
//! ```json
//! {
//!   "experiment_type": "paired_pulse",
//!   "baseline": { "start_frame": 0, "end_frame": 100 },
//!   "thresholds": { "sd_multiplier": 2.5 },
//!   "response": { "min_trials": { "fraction": 0.5 } }
//! }
//! ```

use crate::Result;
use roiscan_core::config::AnalysisConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Parses and validates settings from a JSON string.
///
/// # Errors
/// Returns an error if the JSON is malformed or a value fails validation.
pub fn settings_from_json(json: &str) -> Result<AnalysisConfig> {
    let config: AnalysisConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates settings from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read, the JSON is malformed, or a
/// value fails validation.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<AnalysisConfig> {
    let reader = BufReader::new(File::open(path)?);
    let config: AnalysisConfig = serde_json::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use approx::assert_relative_eq;
    use roiscan_core::config::{ExperimentType, TrialRequirement};

    #[test]
    fn test_partial_settings_keep_defaults() {
        let json = r#"{
            "experiment_type": "paired_pulse",
            "baseline": { "end_frame": 100 },
            "thresholds": { "sd_multiplier": 2.5 },
            "response": { "min_trials": { "fraction": 0.5 } }
        }"#;
        let config = settings_from_json(json).unwrap();

        assert_eq!(config.experiment_type, ExperimentType::PairedPulse);
        assert_eq!(config.baseline.end_frame, 100);
        assert_eq!(config.baseline.min_frames, 20);
        assert_relative_eq!(config.thresholds.sd_multiplier, 2.5);
        assert_relative_eq!(config.thresholds.low_noise_cutoff, 0.02);
        assert_eq!(config.response.min_trials, TrialRequirement::Fraction(0.5));
        assert_eq!(config.detection.post_stimulus_window, 30);
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(settings_from_json("{}").unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let bad_value = settings_from_json(r#"{ "thresholds": { "lower_multiplier": 2.0 } }"#);
        assert!(matches!(bad_value, Err(Error::CoreError(_))));

        let bad_json = settings_from_json(r#"{ "thresholds": "#);
        assert!(matches!(bad_json, Err(Error::Json(_))));
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "detection": { "min_event_duration_ms": 15.0 } }"#).unwrap();

        let config = load_settings(&path).unwrap();
        assert_relative_eq!(config.detection.min_event_duration_ms, 15.0);

        assert!(matches!(
            load_settings(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
