//! Validated, read-only threshold cache.
//!
//! Every consumer of a group (report writer, plot renderer) reads thresholds
//! from the same [`ThresholdCache`]. A cache can only be obtained through
//! [`ThresholdCacheBuilder::build`], which validates it first; a failed
//! validation discards the whole cache. There is no partial cache and no
//! fallback recomputation.

use crate::config::ExperimentType;
use crate::error::CacheValidationError;
use crate::threshold::{NoiseLevel, ThresholdSet};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Accumulates per-ROI filtering statistics before validation.
///
/// Noise level, thresholds and SD are kept in separate sub-maps so that a
/// missing field for any ROI is caught at build time.
#[derive(Debug, Clone, Default)]
pub struct ThresholdCacheBuilder {
    experiment_type: ExperimentType,
    noise_levels: BTreeMap<u32, NoiseLevel>,
    basic_thresholds: BTreeMap<u32, f64>,
    upper_thresholds: BTreeMap<u32, f64>,
    lower_thresholds: BTreeMap<u32, f64>,
    standard_deviations: BTreeMap<u32, f64>,
}

impl ThresholdCacheBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(experiment_type: ExperimentType) -> Self {
        Self {
            experiment_type,
            ..Self::default()
        }
    }

    /// Records every field of a threshold set.
    pub fn insert(&mut self, roi: u32, set: &ThresholdSet) -> &mut Self {
        self.record_noise_level(roi, set.noise_level)
            .record_thresholds(
                roi,
                set.basic_threshold,
                set.upper_threshold,
                set.lower_threshold,
            )
            .record_standard_deviation(roi, set.standard_deviation)
    }

    /// Records the noise level of an ROI.
    pub fn record_noise_level(&mut self, roi: u32, level: NoiseLevel) -> &mut Self {
        self.noise_levels.insert(roi, level);
        self
    }

    /// Records the basic, upper and lower thresholds of an ROI.
    pub fn record_thresholds(
        &mut self,
        roi: u32,
        basic: f64,
        upper: f64,
        lower: f64,
    ) -> &mut Self {
        self.basic_thresholds.insert(roi, basic);
        self.upper_thresholds.insert(roi, upper);
        self.lower_thresholds.insert(roi, lower);
        self
    }

    /// Records the baseline SD of an ROI.
    pub fn record_standard_deviation(&mut self, roi: u32, sd: f64) -> &mut Self {
        self.standard_deviations.insert(roi, sd);
        self
    }

    /// Returns true when every sub-map has an entry for every ROI in `rois`.
    #[must_use]
    pub fn has_filtering_stats(&self, rois: &BTreeSet<u32>) -> bool {
        rois.iter().all(|roi| self.missing_field(*roi).is_none())
    }

    fn missing_field(&self, roi: u32) -> Option<&'static str> {
        if !self.noise_levels.contains_key(&roi) {
            Some("noise level")
        } else if !self.basic_thresholds.contains_key(&roi) {
            Some("basic threshold")
        } else if !self.upper_thresholds.contains_key(&roi) {
            Some("upper threshold")
        } else if !self.lower_thresholds.contains_key(&roi) {
            Some("lower threshold")
        } else if !self.standard_deviations.contains_key(&roi) {
            Some("standard deviation")
        } else {
            None
        }
    }

    fn recorded_rois(&self) -> BTreeSet<u32> {
        self.noise_levels
            .keys()
            .chain(self.basic_thresholds.keys())
            .chain(self.upper_thresholds.keys())
            .chain(self.lower_thresholds.keys())
            .chain(self.standard_deviations.keys())
            .copied()
            .collect()
    }

    /// Validates and freezes the cache.
    ///
    /// `organized_rois` is the set of ROI numbers in the group's organized
    /// (filtered) data. The cache is valid iff it is non-empty, every ROI has
    /// all filtering stats, `upper >= lower > 0` holds for every entry, and the
    /// cached ROI set equals `organized_rois`.
    ///
    /// # Errors
    /// Returns the first [`CacheValidationError`] found.
    pub fn build(
        self,
        organized_rois: &BTreeSet<u32>,
    ) -> Result<ThresholdCache, CacheValidationError> {
        let recorded = self.recorded_rois();
        if recorded.is_empty() || organized_rois.is_empty() {
            return Err(CacheValidationError::Empty);
        }

        // Any ROI touched by the builder or present in the data must be complete.
        for &roi in recorded.union(organized_rois) {
            if let Some(missing) = self.missing_field(roi) {
                return Err(CacheValidationError::Incomplete { roi, missing });
            }
        }

        let unexpected: Vec<u32> = recorded.difference(organized_rois).copied().collect();
        if !unexpected.is_empty() {
            return Err(CacheValidationError::RoiSetMismatch { unexpected });
        }

        let mut entries = BTreeMap::new();
        for roi in recorded {
            let set = ThresholdSet {
                basic_threshold: self.basic_thresholds[&roi],
                upper_threshold: self.upper_thresholds[&roi],
                lower_threshold: self.lower_thresholds[&roi],
                noise_level: self.noise_levels[&roi],
                standard_deviation: self.standard_deviations[&roi],
            };
            if !set.is_consistent() {
                return Err(CacheValidationError::InconsistentThresholds {
                    roi,
                    upper: set.upper_threshold,
                    lower: set.lower_threshold,
                });
            }
            entries.insert(roi, set);
        }

        Ok(ThresholdCache {
            experiment_type: self.experiment_type,
            has_filtering_stats: true,
            entries,
        })
    }
}

/// Immutable ROI number → [`ThresholdSet`] lookup for one group.
///
/// Only constructible through [`ThresholdCacheBuilder::build`]. Safe to share
/// across threads behind an `Arc` without locking.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ThresholdCache {
    experiment_type: ExperimentType,
    has_filtering_stats: bool,
    entries: BTreeMap<u32, ThresholdSet>,
}

impl ThresholdCache {
    /// Threshold set of an ROI.
    #[must_use]
    pub fn get(&self, roi: u32) -> Option<&ThresholdSet> {
        self.entries.get(&roi)
    }

    /// Entries in ascending ROI order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ThresholdSet)> {
        self.entries.iter().map(|(roi, set)| (*roi, set))
    }

    /// Cached ROI numbers in ascending order.
    pub fn roi_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Number of cached ROIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a validated cache.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Experiment type of the group.
    #[must_use]
    pub fn experiment_type(&self) -> ExperimentType {
        self.experiment_type
    }

    /// True when every sub-map was complete for every ROI.
    #[must_use]
    pub fn has_filtering_stats(&self) -> bool {
        self.has_filtering_stats
    }

    /// Plot annotation for an ROI. Every figure mentioning the ROI uses this
    /// so threshold lines and labels never disagree.
    #[must_use]
    pub fn annotation(&self, roi: u32) -> Option<ThresholdAnnotation> {
        self.get(roi).map(|set| ThresholdAnnotation {
            roi,
            noise_level: set.noise_level,
            threshold: set.upper_threshold,
            lower_threshold: set.lower_threshold,
        })
    }
}

/// What a plot draws for one ROI: one threshold line and its label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdAnnotation {
    pub roi: u32,
    pub noise_level: NoiseLevel,
    /// Height of the threshold line (the upper threshold).
    pub threshold: f64,
    pub lower_threshold: f64,
}

impl std::fmt::Display for ThresholdAnnotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ROI {} · {} noise · thr {:.4}",
            self.roi, self.noise_level, self.threshold
        )
    }
}
