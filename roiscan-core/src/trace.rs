//! Raw fluorescence traces and baseline statistics.

use crate::config::ExperimentType;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stimulus timing for one trial, as frame indices (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stimulus {
    /// Single stimulus (1AP).
    Single { frame: usize },
    /// Two stimuli (PPF). `second` is strictly after `first`.
    Paired { first: usize, second: usize },
}

impl Stimulus {
    /// The experiment type this stimulus layout belongs to.
    #[must_use]
    pub fn experiment_type(&self) -> ExperimentType {
        match self {
            Self::Single { .. } => ExperimentType::SingleStimulus,
            Self::Paired { .. } => ExperimentType::PairedPulse,
        }
    }

    /// Frame of the first stimulus.
    #[must_use]
    pub fn first_frame(&self) -> usize {
        match *self {
            Self::Single { frame } => frame,
            Self::Paired { first, .. } => first,
        }
    }

    /// Frame of the last stimulus.
    #[must_use]
    pub fn last_frame(&self) -> usize {
        match *self {
            Self::Single { frame } => frame,
            Self::Paired { second, .. } => second,
        }
    }
}

/// Raw intensity matrix for one trial: frames × ROIs.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrace {
    data: Array2<f32>,
    roi_numbers: Vec<u32>,
    ms_per_frame: f64,
    stimulus: Stimulus,
}

impl RawTrace {
    /// Creates a raw trace.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRawTrace`] if the column count does not match
    /// `roi_numbers`, ROI numbers repeat, the sampling interval is not
    /// positive, or a stimulus frame lies outside the trace.
    pub fn new(
        data: Array2<f32>,
        roi_numbers: Vec<u32>,
        ms_per_frame: f64,
        stimulus: Stimulus,
    ) -> Result<Self> {
        let (frames, columns) = data.dim();
        if columns != roi_numbers.len() {
            return Err(Error::InvalidRawTrace(format!(
                "{columns} columns but {} ROI numbers",
                roi_numbers.len()
            )));
        }
        let mut sorted = roi_numbers.clone();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::InvalidRawTrace(format!(
                "duplicate ROI number {}",
                pair[0]
            )));
        }
        if !(ms_per_frame.is_finite() && ms_per_frame > 0.0) {
            return Err(Error::InvalidRawTrace(format!(
                "sampling interval must be positive, got {ms_per_frame} ms"
            )));
        }
        if let Stimulus::Paired { first, second } = stimulus {
            if second <= first {
                return Err(Error::InvalidRawTrace(format!(
                    "second stimulus ({second}) must follow the first ({first})"
                )));
            }
        }
        if stimulus.last_frame() >= frames {
            return Err(Error::InvalidRawTrace(format!(
                "stimulus frame {} outside trace of {frames} frames",
                stimulus.last_frame()
            )));
        }

        Ok(Self {
            data,
            roi_numbers,
            ms_per_frame,
            stimulus,
        })
    }

    /// Number of frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.data.nrows()
    }

    /// Number of ROIs (columns).
    #[must_use]
    pub fn roi_count(&self) -> usize {
        self.data.ncols()
    }

    /// ROI numbers in column order.
    #[must_use]
    pub fn roi_numbers(&self) -> &[u32] {
        &self.roi_numbers
    }

    /// Column index of an ROI number.
    #[must_use]
    pub fn column_of(&self, roi: u32) -> Option<usize> {
        self.roi_numbers.iter().position(|&r| r == roi)
    }

    /// Trace of a single ROI.
    #[must_use]
    pub fn roi_trace(&self, roi: u32) -> Option<ArrayView1<'_, f32>> {
        self.column_of(roi).map(|column| self.data.column(column))
    }

    /// The full frames × ROIs matrix.
    #[must_use]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Sampling interval in milliseconds per frame.
    #[must_use]
    pub fn ms_per_frame(&self) -> f64 {
        self.ms_per_frame
    }

    /// Stimulus timing.
    #[must_use]
    pub fn stimulus(&self) -> Stimulus {
        self.stimulus
    }
}

/// A set of trials analyzed together. The threshold cache is built once per group.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentGroup {
    /// Group name, used for logging and report file names.
    pub name: String,
    /// One raw trace per trial.
    pub trials: Vec<RawTrace>,
}

impl ExperimentGroup {
    /// Creates a group from its trials.
    pub fn new(name: impl Into<String>, trials: Vec<RawTrace>) -> Self {
        Self {
            name: name.into(),
            trials,
        }
    }

    /// Sorted union of ROI numbers over all trials.
    #[must_use]
    pub fn roi_numbers(&self) -> Vec<u32> {
        let mut rois: Vec<u32> = self
            .trials
            .iter()
            .flat_map(|trial| trial.roi_numbers().iter().copied())
            .collect();
        rois.sort_unstable();
        rois.dedup();
        rois
    }
}

/// Baseline mean and standard deviation of one ROI in one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineStats {
    /// Baseline mean, floor-clamped to the configured minimum.
    pub f0: f64,
    /// Sample standard deviation of the raw baseline.
    pub sd: f64,
}

impl BaselineStats {
    /// Baseline SD expressed in ΔF/F units, i.e. the SD of the
    /// normalized baseline.
    #[must_use]
    pub fn relative_sd(&self) -> f64 {
        self.sd / self.f0
    }
}
