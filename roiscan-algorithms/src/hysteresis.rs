//! Hysteresis ("Schmitt trigger") event detection.
//!
//! An event opens when the trace exceeds the upper threshold and closes when
//! it drops below the lower threshold or the search window ends. Each run is
//! judged on its own duration, so a one-frame noise spike is rejected while a
//! sustained response only has to stay above the lower threshold.
#![allow(clippy::cast_precision_loss)]

use ndarray::ArrayView1;
use roiscan_core::config::DetectionConfig;
use roiscan_core::response::Event;
use roiscan_core::threshold::ThresholdSet;
use std::ops::Range;

/// Frames searched after a stimulus: `stimulus + 1 ..= stimulus + post_window`,
/// clipped to `limit` (exclusive).
pub fn search_window(stimulus_frame: usize, post_window: usize, limit: usize) -> Range<usize> {
    let start = stimulus_frame.saturating_add(1);
    let end = stimulus_frame
        .saturating_add(post_window)
        .saturating_add(1)
        .min(limit);
    start.min(end)..end
}

#[derive(Clone, Copy, Debug)]
enum State {
    Below,
    Above {
        start: usize,
        last: usize,
        peak: f64,
        peak_frame: usize,
    },
}

/// Two-threshold event detector for one ROI.
#[derive(Clone, Debug)]
pub struct SchmittTrigger {
    upper: f64,
    lower: f64,
    ms_per_frame: f64,
    min_event_duration_ms: f64,
}

impl SchmittTrigger {
    /// Creates a detector from explicit levels.
    pub fn new(upper: f64, lower: f64, ms_per_frame: f64, min_event_duration_ms: f64) -> Self {
        Self {
            upper,
            lower,
            ms_per_frame,
            min_event_duration_ms,
        }
    }

    /// Creates a detector from an ROI's thresholds.
    pub fn from_thresholds(
        thresholds: &ThresholdSet,
        ms_per_frame: f64,
        config: &DetectionConfig,
    ) -> Self {
        Self::new(
            thresholds.upper_threshold,
            thresholds.lower_threshold,
            ms_per_frame,
            config.min_event_duration_ms,
        )
    }

    /// Upper (turn-on) threshold.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Lower (turn-off) threshold.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    fn close(&self, state: State) -> Option<Event> {
        match state {
            State::Below => None,
            State::Above {
                start,
                last,
                peak,
                peak_frame,
            } => {
                let duration_ms = (last - start + 1) as f64 * self.ms_per_frame;
                Some(Event {
                    start_frame: start,
                    end_frame: last,
                    duration_ms,
                    peak_amplitude: peak,
                    peak_frame,
                    valid: duration_ms >= self.min_event_duration_ms,
                })
            }
        }
    }

    /// Scans `window` of a normalized trace and returns every completed run.
    ///
    /// Non-finite samples never open an event and close an open one.
    pub fn detect(&self, trace: ArrayView1<'_, f32>, window: Range<usize>) -> Vec<Event> {
        let end = window.end.min(trace.len());
        let start = window.start.min(end);

        let mut events = Vec::new();
        let mut state = State::Below;

        for frame in start..end {
            let value = f64::from(trace[frame]);
            state = match state {
                State::Below if value.is_finite() && value > self.upper => State::Above {
                    start: frame,
                    last: frame,
                    peak: value,
                    peak_frame: frame,
                },
                State::Below => State::Below,
                State::Above { .. } if !value.is_finite() || value < self.lower => {
                    events.extend(self.close(state));
                    State::Below
                }
                State::Above {
                    start,
                    peak,
                    peak_frame,
                    ..
                } => {
                    let (peak, peak_frame) = if value > peak {
                        (value, frame)
                    } else {
                        (peak, peak_frame)
                    };
                    State::Above {
                        start,
                        last: frame,
                        peak,
                        peak_frame,
                    }
                }
            };
        }

        // Window ended while still above.
        events.extend(self.close(state));
        events
    }
}
