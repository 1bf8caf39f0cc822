#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
use ndarray::Array1;
use roiscan_algorithms::noise::classify;
use roiscan_algorithms::{search_window, SchmittTrigger};
use roiscan_core::{DetectionConfig, ThresholdConfig};

const MS_PER_FRAME: f64 = 5.0;

/// Flat trace with a plateau of `height` over `start..start + len`.
fn plateau(frames: usize, start: usize, len: usize, height: f32) -> Array1<f32> {
    Array1::from_shape_fn(frames, |frame| {
        if frame >= start && frame < start + len {
            height
        } else {
            0.0
        }
    })
}

#[test]
fn test_spike_length_decides_validity() {
    let detection = DetectionConfig::default();
    for sd in [0.002, 0.005, 0.01, 0.02, 0.05] {
        let thresholds = classify(sd, &ThresholdConfig::default());
        let trigger = SchmittTrigger::from_thresholds(&thresholds, MS_PER_FRAME, &detection);
        let height = (thresholds.upper_threshold * 1.5) as f32;

        for len in 1..=6 {
            let trace = plateau(100, 30, len, height);
            let events = trigger.detect(trace.view(), search_window(20, 30, 100));

            assert_eq!(events.len(), 1, "sd={sd} len={len}");
            let event = events[0];
            assert_eq!(event.start_frame, 30);
            assert_eq!(event.end_frame, 30 + len - 1);
            assert!((event.duration_ms - len as f64 * MS_PER_FRAME).abs() < 1e-9);
            assert_eq!(event.valid, len >= 2, "sd={sd} len={len}");
        }
    }
}

#[test]
fn test_sub_threshold_traces_never_trigger() {
    let thresholds = classify(0.01, &ThresholdConfig::default());
    let trigger =
        SchmittTrigger::from_thresholds(&thresholds, MS_PER_FRAME, &DetectionConfig::default());

    // Anything below the upper threshold, however long, is silent.
    for scale in [0.0, 0.25, 0.5, 0.9, 0.99] {
        let height = (thresholds.upper_threshold * scale) as f32;
        let trace = Array1::from_elem(100, height);
        let events = trigger.detect(trace.view(), search_window(20, 30, 100));
        assert!(events.is_empty(), "scale={scale}");
    }
}

#[test]
fn test_events_are_disjoint_and_ordered() {
    let trigger = SchmittTrigger::new(0.1, 0.05, MS_PER_FRAME, 10.0);
    let pattern: [f32; 11] = [0.0, 0.2, 0.2, 0.0, 0.2, 0.07, 0.07, 0.02, 0.3, 0.0, 0.15];
    let trace = Array1::from_iter(pattern.iter().copied().cycle().take(60));
    let events = trigger.detect(trace.view(), 0..60);

    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[0].end_frame < pair[1].start_frame);
    }
    for event in &events {
        assert!(event.start_frame <= event.peak_frame && event.peak_frame <= event.end_frame);
        assert!(f64::from(trace[event.start_frame]) > trigger.upper());
        assert!(event.peak_amplitude > trigger.upper());
        // A run holds until a sample drops below the lower threshold.
        assert!(f64::from(trace[event.end_frame]) >= trigger.lower());
        if event.end_frame + 1 < trace.len() {
            assert!(f64::from(trace[event.end_frame + 1]) < trigger.lower());
        }
    }
}

#[test]
fn test_higher_noise_needs_larger_response() {
    let detection = DetectionConfig::default();
    let quiet = classify(0.004, &ThresholdConfig::default());
    let noisy = classify(0.03, &ThresholdConfig::default());
    let response = plateau(100, 30, 4, 0.05);

    let quiet_events = SchmittTrigger::from_thresholds(&quiet, MS_PER_FRAME, &detection)
        .detect(response.view(), search_window(20, 30, 100));
    let noisy_events = SchmittTrigger::from_thresholds(&noisy, MS_PER_FRAME, &detection)
        .detect(response.view(), search_window(20, 30, 100));

    assert!(quiet_events.iter().any(|event| event.valid));
    assert!(noisy_events.is_empty());
}
