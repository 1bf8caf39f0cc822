//! CSV trace readers.
//!
//! Layout: a header row `Frame,<roi>,<roi>,...` followed by one row per
//! frame. Each ROI header ends in its ROI number (`ROI 12`, `roi_12`, `12`).
//! Blank and `NaN` cells read as NaN.

use crate::{Error, Result};
use log::{debug, info};
use ndarray::Array2;
use roiscan_core::trace::{ExperimentGroup, RawTrace, Stimulus};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Acquisition timing that the trace files themselves do not carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceTiming {
    /// Sampling interval in milliseconds per frame.
    pub ms_per_frame: f64,
    /// Stimulus frame(s), 0-based data row indices.
    pub stimulus: Stimulus,
}

impl TraceTiming {
    /// Timing for a single-stimulus recording.
    #[must_use]
    pub fn single(ms_per_frame: f64, frame: usize) -> Self {
        Self {
            ms_per_frame,
            stimulus: Stimulus::Single { frame },
        }
    }

    /// Timing for a paired-pulse recording.
    #[must_use]
    pub fn paired(ms_per_frame: f64, first: usize, second: usize) -> Self {
        Self {
            ms_per_frame,
            stimulus: Stimulus::Paired { first, second },
        }
    }
}

/// Extracts the trailing integer of an ROI column header.
#[must_use]
pub fn parse_roi_number(header: &str) -> Option<u32> {
    let header = header.trim();
    let prefix = header.trim_end_matches(|c: char| c.is_ascii_digit());
    if prefix.len() == header.len() {
        return None;
    }
    header[prefix.len()..].parse().ok()
}

fn parse_cell(cell: &str) -> Option<f32> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f32::NAN);
    }
    cell.parse().ok()
}

/// Reads one trial from any CSV source.
///
/// # Errors
/// Returns an error on malformed CSV, non-numeric cells, headers without an
/// ROI number, an empty table, or timing that does not fit the trace.
pub fn read_trace_from<R: Read>(source: R, timing: &TraceTiming) -> Result<RawTrace> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(Error::InvalidFormat(
            "expected a frame column and at least one ROI column".into(),
        ));
    }
    let roi_numbers = headers
        .iter()
        .skip(1)
        .map(|header| {
            parse_roi_number(header).ok_or_else(|| {
                Error::InvalidFormat(format!("no ROI number in column header '{header}'"))
            })
        })
        .collect::<Result<Vec<u32>>>()?;

    let mut values = Vec::new();
    let mut frames = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (column, cell) in record.iter().enumerate().skip(1) {
            let value = parse_cell(cell).ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "row {}, column {}: '{cell}' is not a number",
                    row + 1,
                    column + 1
                ))
            })?;
            values.push(value);
        }
        frames += 1;
    }
    if frames == 0 {
        return Err(Error::InvalidFormat("no data rows".into()));
    }

    let data = Array2::from_shape_vec((frames, roi_numbers.len()), values)
        .map_err(|e| Error::InvalidFormat(e.to_string()))?;
    Ok(RawTrace::new(
        data,
        roi_numbers,
        timing.ms_per_frame,
        timing.stimulus,
    )?)
}

/// Reads one trial from a CSV file.
///
/// # Errors
/// Same as [`read_trace_from`], plus file errors. Format errors name the file.
pub fn read_trace<P: AsRef<Path>>(path: P, timing: &TraceTiming) -> Result<RawTrace> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read_trace_from(file, timing).map_err(|error| match error {
        Error::InvalidFormat(message) => {
            Error::InvalidFormat(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Reads every `*.csv` file in `dir`, sorted by file name, as the trials of
/// one group named after the directory.
///
/// # Errors
/// Returns the first error from listing the directory or reading a trace.
pub fn read_group_dir<P: AsRef<Path>>(dir: P, timing: &TraceTiming) -> Result<ExperimentGroup> {
    let dir = dir.as_ref();
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()?;
    paths.retain(|path| {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    });
    paths.sort();

    let trials = paths
        .iter()
        .map(|path| {
            debug!("reading trial {}", path.display());
            read_trace(path, timing)
        })
        .collect::<Result<Vec<_>>>()?;

    let name = dir.file_name().map_or_else(
        || dir.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    );
    info!("group '{name}': {} trials from {}", trials.len(), dir.display());
    Ok(ExperimentGroup::new(name, trials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_roi_number() {
        assert_eq!(parse_roi_number("ROI 12"), Some(12));
        assert_eq!(parse_roi_number("roi_7"), Some(7));
        assert_eq!(parse_roi_number(" 42 "), Some(42));
        assert_eq!(parse_roi_number("Mean1"), Some(1));
        assert_eq!(parse_roi_number("ROI"), None);
        assert_eq!(parse_roi_number(""), None);
    }

    #[test]
    fn test_read_trace_from_csv() {
        let csv = "Frame,ROI 3,ROI 8\n0,100,50\n1,,51\n2,NaN,52\n3,101.5,53\n";
        let trace = read_trace_from(Cursor::new(csv), &TraceTiming::single(5.0, 2)).unwrap();

        assert_eq!(trace.frames(), 4);
        assert_eq!(trace.roi_numbers(), &[3, 8]);
        let roi3 = trace.roi_trace(3).unwrap();
        assert!((roi3[0] - 100.0).abs() < f32::EPSILON);
        assert!(roi3[1].is_nan());
        assert!(roi3[2].is_nan());
        assert!((roi3[3] - 101.5).abs() < f32::EPSILON);
        assert_eq!(trace.stimulus(), Stimulus::Single { frame: 2 });
    }

    #[test]
    fn test_rejects_bad_input() {
        let timing = TraceTiming::single(5.0, 0);

        let no_roi = read_trace_from(Cursor::new("Frame\n0\n"), &timing);
        assert!(matches!(no_roi, Err(Error::InvalidFormat(_))));

        let bad_header = read_trace_from(Cursor::new("Frame,Mean\n0,1\n"), &timing);
        assert!(matches!(bad_header, Err(Error::InvalidFormat(_))));

        let bad_cell = read_trace_from(Cursor::new("Frame,ROI 1\n0,abc\n"), &timing);
        assert!(matches!(bad_cell, Err(Error::InvalidFormat(_))));

        let ragged = read_trace_from(Cursor::new("Frame,ROI 1,ROI 2\n0,1,2\n1,1\n"), &timing);
        assert!(matches!(ragged, Err(Error::Csv(_))));

        let empty = read_trace_from(Cursor::new("Frame,ROI 1\n"), &timing);
        assert!(matches!(empty, Err(Error::InvalidFormat(_))));

        let duplicate = read_trace_from(Cursor::new("Frame,ROI 1,roi_1\n0,1,2\n"), &timing);
        assert!(matches!(duplicate, Err(Error::CoreError(_))));

        let late_stimulus =
            read_trace_from(Cursor::new("Frame,ROI 1\n0,1\n"), &TraceTiming::single(5.0, 3));
        assert!(matches!(late_stimulus, Err(Error::CoreError(_))));
    }
}
