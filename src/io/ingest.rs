//! PTI text-record ingest.
//!
//! The spectrofluorometer software exports three plain-text layouts, told
//! apart by their first line:
//!
//! - `<Session>`: an acquisition with raw and instrument-corrected columns,
//!   followed by an `ExCorr` block holding the reference diode signal
//! - `<Trace>`: a single wavelength/intensity column pair
//! - `<Group>`: a calibration table (the excitation/emission LUTs)
//!
//! Only what the pipeline needs is extracted: wavelengths, raw intensity,
//! diode signal, nominal ranges, PMT mode and the acquisition time.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::debug;

use crate::correct::CorrectionTable;
use crate::domain::{PmtMode, Spectrum};
use crate::error::QyError;

const SESSION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout of a PTI text record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Session,
    Trace,
    Group,
}

impl RecordKind {
    fn detect(path: &Path, first_line: &str) -> Result<Self, QyError> {
        if first_line.contains("<Session>") {
            Ok(RecordKind::Session)
        } else if first_line.contains("<Trace>") {
            Ok(RecordKind::Trace)
        } else if first_line.contains("<Group>") {
            Ok(RecordKind::Group)
        } else {
            Err(QyError::parse(
                path,
                1,
                "unknown record type (expected <Session>, <Trace> or <Group>)",
            ))
        }
    }
}

/// Parsed range line: PMT mode plus nominal excitation/emission ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLine {
    pub pmt_mode: PmtMode,
    pub ex_range: Vec<f64>,
    pub em_range: Vec<f64>,
}

/// A `<Trace>` record.
#[derive(Debug, Clone)]
pub struct Trace {
    pub source: String,
    pub range: RangeLine,
    /// `true` when the range line carries the `COR` marker.
    pub corrected: bool,
    pub wavelengths: Vec<f64>,
    pub values: Vec<f64>,
}

impl Trace {
    /// Treat a raw trace as a spectrum with a flat (unit) diode signal.
    pub fn into_spectrum(self) -> Result<Spectrum, QyError> {
        if self.corrected {
            return Err(QyError::config(format!(
                "Trace '{}' is already instrument-corrected; a raw trace is required.",
                self.source
            )));
        }
        let n = self.wavelengths.len();
        Ok(Spectrum::new(
            self.source,
            self.range.ex_range,
            self.range.em_range,
            self.wavelengths,
            self.values,
            vec![1.0; n],
        )?
        .with_pmt_mode(self.range.pmt_mode))
    }
}

/// Text of a file split into lines, with its path for error context.
struct Lines {
    path: PathBuf,
    lines: Vec<String>,
}

impl Lines {
    fn read(path: &Path) -> Result<Self, QyError> {
        let text = fs::read_to_string(path).map_err(|source| QyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: text.lines().map(str::to_string).collect(),
        })
    }

    /// Line `idx` (0-based); errors report 1-based numbers.
    fn get(&self, idx: usize) -> Result<&str, QyError> {
        self.lines
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| QyError::parse(&self.path, idx + 1, "unexpected end of file"))
    }

    fn err(&self, idx: usize, message: impl Into<String>) -> QyError {
        QyError::parse(&self.path, idx + 1, message)
    }

    fn first_token_usize(&self, idx: usize) -> Result<usize, QyError> {
        let line = self.get(idx)?;
        let token = line
            .split_whitespace()
            .next()
            .ok_or_else(|| self.err(idx, "expected a sample count"))?;
        token
            .parse()
            .map_err(|e| self.err(idx, format!("invalid sample count '{token}': {e}")))
    }

    /// Columns `cols` of `count` whitespace-separated numeric lines starting at `start`.
    fn columns<const N: usize>(
        &self,
        start: usize,
        count: usize,
        cols: [usize; N],
    ) -> Result<[Vec<f64>; N], QyError> {
        let mut out: [Vec<f64>; N] = std::array::from_fn(|_| Vec::with_capacity(count));
        for idx in start..start + count {
            let tokens: Vec<&str> = self.get(idx)?.split_whitespace().collect();
            for (slot, &col) in out.iter_mut().zip(&cols) {
                let token = tokens
                    .get(col)
                    .ok_or_else(|| self.err(idx, format!("missing column {}", col + 1)))?;
                let value = token
                    .parse::<f64>()
                    .map_err(|e| self.err(idx, format!("invalid number '{token}': {e}")))?;
                slot.push(value);
            }
        }
        Ok(out)
    }

    fn source(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Detect the record kind of `path` from its first line.
pub fn record_kind(path: &Path) -> Result<RecordKind, QyError> {
    let lines = Lines::read(path)?;
    RecordKind::detect(path, lines.get(0)?)
}

/// Parse a range line such as `D1 320:300-700`.
///
/// The first character gives the PMT mode, the second token holds
/// `EX:EM` where each side is a single wavelength or `START-END`.
pub fn parse_range_line(line: &str) -> Result<RangeLine, String> {
    let pmt_mode = match line.chars().next() {
        Some('D') => PmtMode::Digital,
        Some('A') => PmtMode::Analogue,
        _ => PmtMode::Unknown,
    };
    let spec = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| "range line has no EX:EM field".to_string())?;
    let (ex, em) = spec
        .split_once(':')
        .ok_or_else(|| format!("range field '{spec}' is not EX:EM"))?;
    let parse_side = |side: &str| -> Result<Vec<f64>, String> {
        side.split('-')
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|e| format!("invalid wavelength '{v}' in '{spec}': {e}"))
            })
            .collect()
    };
    Ok(RangeLine {
        pmt_mode,
        ex_range: parse_side(ex)?,
        em_range: parse_side(em)?,
    })
}

/// Read a `<Session>` record into a [`Spectrum`].
pub fn read_session(path: &Path) -> Result<Spectrum, QyError> {
    let lines = Lines::read(path)?;
    if RecordKind::detect(path, lines.get(0)?)? != RecordKind::Session {
        return Err(lines.err(0, "expected a <Session> record"));
    }

    let stamp_line = lines.get(1)?;
    let tokens: Vec<&str> = stamp_line.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(lines.err(1, "missing acquisition date and time"));
    }
    let stamp = format!("{} {}", tokens[tokens.len() - 2], tokens[tokens.len() - 1]);
    let acquired = NaiveDateTime::parse_from_str(&stamp, SESSION_TIME_FORMAT)
        .map_err(|e| lines.err(1, format!("invalid acquisition time '{stamp}': {e}")))?;

    let n = lines.first_token_usize(5)?;
    let range = parse_range_line(lines.get(6)?).map_err(|m| lines.err(6, m))?;

    const DATA_START: usize = 8;
    let [wavelengths, raw] = lines.columns(DATA_START, n, [0, 1])?;

    // The diode block follows the spectrum: an `ExCorr` header, one more
    // header line, then the samples.
    let header = (DATA_START + n..lines.lines.len())
        .find(|&i| lines.lines[i].to_ascii_lowercase().contains("excorr"))
        .ok_or_else(|| lines.err(DATA_START + n, "no ExCorr diode block after the spectrum"))?;
    let [_, diode] = lines.columns(header + 2, n, [0, 1])?;

    debug!(
        "session '{}': {n} samples, ex {:?}, em {:?}, {:?}",
        path.display(),
        range.ex_range,
        range.em_range,
        range.pmt_mode
    );

    let spectrum = Spectrum::new(lines.source(), range.ex_range, range.em_range, wavelengths, raw, diode)
        .map_err(|e| match e {
            QyError::Configuration(m) | QyError::DataAlignment(m) => lines.err(DATA_START, m),
            other => other,
        })?;
    Ok(spectrum.with_acquired(Some(acquired)).with_pmt_mode(range.pmt_mode))
}

/// Read a `<Trace>` record.
pub fn read_trace(path: &Path) -> Result<Trace, QyError> {
    let lines = Lines::read(path)?;
    if RecordKind::detect(path, lines.get(0)?)? != RecordKind::Trace {
        return Err(lines.err(0, "expected a <Trace> record"));
    }
    let n = lines.first_token_usize(1)?;
    let range_line = lines.get(2)?;
    let range = parse_range_line(range_line).map_err(|m| lines.err(2, m))?;
    let corrected = range_line.contains("COR");
    let [wavelengths, values] = lines.columns(4, n, [0, 1])?;
    Ok(Trace {
        source: lines.source(),
        range,
        corrected,
        wavelengths,
        values,
    })
}

/// Read a `<Group>` calibration table.
pub fn read_group(path: &Path) -> Result<CorrectionTable, QyError> {
    let lines = Lines::read(path)?;
    if RecordKind::detect(path, lines.get(0)?)? != RecordKind::Group {
        return Err(lines.err(0, "expected a <Group> record"));
    }
    let n = lines.first_token_usize(3)?;
    let [wavelengths, values] = lines.columns(6, n, [0, 1])?;

    let name = lines.source();
    debug!("group '{}': {n} points", path.display());

    CorrectionTable::new(name, wavelengths, values).map_err(|e| match e {
        QyError::Configuration(m) | QyError::DataAlignment(m) => lines.err(6, m),
        other => other,
    })
}

/// Read any spectrum-bearing record (session, or raw trace).
pub fn read_spectrum(path: &Path) -> Result<Spectrum, QyError> {
    match record_kind(path)? {
        RecordKind::Session => read_session(path),
        RecordKind::Trace => read_trace(path)?.into_spectrum(),
        RecordKind::Group => Err(QyError::config(format!(
            "'{}' is a calibration table, not a spectrum.",
            path.display()
        ))),
    }
}
