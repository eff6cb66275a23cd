//! Result exports (CSV/JSON).
//!
//! Everything is written with plain headers so the files load directly into
//! spreadsheets or pandas.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::app::pipeline::RunOutput;
use crate::app::sweep::{ReplicateSummary, SweepRow};
use crate::correct::CorrectedSpectrum;
use crate::error::QyError;

fn create(path: &Path) -> Result<BufWriter<File>, QyError> {
    let file = File::create(path)
        .map_err(|e| QyError::Output(format!("cannot create '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

fn flag(on: bool) -> &'static str {
    if on { "true" } else { "false" }
}

/// One row per blank/fluorophore pair.
pub fn write_run_csv(path: &Path, run: &RunOutput) -> Result<(), QyError> {
    let mut w = csv::Writer::from_writer(create(path)?);
    w.write_record([
        "blank",
        "fluor",
        "excitation_nm",
        "absorbed",
        "emitted",
        "tail_area",
        "qy",
        "tail_ratio",
        "accepted",
        "corrected_qy",
        "ex_offset_nm",
        "em_offset_nm",
        "offset_source",
    ])?;
    for (pair, pooled) in run.pairs.iter().zip(&run.pooled.replicates) {
        let m = &pair.measurement;
        w.write_record([
            pair.blank.clone(),
            pair.fluor.clone(),
            pair.excitation.to_string(),
            format!("{:.10e}", m.absorbed),
            format!("{:.10e}", m.emitted),
            format!("{:.10e}", m.tail_area),
            format!("{:.8}", m.qy),
            format!("{:.8}", m.tail_ratio),
            flag(pooled.accepted).to_string(),
            format!("{:.8}", pooled.corrected_qy),
            format!("{:.4}", pair.fluor_offsets.ex),
            format!("{:.4}", pair.fluor_offsets.em),
            format!("{:?}", pair.fluor_offsets.source).to_lowercase(),
        ])?;
    }
    w.flush()
        .map_err(|e| QyError::Output(format!("cannot write '{}': {e}", path.display())))?;
    Ok(())
}

/// The full run (configuration, windows, offsets, pooling) as pretty JSON.
pub fn write_run_json(path: &Path, run: &RunOutput) -> Result<(), QyError> {
    serde_json::to_writer_pretty(create(path)?, run)?;
    Ok(())
}

/// One row per sweep variant: option columns, then corrected QY and tail ratio
/// per replicate.
pub fn write_sweep_csv(path: &Path, rows: &[SweepRow], replicates: &[String]) -> Result<(), QyError> {
    let mut w = csv::Writer::from_writer(create(path)?);

    let mut header: Vec<String> = [
        "shift_lut",
        "intercept_se",
        "slope_se",
        "ex_interpolation",
        "em_interpolation",
        "ex_split",
        "em_split",
        "const_diode",
        "tail_start",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(replicates.iter().map(|r| format!("qy_{r}")));
    header.extend(replicates.iter().map(|r| format!("ratio_{r}")));
    header.push("error".to_string());
    w.write_record(&header)?;

    for row in rows {
        let c = &row.variant.config;
        let mut record = vec![
            flag(c.shift.enabled).to_string(),
            c.baseline_se.intercept.as_str().to_string(),
            c.baseline_se.slope.as_str().to_string(),
            c.ex_interpolation.as_str().to_string(),
            c.em_interpolation.as_str().to_string(),
            c.ex_split.as_str().to_string(),
            c.em_split.as_str().to_string(),
            flag(c.const_diode).to_string(),
            row.variant.tail_start.to_string(),
        ];
        match &row.corrected_qy {
            Ok(qys) => {
                record.extend(qys.iter().map(|q| format!("{q:.8}")));
                record.extend(row.tail_ratios.iter().map(|r| format!("{r:.8}")));
                record.push(String::new());
            }
            Err(msg) => {
                record.extend(std::iter::repeat_n(String::new(), 2 * replicates.len()));
                record.push(msg.clone());
            }
        }
        w.write_record(&record)?;
    }
    w.flush()
        .map_err(|e| QyError::Output(format!("cannot write '{}': {e}", path.display())))?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, summary: &[ReplicateSummary]) -> Result<(), QyError> {
    let mut w = csv::Writer::from_writer(create(path)?);
    for s in summary {
        w.serialize(s)?;
    }
    w.flush()
        .map_err(|e| QyError::Output(format!("cannot write '{}': {e}", path.display())))?;
    Ok(())
}

/// Per-sample view of a corrected spectrum.
pub fn write_corrected_csv(path: &Path, spectrum: &CorrectedSpectrum<'_>) -> Result<(), QyError> {
    let mut w = csv::Writer::from_writer(create(path)?);
    w.write_record(["wavelength_nm", "raw", "diode", "baseline", "factor", "corrected"])?;
    let s = spectrum.spectrum();
    for i in 0..s.len() {
        w.write_record([
            s.wavelengths()[i].to_string(),
            s.raw()[i].to_string(),
            s.diode()[i].to_string(),
            format!("{:.10e}", spectrum.baseline()[i]),
            format!("{:.10e}", spectrum.factors().total[i]),
            format!("{:.10e}", spectrum.corrected()[i]),
        ])?;
    }
    w.flush()
        .map_err(|e| QyError::Output(format!("cannot write '{}': {e}", path.display())))?;
    Ok(())
}
