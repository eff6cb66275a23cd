//! Formatted terminal output.
//!
//! Formatting lives here so the pipeline code only returns data and output
//! changes stay local.

use crate::app::pipeline::RunOutput;
use crate::app::sweep::{ReplicateSummary, SweepRow};
use crate::correct::CorrectedSpectrum;
use crate::domain::{CorrectionConfig, SweepAxis};

/// Per-pair table, pooled tail correction and the configuration used.
pub fn format_run_summary(name: Option<&str>, run: &RunOutput) -> String {
    let mut out = String::new();

    out.push_str("=== qy - fluorescence quantum yield ===\n");
    if let Some(name) = name {
        out.push_str(&format!("Experiment: {name}\n"));
    }
    out.push_str(&format!("Config: {}\n", describe_config(&run.config)));
    if let Some(first) = run.pairs.first() {
        let w = &first.windows;
        out.push_str(&format!(
            "Windows: ex={} em={} tail={}\n",
            w.excitation, w.emission, w.tail
        ));
    }
    out.push('\n');

    out.push_str(
        format!(
            "{:<20} {:<20} {:>7} {:>10} {:>10} {:>4} {:>10} {:>12}\n",
            "blank", "fluor", "ex_nm", "qy", "tail", "ok", "qy_corr", "offsets"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<20} {:-<20} {:->7} {:->10} {:->10} {:->4} {:->10} {:->12}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for (pair, pooled) in run.pairs.iter().zip(&run.pooled.replicates) {
        let offsets = format!("{:+.2}/{:+.2}", pair.fluor_offsets.ex, pair.fluor_offsets.em);
        out.push_str(
            format!(
                "{:<20} {:<20} {:>7.1} {:>10.5} {:>10.5} {:>4} {:>10.5} {:>12}\n",
                truncate(&pair.blank, 20),
                truncate(&pair.fluor, 20),
                pair.excitation,
                pair.measurement.qy,
                pair.measurement.tail_ratio,
                if pooled.accepted { "yes" } else { "no" },
                pooled.corrected_qy,
                offsets,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str(&format!(
        "\nTail ratios: {} of {} accepted (tolerance {}), mean {:.5}\n",
        run.pooled.accepted_count(),
        run.pooled.replicates.len(),
        run.pooled.tolerance,
        run.pooled.mean_accepted_ratio
    ));
    out
}

/// Variant counts plus the per-replicate spread across the sweep.
pub fn format_sweep_summary(axis: SweepAxis, rows: &[SweepRow], summary: &[ReplicateSummary]) -> String {
    let failed = rows.iter().filter(|r| r.corrected_qy.is_err()).count();
    let mut out = String::new();
    out.push_str(&format!(
        "Sweep '{}': {} variant(s), {} failed\n\n",
        axis.as_str(),
        rows.len(),
        failed
    ));

    out.push_str(
        format!(
            "{:<24} {:>5} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "replicate", "n", "min", "max", "mean", "std", "half_rng"
        )
        .trim_end(),
    );
    out.push('\n');
    for s in summary {
        out.push_str(
            format!(
                "{:<24} {:>5} {:>10.5} {:>10.5} {:>10.5} {:>10.5} {:>10.5}\n",
                truncate(&s.replicate, 24),
                s.n,
                s.min,
                s.max,
                s.mean,
                s.std,
                s.half_range
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Baseline and offsets of one corrected record.
pub fn format_correction_summary(spectrum: &CorrectedSpectrum<'_>) -> String {
    let s = spectrum.spectrum();
    let fit = spectrum.baseline_fit();
    let offsets = spectrum.offsets();
    let domain = s.domain();

    let mut out = String::new();
    out.push_str(&format!("Record: {} ({:?} scan, {:?} PMT)\n", s.source, s.run_type, s.pmt_mode));
    if let Some(t) = s.acquired {
        out.push_str(&format!("Acquired: {t}\n"));
    }
    out.push_str(&format!(
        "Samples: n={} | [{:.1}, {:.1}] nm, step {:.3} nm\n",
        s.len(),
        domain.start,
        domain.end,
        s.step()
    ));
    out.push_str(&format!(
        "Baseline: {:.6e} (±{:.2e}) + {:.6e} (±{:.2e})·λ over {} point(s)\n",
        fit.intercept, fit.intercept_se, fit.slope, fit.slope_se, fit.n_points
    ));
    out.push_str(&format!(
        "Offsets: ex {:+.3} nm, em {:+.3} nm ({:?})\n",
        offsets.ex, offsets.em, offsets.source
    ));
    let total: f64 = spectrum.corrected().iter().sum::<f64>() * s.step();
    out.push_str(&format!("Corrected sum·step: {total:.6e}\n"));
    out
}

fn describe_config(c: &CorrectionConfig) -> String {
    let shift = match (c.shift.enabled, c.shift.estimate) {
        (false, _) => "off".to_string(),
        (true, true) => "estimate".to_string(),
        (true, false) => format!("{}/{}", c.shift.default_ex, c.shift.default_em),
    };
    format!(
        "interp={}/{} split={}/{} shift={} se={}/{} const_diode={}",
        c.ex_interpolation.as_str(),
        c.em_interpolation.as_str(),
        c.ex_split.as_str(),
        c.em_split.as_str(),
        shift,
        c.baseline_se.intercept.as_str(),
        c.baseline_se.slope.as_str(),
        c.const_diode
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
