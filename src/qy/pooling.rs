//! Pooling of tail-correction ratios across replicate measurements.
//!
//! Replicates whose tail ratio lies within `tolerance` of the first replicate's
//! ratio are "accepted". Every replicate's QY is then rescaled by its own ratio
//! over the mean accepted ratio; rejected replicates still get a corrected QY
//! but do not contribute to the mean.

use log::warn;
use serde::Serialize;

use crate::error::QyError;
use crate::qy::integrate::QyMeasurement;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PooledReplicate {
    pub qy: f64,
    pub tail_ratio: f64,
    pub accepted: bool,
    pub corrected_qy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PooledQy {
    pub replicates: Vec<PooledReplicate>,
    pub tolerance: f64,
    pub mean_accepted_ratio: f64,
}

impl PooledQy {
    pub fn corrected(&self) -> Vec<f64> {
        self.replicates.iter().map(|r| r.corrected_qy).collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.replicates.iter().filter(|r| r.accepted).count()
    }
}

/// Pool the tail ratios of `measurements` (in replicate order).
pub fn pool_tail_ratios(measurements: &[QyMeasurement], tolerance: f64) -> Result<PooledQy, QyError> {
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(QyError::config(format!(
            "Ratio tolerance must be > 0, got {tolerance}."
        )));
    }
    let Some(first) = measurements.first() else {
        return Err(QyError::fit("No replicate measurements to pool."));
    };

    let reference = first.tail_ratio;
    let accepted: Vec<bool> = measurements
        .iter()
        .map(|m| (m.tail_ratio - reference).abs() < tolerance)
        .collect();
    let kept: Vec<f64> = measurements
        .iter()
        .zip(&accepted)
        .filter_map(|(m, &ok)| ok.then_some(m.tail_ratio))
        .collect();

    if kept.is_empty() {
        return Err(QyError::fit(format!(
            "No tail ratio lies within {tolerance} of the first replicate ({reference})."
        )));
    }
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    if mean == 0.0 {
        return Err(QyError::div_zero("Mean accepted tail ratio is zero."));
    }

    let replicates = measurements
        .iter()
        .zip(accepted)
        .enumerate()
        .map(|(i, (m, accepted))| {
            if !accepted {
                warn!(
                    "replicate {i}: tail ratio {:.4} is outside ±{tolerance} of {:.4}; excluded from the mean",
                    m.tail_ratio, reference
                );
            }
            PooledReplicate {
                qy: m.qy,
                tail_ratio: m.tail_ratio,
                accepted,
                corrected_qy: m.qy * m.tail_ratio / mean,
            }
        })
        .collect();

    Ok(PooledQy {
        replicates,
        tolerance,
        mean_accepted_ratio: mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(qy: f64, tail_ratio: f64) -> QyMeasurement {
        QyMeasurement {
            absorbed: 1.0,
            emitted: qy,
            tail_area: qy * tail_ratio,
            qy,
            tail_ratio,
        }
    }

    #[test]
    fn outlier_is_excluded_from_mean_only() {
        let input = [m(0.80, 0.50), m(0.82, 0.52), m(0.78, 0.48), m(0.90, 0.75)];
        let pooled = pool_tail_ratios(&input, 0.1).unwrap();

        let flags: Vec<bool> = pooled.replicates.iter().map(|r| r.accepted).collect();
        assert_eq!(flags, vec![true, true, true, false]);
        assert!((pooled.mean_accepted_ratio - 0.5).abs() < 1e-12);

        let corrected = pooled.corrected();
        assert!((corrected[1] - 0.82 * 0.52 / 0.5).abs() < 1e-12);
        assert!((corrected[3] - 0.90 * 0.75 / 0.5).abs() < 1e-12);
        assert_eq!(pooled.accepted_count(), 3);
    }

    #[test]
    fn single_replicate_is_unchanged() {
        let pooled = pool_tail_ratios(&[m(0.7, 0.3)], 0.1).unwrap();
        assert!((pooled.corrected()[0] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn bad_inputs() {
        assert!(pool_tail_ratios(&[], 0.1).unwrap_err().is_fit());
        assert!(matches!(pool_tail_ratios(&[m(0.7, 0.3)], 0.0), Err(QyError::Configuration(_))));
        assert!(pool_tail_ratios(&[m(0.7, f64::NAN)], 0.1).unwrap_err().is_fit());
        assert!(matches!(pool_tail_ratios(&[m(0.7, 0.0)], 0.1), Err(QyError::DivideByZero(_))));
    }
}
