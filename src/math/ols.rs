//! Ordinary least squares for straight-line fits.
//!
//! Baselines are fitted as `y = intercept + slope * x`, and we need both the
//! point estimates and their standard errors:
//!
//! ```text
//! σ² = SSE / (n - 2)
//! Cov(β) = σ² (XᵀX)⁻¹
//! ```
//!
//! The coefficient solve goes through SVD (robust for tall design matrices);
//! the covariance uses the explicit 2×2 inverse of `XᵀX`.

use nalgebra::{DMatrix, DVector};

use crate::error::QyError;

/// Straight-line fit with parameter standard errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    pub intercept_se: f64,
    pub slope_se: f64,
    pub n: usize,
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = intercept + slope * x` by OLS.
///
/// With exactly two points the line is exact and both standard errors are 0.
pub fn fit_line(x: &[f64], y: &[f64]) -> Result<LineFit, QyError> {
    let n = x.len();
    if n != y.len() {
        return Err(QyError::alignment(format!(
            "Line fit got {n} x values and {} y values.",
            y.len()
        )));
    }
    if n < 2 {
        return Err(QyError::fit(format!(
            "Line fit needs at least 2 points, got {n}."
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(QyError::fit("Line fit input contains non-finite values."));
    }

    // Centre x so the normal matrix stays well conditioned for wavelengths ~ 10².
    let x_mean = x.iter().sum::<f64>() / n as f64;
    let sxx: f64 = x.iter().map(|v| (v - x_mean).powi(2)).sum();
    if sxx <= f64::EPSILON * x_mean.abs().max(1.0) {
        return Err(QyError::fit(
            "Line fit is underdetermined: all x values are identical.",
        ));
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] - x_mean });
    let obs = DVector::from_column_slice(y);
    let beta = solve_least_squares(&design, &obs)
        .ok_or_else(|| QyError::fit("Line fit could not be solved."))?;

    let centred_intercept = beta[0];
    let slope = beta[1];
    let intercept = centred_intercept - slope * x_mean;

    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - (intercept + slope * xi)).powi(2))
        .sum();

    let (intercept_se, slope_se) = if n > 2 {
        let sigma2 = sse / (n as f64 - 2.0);
        let xtx = design.transpose() * &design;
        let cov = xtx
            .try_inverse()
            .ok_or_else(|| QyError::fit("Line fit normal matrix is singular."))?
            * sigma2;
        // Var(a) for the uncentred intercept a = a_c - b * x̄.
        let var_slope = cov[(1, 1)];
        let var_intercept =
            cov[(0, 0)] + x_mean * x_mean * var_slope - 2.0 * x_mean * cov[(0, 1)];
        (var_intercept.max(0.0).sqrt(), var_slope.max(0.0).sqrt())
    } else {
        (0.0, 0.0)
    };

    Ok(LineFit {
        intercept,
        slope,
        intercept_se,
        slope_se,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn fit_line_recovers_exact_line() {
        let x: Vec<f64> = (300..=340).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 12.5 - 0.02 * v).collect();
        let fit = fit_line(&x, &y).unwrap();
        assert!((fit.intercept - 12.5).abs() < 1e-9);
        assert!((fit.slope + 0.02).abs() < 1e-12);
        assert!(fit.intercept_se < 1e-9);
        assert!(fit.slope_se < 1e-9);
    }

    #[test]
    fn fit_line_standard_errors_match_closed_form() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 2.0, 4.0];
        let fit = fit_line(&x, &y).unwrap();
        // slope = Sxy / Sxx = 4.5 / 5 = 0.9, intercept = 2.25 - 0.9 * 1.5 = 0.9
        assert!((fit.slope - 0.9).abs() < 1e-12);
        assert!((fit.intercept - 0.9).abs() < 1e-12);
        // SSE = 0.7, σ² = 0.35
        let se_slope = (0.35_f64 / 5.0).sqrt();
        let se_intercept = (0.35_f64 * (1.0 / 4.0 + 1.5 * 1.5 / 5.0)).sqrt();
        assert!((fit.slope_se - se_slope).abs() < 1e-12);
        assert!((fit.intercept_se - se_intercept).abs() < 1e-12);
    }

    #[test]
    fn fit_line_rejects_degenerate_inputs() {
        assert!(fit_line(&[1.0], &[1.0]).unwrap_err().is_fit());
        assert!(fit_line(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err().is_fit());
        let two = fit_line(&[0.0, 1.0], &[1.0, 3.0]).unwrap();
        assert_eq!(two.slope_se, 0.0);
    }
}
