//! Gaussian-plus-constant peak fitting (Levenberg–Marquardt).
//!
//! Model:
//!
//! ```text
//! f(x) = A · exp(-(x - μ)² / (2σ²)) + c
//! ```
//!
//! The parameter count is fixed at four, so the normal equations are solved
//! with static 4×4 nalgebra matrices.

use nalgebra::{Matrix4, Vector4};

use crate::error::QyError;

const MAX_ITERATIONS: usize = 200;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;
const REL_TOL: f64 = 1e-10;

/// Fitted Gaussian peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
    pub offset: f64,
    pub sse: f64,
    pub iterations: usize,
}

impl GaussianFit {
    pub fn eval(&self, x: f64) -> f64 {
        gaussian(x, &self.params())
    }

    fn params(&self) -> Vector4<f64> {
        Vector4::new(self.amplitude, self.center, self.sigma, self.offset)
    }
}

fn gaussian(x: f64, p: &Vector4<f64>) -> f64 {
    let z = (x - p[1]) / p[2];
    p[0] * (-0.5 * z * z).exp() + p[3]
}

fn sse(x: &[f64], y: &[f64], p: &Vector4<f64>) -> f64 {
    x.iter().zip(y).map(|(&xi, &yi)| (yi - gaussian(xi, p)).powi(2)).sum()
}

/// Initial guess from the data: peak height, its position, half-maximum width.
fn initial_guess(x: &[f64], y: &[f64]) -> Vector4<f64> {
    let (imax, &ymax) = y
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((0, &0.0));
    let ymin = y.iter().copied().fold(f64::INFINITY, f64::min);
    let amplitude = ymax - ymin;

    let half = ymin + 0.5 * amplitude;
    let above = y.iter().filter(|&&v| v >= half).count().max(1);
    let step = (x[x.len() - 1] - x[0]) / (x.len() as f64 - 1.0);
    let sigma = (above as f64 * step / 2.355).max(step);

    Vector4::new(amplitude, x[imax], sigma, ymin)
}

/// Fit a Gaussian plus constant to `(x, y)`.
///
/// Fails with [`QyError::Fit`] when the data are too few, the iteration does
/// not converge, or the result is not a peak inside the sampled range.
pub fn fit_gaussian(x: &[f64], y: &[f64]) -> Result<GaussianFit, QyError> {
    if x.len() != y.len() {
        return Err(QyError::alignment("Gaussian fit x/y length mismatch."));
    }
    if x.len() < 5 {
        return Err(QyError::fit(format!(
            "Gaussian fit needs at least 5 points, got {}.",
            x.len()
        )));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(QyError::fit("Gaussian fit input contains non-finite values."));
    }

    let mut p = initial_guess(x, y);
    if !(p[0] > 0.0) {
        return Err(QyError::fit("Gaussian fit: no peak above the background."));
    }

    let mut current = sse(x, y, &p);
    let mut lambda = LAMBDA_INIT;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let mut jtj = Matrix4::<f64>::zeros();
        let mut jtr = Vector4::<f64>::zeros();
        for (&xi, &yi) in x.iter().zip(y) {
            let d = xi - p[1];
            let e = (-0.5 * d * d / (p[2] * p[2])).exp();
            let row = Vector4::new(
                e,
                p[0] * e * d / (p[2] * p[2]),
                p[0] * e * d * d / (p[2] * p[2] * p[2]),
                1.0,
            );
            let r = yi - (p[0] * e + p[3]);
            jtj += row * row.transpose();
            jtr += row * r;
        }

        // Inner loop: raise damping until a step lowers the SSE.
        let mut accepted = false;
        while lambda <= LAMBDA_MAX {
            let mut a = jtj;
            for k in 0..4 {
                a[(k, k)] += lambda * jtj[(k, k)].max(1e-12);
            }
            let Some(delta) = a.lu().solve(&jtr) else {
                lambda *= 10.0;
                continue;
            };
            let trial = p + delta;
            let trial_sse = sse(x, y, &trial);
            if trial_sse.is_finite() && trial_sse < current && trial[2] != 0.0 {
                let improvement = (current - trial_sse) / current.max(f64::MIN_POSITIVE);
                let step_small = (0..4).all(|k| delta[k].abs() <= REL_TOL * (trial[k].abs() + REL_TOL));
                p = trial;
                current = trial_sse;
                lambda = (lambda / 10.0).max(1e-12);
                accepted = true;
                converged = improvement < REL_TOL || step_small || current < 1e-24;
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            // No damped step improves the fit: we are at a (numerical) minimum.
            converged = true;
        }
        if converged {
            break;
        }
    }

    if !converged {
        return Err(QyError::fit(format!(
            "Gaussian fit did not converge in {MAX_ITERATIONS} iterations."
        )));
    }

    let sigma = p[2].abs();
    let (lo, hi) = (x[0], x[x.len() - 1]);
    if !(p.iter().all(|v| v.is_finite()) && p[0] > 0.0 && sigma > 0.0) {
        return Err(QyError::fit("Gaussian fit converged to a non-peak solution."));
    }
    if p[1] < lo || p[1] > hi {
        return Err(QyError::fit(format!(
            "Gaussian fit centre {:.3} lies outside the fitted range [{lo}, {hi}].",
            p[1]
        )));
    }

    Ok(GaussianFit {
        amplitude: p[0],
        center: p[1],
        sigma,
        offset: p[3],
        sse: current,
        iterations,
    })
}
