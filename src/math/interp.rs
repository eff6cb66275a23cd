//! One-dimensional interpolants over tabulated correction curves.
//!
//! All interpolants hold their edge values outside the tabulated domain
//! (flat extrapolation); callers never get a spline's polynomial tail.

use nalgebra::{DMatrix, DVector};

use crate::domain::Interpolation;
use crate::error::QyError;

#[derive(Debug, Clone)]
pub struct Interpolant {
    xs: Vec<f64>,
    ys: Vec<f64>,
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    Linear,
    /// Interpolating B-spline: knot vector, coefficients, degree.
    Spline(BSpline),
}

impl Interpolant {
    /// Build an interpolant over strictly increasing `xs`.
    pub fn new(method: Interpolation, xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, QyError> {
        if xs.len() != ys.len() {
            return Err(QyError::alignment(format!(
                "Interpolation table has {} x values and {} y values.",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(QyError::config(format!(
                "Interpolation needs at least 2 points, got {}.",
                xs.len()
            )));
        }
        if xs.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(QyError::config(
                "Interpolation x values must be strictly increasing.",
            ));
        }

        // Short tables drop to the highest degree they can carry.
        let degree = match method {
            Interpolation::Linear | Interpolation::Slinear => 1,
            Interpolation::Quadratic => 2,
            Interpolation::Cubic => 3,
        }
        .min(xs.len() - 1);
        let kind = if degree == 1 {
            Kind::Linear
        } else {
            Kind::Spline(BSpline::interpolate(&xs, &ys, degree)?)
        };
        Ok(Self { xs, ys, kind })
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluate at `x`, holding the edge value outside the domain.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let (lo_x, hi_x) = self.domain();
        if x <= lo_x {
            return self.ys[0];
        }
        if x >= hi_x {
            return self.ys[n - 1];
        }

        match &self.kind {
            Kind::Linear => {
                // First knot strictly greater than x, so xs[lo] <= x < xs[hi].
                let hi = self.xs.partition_point(|&k| k <= x).clamp(1, n - 1);
                let lo = hi - 1;
                let u = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
                self.ys[lo] + u * (self.ys[hi] - self.ys[lo])
            }
            Kind::Spline(spline) => spline.eval(x),
        }
    }
}

/// Interpolating B-spline of degree 2 or 3.
///
/// Knots follow the usual choices for interpolation on the data sites:
///
/// - degree 2: clamped ends, interior knots at the midpoints between data
///   sites (the first and last midpoint omitted)
/// - degree 3: clamped ends with the not-a-knot condition, i.e. interior knots
///   at `xs[2..n-2]`
///
/// The collocation matrix is banded and totally positive, so it is solved by
/// band elimination without pivoting.
#[derive(Debug, Clone)]
struct BSpline {
    knots: Vec<f64>,
    coeffs: Vec<f64>,
    degree: usize,
}

impl BSpline {
    fn interpolate(xs: &[f64], ys: &[f64], degree: usize) -> Result<Self, QyError> {
        let n = xs.len();
        let (first, last) = (xs[0], xs[n - 1]);

        let mut knots = vec![first; degree + 1];
        match degree {
            2 => knots.extend(
                xs.windows(2)
                    .skip(1)
                    .take(n.saturating_sub(3))
                    .map(|w| 0.5 * (w[0] + w[1])),
            ),
            _ => knots.extend_from_slice(&xs[2..n - 2]),
        }
        knots.extend(std::iter::repeat_n(last, degree + 1));
        debug_assert_eq!(knots.len(), n + degree + 1);

        let mut spline = Self {
            knots,
            coeffs: Vec::new(),
            degree,
        };

        let mut band = Band::new(n, degree);
        for (row, &x) in xs.iter().enumerate() {
            let span = spline.span(x);
            for (i, b) in spline.basis(span, x).into_iter().enumerate() {
                let col = span - degree + i;
                if b != 0.0 {
                    band.set(row, col, b)?;
                }
            }
        }
        spline.coeffs = band.solve(ys)?;
        Ok(spline)
    }

    /// Index `l` with `knots[l] <= x < knots[l + 1]`, clamped to the valid spans.
    fn span(&self, x: f64) -> usize {
        let n = self.knots.len() - self.degree - 1;
        self.knots
            .partition_point(|&t| t <= x)
            .saturating_sub(1)
            .clamp(self.degree, n - 1)
    }

    /// Non-zero basis functions `B[span-degree..=span]` at `x` (Cox-de Boor).
    fn basis(&self, span: usize, x: f64) -> Vec<f64> {
        let p = self.degree;
        let t = &self.knots;
        let mut values = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        values[0] = 1.0;
        for j in 1..=p {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }
        values
    }

    fn eval(&self, x: f64) -> f64 {
        let span = self.span(x);
        self.basis(span, x)
            .iter()
            .zip(&self.coeffs[span - self.degree..=span])
            .map(|(b, c)| b * c)
            .sum()
    }
}

/// Square matrix with `width` sub- and super-diagonals, stored row by row as
/// `n × (2·width + 1)`.
struct Band {
    width: usize,
    data: DMatrix<f64>,
}

impl Band {
    fn new(n: usize, width: usize) -> Self {
        Self {
            width,
            data: DMatrix::zeros(n, 2 * width + 1),
        }
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        if row.abs_diff(col) > self.width {
            0.0
        } else {
            self.data[(row, col + self.width - row)]
        }
    }

    fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), QyError> {
        if row.abs_diff(col) > self.width {
            return Err(QyError::fit(format!(
                "Spline collocation entry ({row}, {col}) lies outside the band."
            )));
        }
        self.data[(row, col + self.width - row)] = value;
        Ok(())
    }

    /// Gaussian elimination without pivoting, then back substitution.
    fn solve(mut self, rhs: &[f64]) -> Result<Vec<f64>, QyError> {
        let n = self.data.nrows();
        let w = self.width;
        let mut rhs = DVector::from_column_slice(rhs);
        for p in 0..n {
            let pivot = self.get(p, p);
            if !(pivot.abs() >= 1e-300) {
                return Err(QyError::fit("Singular spline collocation matrix."));
            }
            for r in p + 1..(p + w + 1).min(n) {
                let factor = self.get(r, p) / pivot;
                if factor == 0.0 {
                    continue;
                }
                for c in p..(p + w + 1).min(n) {
                    let delta = factor * self.get(p, c);
                    self.data[(r, c + w - r)] -= delta;
                }
                let delta = factor * rhs[p];
                rhs[r] -= delta;
            }
        }
        for p in (0..n).rev() {
            let tail: f64 = (p + 1..(p + w + 1).min(n)).map(|c| self.get(p, c) * rhs[c]).sum();
            rhs[p] = (rhs[p] - tail) / self.get(p, p);
        }
        Ok(rhs.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (0..=10).map(|i| 250.0 + 2.0 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.5 + 0.01 * (x - 250.0)).collect();
        (xs, ys)
    }

    #[test]
    fn every_method_reproduces_a_line() {
        let (xs, ys) = table();
        for method in Interpolation::ALL {
            let f = Interpolant::new(method, xs.clone(), ys.clone()).unwrap();
            for &x in &[250.0, 251.3, 257.0, 263.9, 270.0] {
                let expected = 0.5 + 0.01 * (x - 250.0);
                assert!(
                    (f.eval(x) - expected).abs() < 1e-12,
                    "{method:?} at {x}: {} vs {expected}",
                    f.eval(x)
                );
            }
        }
    }

    #[test]
    fn every_method_passes_through_knots() {
        let xs: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let ys = vec![1.0, 3.0, 2.0, 5.0, 4.0, 4.5, 0.5, 2.0];
        for method in Interpolation::ALL {
            let f = Interpolant::new(method, xs.clone(), ys.clone()).unwrap();
            for (x, y) in xs.iter().zip(&ys) {
                assert!((f.eval(*x) - y).abs() < 1e-12, "{method:?} misses knot {x}");
            }
        }
    }

    #[test]
    fn flat_extrapolation_outside_domain() {
        let (xs, ys) = table();
        for method in Interpolation::ALL {
            let f = Interpolant::new(method, xs.clone(), ys.clone()).unwrap();
            assert_eq!(f.eval(100.0), ys[0]);
            assert_eq!(f.eval(900.0), ys[ys.len() - 1]);
        }
    }

    #[test]
    fn splines_reproduce_their_own_degree() {
        let xs: Vec<f64> = (0..=20).map(|i| i as f64).collect();
        let square: Vec<f64> = xs.iter().map(|x| x * x).collect();
        let q = Interpolant::new(Interpolation::Quadratic, xs.clone(), square).unwrap();
        let cube: Vec<f64> = xs.iter().map(|x| x * x * x - 4.0 * x).collect();
        // Not-a-knot ends: exact for a cubic right up to the table edges.
        let c = Interpolant::new(Interpolation::Cubic, xs, cube).unwrap();
        for &x in &[0.25, 0.5, 10.5, 19.75] {
            assert!((q.eval(x) - x * x).abs() < 1e-9, "quadratic at {x}");
            assert!((c.eval(x) - (x * x * x - 4.0 * x)).abs() < 1e-8, "cubic at {x}");
        }
    }

    #[test]
    fn ringing_after_a_step_dies_out() {
        let xs: Vec<f64> = (0..=60).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| if x < 10.0 { 0.0 } else { 1.0 }).collect();
        for method in [Interpolation::Quadratic, Interpolation::Cubic] {
            let f = Interpolant::new(method, xs.clone(), ys.clone()).unwrap();
            let near = (f.eval(10.5) - 1.0).abs();
            let mid = (f.eval(20.5) - 1.0).abs();
            let far = (f.eval(40.5) - 1.0).abs();
            assert!(near > 1e-3, "{method:?} should ring next to the step");
            assert!(mid < 0.1 * near, "{method:?}: {mid} vs {near}");
            assert!(far < 1e-6, "{method:?} still off by {far} at 40.5");
            assert!((f.eval(58.5) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn short_tables_lower_the_degree() {
        let f = Interpolant::new(Interpolation::Cubic, vec![0.0, 1.0], vec![0.0, 2.0]).unwrap();
        assert!((f.eval(0.25) - 0.5).abs() < 1e-12);
        let g = Interpolant::new(Interpolation::Cubic, vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 4.0]).unwrap();
        assert!((g.eval(1.5) - 2.25).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(Interpolant::new(Interpolation::Linear, vec![1.0], vec![1.0]).is_err());
        assert!(Interpolant::new(Interpolation::Cubic, vec![1.0, 1.0], vec![1.0, 2.0]).is_err());
        assert!(Interpolant::new(Interpolation::Cubic, vec![1.0, 2.0], vec![1.0]).is_err());
    }
}
