//! Composite Simpson quadrature on a uniform grid.
//!
//! With an odd number of samples this is the textbook 1-4-2-4-…-4-1 rule.
//! With an even number the rule cannot cover every interval, so we average the
//! two variants that close one end interval with a trapezoid instead.

/// Integrate uniformly spaced samples `y` with spacing `dx`.
pub fn simpson(y: &[f64], dx: f64) -> f64 {
    match y.len() {
        0 | 1 => 0.0,
        2 => trapezoid(y, dx),
        n if n % 2 == 1 => simpson_odd(y, dx),
        n => {
            let head = simpson_odd(&y[..n - 1], dx) + trapezoid(&y[n - 2..], dx);
            let tail = trapezoid(&y[..2], dx) + simpson_odd(&y[1..], dx);
            0.5 * (head + tail)
        }
    }
}

/// Composite trapezoid rule.
pub fn trapezoid(y: &[f64], dx: f64) -> f64 {
    if y.len() < 2 {
        return 0.0;
    }
    let inner: f64 = y[1..y.len() - 1].iter().sum();
    dx * (0.5 * (y[0] + y[y.len() - 1]) + inner)
}

fn simpson_odd(y: &[f64], dx: f64) -> f64 {
    debug_assert!(y.len() % 2 == 1 && y.len() >= 3);
    let n = y.len();
    let mut acc = y[0] + y[n - 1];
    for (i, v) in y.iter().enumerate().take(n - 1).skip(1) {
        acc += if i % 2 == 1 { 4.0 * v } else { 2.0 * v };
    }
    acc * dx / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(f: impl Fn(f64) -> f64, a: f64, dx: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| f(a + dx * i as f64)).collect()
    }

    #[test]
    fn exact_for_cubics_with_odd_count() {
        let y = sample(|x| x * x * x - 2.0 * x + 1.0, 0.0, 0.5, 9);
        // ∫0^4 (x³ - 2x + 1) dx = 64 - 16 + 4 = 52
        assert!((simpson(&y, 0.5) - 52.0).abs() < 1e-12);
    }

    #[test]
    fn even_count_is_exact_for_lines_and_close_for_curves() {
        let y = sample(|x| 3.0 * x + 2.0, 0.0, 1.0, 10);
        // ∫0^9 (3x + 2) dx = 121.5 + 18
        assert!((simpson(&y, 1.0) - 139.5).abs() < 1e-12);

        let y = sample(|x| x.sin(), 0.0, 0.01, 314);
        let exact = 1.0 - (3.13_f64).cos();
        assert!((simpson(&y, 0.01) - exact).abs() < 1e-6);
    }

    #[test]
    fn degenerate_lengths() {
        assert_eq!(simpson(&[], 1.0), 0.0);
        assert_eq!(simpson(&[5.0], 1.0), 0.0);
        assert!((simpson(&[1.0, 3.0], 2.0) - 4.0).abs() < 1e-12);
    }
}
