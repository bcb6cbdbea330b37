//! Bicubic interpolation over a periodic two-dimensional grid.
//!
//! Used to turn the discretely tabulated `-ln(p)` values of a
//! backbone-dependent rotamer table into an energy surface that is
//! continuous and continuously differentiable across bin boundaries, with
//! an analytic gradient for torsion-space minimization.

/// Evaluates a cubic cardinal segment through `p1..p2` with tangents from
/// the neighboring points, at parameter `t` in [0, 1]. Returns the value
/// and the derivative with respect to `t`.
fn cubic_segment(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> (f64, f64) {
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;
    let value = ((a * t + b) * t + c) * t + d;
    let deriv = (3.0 * a * t + 2.0 * b) * t + c;
    (value, deriv)
}

/// Interpolated value and partial derivatives in grid-index units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicubicSample {
    pub value: f64,
    pub d_dx: f64,
    pub d_dy: f64,
}

/// Bicubic interpolation of a periodic `nx` x `ny` grid at the continuous
/// grid coordinate (`x`, `y`), where integer coordinates hit grid points
/// exactly and both axes wrap.
///
/// `get(i, j)` supplies the tabulated value at grid point (i, j) with
/// `i < nx`, `j < ny`. Derivatives are per grid-index unit; divide by the
/// angular bin width to obtain derivatives per degree.
pub fn bicubic_periodic<F>(get: F, nx: usize, ny: usize, x: f64, y: f64) -> BicubicSample
where
    F: Fn(usize, usize) -> f64,
{
    debug_assert!(nx >= 1 && ny >= 1);

    let ix = x.floor();
    let iy = y.floor();
    let tx = x - ix;
    let ty = y - iy;

    let wrap = |i: i64, n: usize| -> usize { (i.rem_euclid(n as i64)) as usize };
    let ix = ix as i64;
    let iy = iy as i64;

    // Interpolate along y for the four x-neighbors, tracking both the value
    // and the y-derivative of each column.
    let mut col_val = [0.0f64; 4];
    let mut col_dy = [0.0f64; 4];
    for (k, col) in (-1i64..=2).enumerate() {
        let xi = wrap(ix + col, nx);
        let p: Vec<f64> = (-1i64..=2).map(|r| get(xi, wrap(iy + r, ny))).collect();
        let (v, dv) = cubic_segment(p[0], p[1], p[2], p[3], ty);
        col_val[k] = v;
        col_dy[k] = dv;
    }

    let (value, d_dx) = cubic_segment(col_val[0], col_val[1], col_val[2], col_val[3], tx);
    let (d_dy, _) = cubic_segment(col_dy[0], col_dy[1], col_dy[2], col_dy[3], tx);

    BicubicSample { value, d_dx, d_dy }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_grid_values_at_grid_points() {
        let get = |i: usize, j: usize| (i * 7 + j) as f64 * 0.25;
        for i in 0..5 {
            for j in 0..4 {
                let s = bicubic_periodic(get, 5, 4, i as f64, j as f64);
                assert!((s.value - get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn constant_field_has_zero_gradient_everywhere() {
        let get = |_: usize, _: usize| 3.75;
        for &(x, y) in &[(0.2, 0.9), (3.5, 1.1), (4.99, 3.01)] {
            let s = bicubic_periodic(get, 5, 4, x, y);
            assert!((s.value - 3.75).abs() < 1e-12);
            assert!(s.d_dx.abs() < 1e-12);
            assert!(s.d_dy.abs() < 1e-12);
        }
    }

    #[test]
    fn value_is_continuous_across_bin_boundaries() {
        let get = |i: usize, j: usize| ((i as f64 * 1.3).sin() + (j as f64 * 0.7).cos()) * 2.0;
        let eps = 1e-7;
        for boundary in 1..4 {
            let b = boundary as f64;
            let below = bicubic_periodic(get, 6, 6, b - eps, 2.5);
            let above = bicubic_periodic(get, 6, 6, b + eps, 2.5);
            assert!((below.value - above.value).abs() < 1e-5);
            assert!((below.d_dx - above.d_dx).abs() < 1e-4);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let get = |i: usize, j: usize| ((i as f64 * 0.9).sin() * (j as f64 * 1.1).cos()) + 0.5;
        let (x, y) = (2.3, 1.7);
        let h = 1e-6;
        let s = bicubic_periodic(get, 8, 8, x, y);
        let fd_x = (bicubic_periodic(get, 8, 8, x + h, y).value
            - bicubic_periodic(get, 8, 8, x - h, y).value)
            / (2.0 * h);
        let fd_y = (bicubic_periodic(get, 8, 8, x, y + h).value
            - bicubic_periodic(get, 8, 8, x, y - h).value)
            / (2.0 * h);
        assert!((s.d_dx - fd_x).abs() < 1e-5);
        assert!((s.d_dy - fd_y).abs() < 1e-5);
    }

    #[test]
    fn wraps_periodically_at_the_grid_edge() {
        let get = |i: usize, j: usize| (i as f64) * 0.1 + (j as f64) * 0.01;
        let at_start = bicubic_periodic(get, 6, 6, 0.0, 0.0);
        let wrapped = bicubic_periodic(get, 6, 6, 6.0, 6.0);
        assert!((at_start.value - wrapped.value).abs() < 1e-12);
    }
}
