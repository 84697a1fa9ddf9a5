use ndarray::Array1;

use super::matrix::{BandedMatrix, MathError, MathResult};

/// Piecewise cubic with natural end conditions (zero curvature at both ends).
///
/// Segment `i` covers `[knots[i], knots[i + 1]]` and is stored as
/// `a + b·t + c·t² + d·t³` with `t = x - knots[i]`.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    coefficients: Vec<[f64; 4]>,
}

impl CubicSpline {
    /// Interpolates `(x, y)`; `x` must be strictly increasing with at least
    /// two points.
    pub fn natural(x: &[f64], y: &[f64]) -> MathResult<Self> {
        if x.len() != y.len() {
            return Err(MathError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        let n = x.len();
        if n < 2 {
            return Err(MathError::DimensionMismatch {
                expected: 2,
                actual: n,
            });
        }

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let slope: Vec<f64> = y
            .windows(2)
            .zip(&h)
            .map(|(w, &hi)| (w[1] - w[0]) / hi)
            .collect();

        // Second derivatives at the knots; the end values stay zero.
        let mut curvature = vec![0.0; n];
        if n > 2 {
            let interior = n - 2;
            let mut system = BandedMatrix::zeros(interior, 1);
            let mut rhs = Array1::zeros(interior);
            for row in 0..interior {
                let i = row + 1;
                system.add(row, row, 2.0 * (h[i - 1] + h[i]));
                if row > 0 {
                    system.add(row, row - 1, h[i - 1]);
                }
                rhs[row] = 6.0 * (slope[i] - slope[i - 1]);
            }
            let solved = system.cholesky()?.solve(rhs.view())?;
            for (slot, value) in curvature[1..n - 1].iter_mut().zip(solved.iter()) {
                *slot = *value;
            }
        }

        let coefficients = (0..n - 1)
            .map(|i| {
                let (m0, m1) = (curvature[i], curvature[i + 1]);
                [
                    y[i],
                    slope[i] - h[i] * (2.0 * m0 + m1) / 6.0,
                    m0 / 2.0,
                    (m1 - m0) / (6.0 * h[i]),
                ]
            })
            .collect();

        Ok(Self {
            knots: x.to_vec(),
            coefficients,
        })
    }

    /// Evaluates the spline; points outside the knot span use the end
    /// segments.
    pub fn eval(&self, x: f64) -> f64 {
        let segment = self
            .knots
            .partition_point(|&k| k <= x)
            .saturating_sub(1)
            .min(self.coefficients.len() - 1);
        polynomial(&self.coefficients[segment], x - self.knots[segment])
    }

    /// Location and value of the largest spline value over the knot span.
    pub fn maximum(&self) -> (f64, f64) {
        let last = self.knots.len() - 1;
        let mut best = (self.knots[last], self.eval(self.knots[last]));

        for (i, coef) in self.coefficients.iter().enumerate() {
            let width = self.knots[i + 1] - self.knots[i];
            let mut consider = |t: f64| {
                if (0.0..=width).contains(&t) {
                    let value = polynomial(coef, t);
                    if value > best.1 {
                        best = (self.knots[i] + t, value);
                    }
                }
            };
            consider(0.0);
            for t in derivative_roots(coef) {
                consider(t);
            }
        }
        best
    }
}

fn polynomial(coef: &[f64; 4], t: f64) -> f64 {
    coef[0] + t * (coef[1] + t * (coef[2] + t * coef[3]))
}

/// Real roots of `b + 2c·t + 3d·t²`.
fn derivative_roots(coef: &[f64; 4]) -> Vec<f64> {
    let (qa, qb, qc) = (3.0 * coef[3], 2.0 * coef[2], coef[1]);
    if qa.abs() < f64::EPSILON * (qb.abs() + qc.abs()).max(1.0) {
        if qb == 0.0 {
            return Vec::new();
        }
        return vec![-qc / qb];
    }
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return Vec::new();
    }
    let root = disc.sqrt();
    vec![(-qb + root) / (2.0 * qa), (-qb - root) / (2.0 * qa)]
}
