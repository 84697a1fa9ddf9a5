use ndarray::{Array1, Array2, ArrayView1};

/// Errors raised by the dense numeric helpers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("matrix is not positive definite (pivot {row})")]
    NotPositiveDefinite { row: usize },
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type MathResult<T> = Result<T, MathError>;

/// Symmetric banded matrix stored by diagonals.
///
/// `bands[[d, i]]` holds the element at row `i + d`, column `i`, so only the
/// lower triangle is kept and the diagonal lives in row 0.
#[derive(Debug, Clone)]
pub struct BandedMatrix {
    bands: Array2<f64>,
}

impl BandedMatrix {
    pub fn zeros(order: usize, bandwidth: usize) -> Self {
        Self {
            bands: Array2::zeros((bandwidth + 1, order)),
        }
    }

    pub fn order(&self) -> usize {
        self.bands.ncols()
    }

    pub fn bandwidth(&self) -> usize {
        self.bands.nrows() - 1
    }

    /// Element `(row, col)`; zero outside the band.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (lo, hi) = if row >= col { (col, row) } else { (row, col) };
        let offset = hi - lo;
        if offset > self.bandwidth() || hi >= self.order() {
            return 0.0;
        }
        self.bands[[offset, lo]]
    }

    /// Adds `value` to the symmetric pair `(row, col)` / `(col, row)`.
    ///
    /// Entries outside the band are ignored.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let (lo, hi) = if row >= col { (col, row) } else { (row, col) };
        let offset = hi - lo;
        if offset <= self.bandwidth() && hi < self.order() {
            self.bands[[offset, lo]] += value;
        }
    }

    /// Returns `self + diag(weights)`.
    pub fn with_diagonal(&self, weights: ArrayView1<f64>) -> MathResult<Self> {
        if weights.len() != self.order() {
            return Err(MathError::DimensionMismatch {
                expected: self.order(),
                actual: weights.len(),
            });
        }
        let mut out = self.clone();
        {
            let mut diagonal = out.bands.row_mut(0);
            diagonal += &weights;
        }
        Ok(out)
    }

    /// Banded Cholesky factorization `A = L Lᵀ`, reusing the band storage.
    pub fn cholesky(self) -> MathResult<CholeskyFactor> {
        let n = self.order();
        let p = self.bandwidth();
        let mut l = self.bands;

        for j in 0..n {
            let start = j.saturating_sub(p);
            let mut pivot = l[[0, j]];
            for k in start..j {
                let v = l[[j - k, k]];
                pivot -= v * v;
            }
            if !(pivot > 0.0) || !pivot.is_finite() {
                return Err(MathError::NotPositiveDefinite { row: j });
            }
            let diag = pivot.sqrt();
            l[[0, j]] = diag;

            let end = (j + p).min(n.saturating_sub(1));
            for i in (j + 1)..=end {
                let mut value = l[[i - j, j]];
                for k in i.saturating_sub(p)..j {
                    value -= l[[i - k, k]] * l[[j - k, k]];
                }
                l[[i - j, j]] = value / diag;
            }
        }

        Ok(CholeskyFactor { factor: l })
    }
}

/// Lower-triangular banded factor produced by [`BandedMatrix::cholesky`].
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    factor: Array2<f64>,
}

impl CholeskyFactor {
    /// Solves `L Lᵀ x = rhs`.
    pub fn solve(&self, rhs: ArrayView1<f64>) -> MathResult<Array1<f64>> {
        let n = self.factor.ncols();
        let p = self.factor.nrows() - 1;
        if rhs.len() != n {
            return Err(MathError::DimensionMismatch {
                expected: n,
                actual: rhs.len(),
            });
        }
        let l = &self.factor;

        let mut x = rhs.to_owned();
        for i in 0..n {
            let mut value = x[i];
            for k in i.saturating_sub(p)..i {
                value -= l[[i - k, k]] * x[k];
            }
            x[i] = value / l[[0, i]];
        }
        for i in (0..n).rev() {
            let mut value = x[i];
            let end = (i + p).min(n.saturating_sub(1));
            for k in (i + 1)..=end {
                value -= l[[k - i, i]] * x[k];
            }
            x[i] = value / l[[0, i]];
        }
        Ok(x)
    }
}

/// Builds `smoothness · DᵀD` for the second-order difference operator over
/// `order` samples. Fewer than three samples yield the zero matrix.
pub fn second_difference_penalty(order: usize, smoothness: f64) -> BandedMatrix {
    const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
    let mut penalty = BandedMatrix::zeros(order, 2);
    if order < 3 {
        return penalty;
    }
    for row in 0..order - 2 {
        for (j, &cj) in STENCIL.iter().enumerate() {
            for (k, &ck) in STENCIL.iter().enumerate().skip(j) {
                let value = smoothness * cj * ck;
                if j == k {
                    penalty.add(row + j, row + j, value);
                } else {
                    penalty.add(row + k, row + j, value);
                }
            }
        }
    }
    penalty
}
