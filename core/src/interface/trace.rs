use ndarray::{Array2, ArrayView1, ArrayView2};

/// Validation failures for trace construction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error("trace has no samples")]
    Empty,
    #[error("time axis has {time} samples but intensity has {rows} rows")]
    LengthMismatch { time: usize, rows: usize },
    #[error("time axis is not strictly increasing at sample {index}")]
    NonMonotonicTime { index: usize },
    #[error("non-finite value at sample {row}, channel {column}")]
    NonFinite { row: usize, column: usize },
    #[error("baseline shape {actual:?} does not match trace shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Intensity channels sharing one strictly increasing time axis.
///
/// Rows are samples, columns are channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    time: Vec<f64>,
    intensity: Array2<f64>,
}

impl Trace {
    pub fn new(time: Vec<f64>, intensity: Array2<f64>) -> Result<Self, TraceError> {
        if time.is_empty() || intensity.ncols() == 0 {
            return Err(TraceError::Empty);
        }
        if time.len() != intensity.nrows() {
            return Err(TraceError::LengthMismatch {
                time: time.len(),
                rows: intensity.nrows(),
            });
        }
        if let Some(index) = time
            .windows(2)
            .position(|w| !(w[1] > w[0]))
            .map(|i| i + 1)
        {
            return Err(TraceError::NonMonotonicTime { index });
        }
        if let Some(row) = time.iter().position(|t| !t.is_finite()) {
            return Err(TraceError::NonFinite { row, column: 0 });
        }
        if let Some(((row, column), _)) = intensity.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(TraceError::NonFinite { row, column });
        }
        Ok(Self { time, intensity })
    }

    /// One-channel trace.
    pub fn single(time: Vec<f64>, values: Vec<f64>) -> Result<Self, TraceError> {
        let rows = values.len();
        let intensity = Array2::from_shape_vec((rows, 1), values).map_err(|_| {
            TraceError::LengthMismatch {
                time: time.len(),
                rows,
            }
        })?;
        Self::new(time, intensity)
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn intensity(&self) -> ArrayView2<'_, f64> {
        self.intensity.view()
    }

    pub fn channel(&self, index: usize) -> ArrayView1<'_, f64> {
        self.intensity.column(index)
    }

    pub fn samples(&self) -> usize {
        self.time.len()
    }

    pub fn channels(&self) -> usize {
        self.intensity.ncols()
    }

    /// Midpoint and span of the time axis.
    pub fn time_extent(&self) -> (f64, f64) {
        let first = self.time[0];
        let last = self.time[self.time.len() - 1];
        ((first + last) / 2.0, last - first)
    }

    /// Copy of the trace with `baseline` removed from every channel.
    pub fn subtract(&self, baseline: ArrayView2<f64>) -> Result<Self, TraceError> {
        if baseline.dim() != self.intensity.dim() {
            return Err(TraceError::ShapeMismatch {
                expected: self.intensity.dim(),
                actual: baseline.dim(),
            });
        }
        Ok(Self {
            time: self.time.clone(),
            intensity: &self.intensity - &baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_length_mismatch() {
        let err = Trace::new(vec![0.0, 1.0], array![[1.0], [2.0], [3.0]]).unwrap_err();
        assert_eq!(err, TraceError::LengthMismatch { time: 2, rows: 3 });
    }

    #[test]
    fn rejects_repeated_time() {
        let err = Trace::single(vec![0.0, 1.0, 1.0], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, TraceError::NonMonotonicTime { index: 2 });
    }

    #[test]
    fn rejects_nan_intensity() {
        let err = Trace::new(vec![0.0, 1.0], array![[1.0, 2.0], [f64::NAN, 0.0]]).unwrap_err();
        assert_eq!(err, TraceError::NonFinite { row: 1, column: 0 });
    }

    #[test]
    fn subtract_removes_baseline() {
        let trace = Trace::single(vec![0.0, 1.0], vec![5.0, 7.0]).unwrap();
        let corrected = trace.subtract(array![[1.0], [2.0]].view()).unwrap();
        assert_eq!(corrected.channel(0).to_vec(), vec![4.0, 5.0]);
        assert!(trace.subtract(array![[1.0, 1.0]].view()).is_err());
    }

    #[test]
    fn extent_is_midpoint_and_span() {
        let trace = Trace::single(vec![2.0, 3.0, 6.0], vec![0.0; 3]).unwrap();
        assert_eq!(trace.time_extent(), (4.0, 4.0));
    }
}
