pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// `(min, max)` of the samples, `None` when empty.
    pub fn min_max(samples: &[f64]) -> Option<(f64, f64)> {
        let first = *samples.first()?;
        Some(
            samples
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Mean absolute element-wise difference; zero for empty input.
    pub fn mean_abs_diff(lhs: &[f64], rhs: &[f64]) -> f64 {
        let n = lhs.len().min(rhs.len());
        if n == 0 {
            return 0.0;
        }
        let total: f64 = lhs.iter().zip(rhs).map(|(a, b)| (a - b).abs()).sum();
        total / n as f64
    }

    /// Rescales so the first sample maps to 1 and the minimum to 0.
    ///
    /// A flat input (first sample equal to the minimum) maps to all zeros.
    pub fn normalize_to_peak(samples: &[f64]) -> Vec<f64> {
        let Some((lo, _)) = Self::min_max(samples) else {
            return Vec::new();
        };
        let range = samples[0] - lo;
        if range <= 0.0 {
            return vec![0.0; samples.len()];
        }
        samples.iter().map(|&v| (v - lo) / range).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[4.0]), 4.0);
    }

    #[test]
    fn min_max_of_empty_is_none() {
        assert_eq!(StatsHelper::min_max(&[]), None);
        assert_eq!(StatsHelper::min_max(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
    }

    #[test]
    fn normalize_maps_apex_to_one() {
        let n = StatsHelper::normalize_to_peak(&[5.0, 3.0, 1.0, 2.0]);
        assert_eq!(n, vec![1.0, 0.5, 0.0, 0.25]);
        assert_eq!(StatsHelper::normalize_to_peak(&[1.0, 1.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mean_abs_diff_averages() {
        assert_eq!(StatsHelper::mean_abs_diff(&[1.0, 2.0], &[0.0, 4.0]), 1.5);
    }
}
