//! Asymmetric least-squares baseline estimation (Eilers 2003).
//!
//! Each channel solves `(W + s·DᵀD) z = W y` repeatedly, re-weighting samples
//! above the current fit by `asymmetry` and the rest by `1 - asymmetry` until
//! the weights settle.

use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_traits::Float;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::matrix::{second_difference_penalty, BandedMatrix, MathResult};
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder};

const ASYMMETRY_LIMIT: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaselineConfig {
    pub smoothness: f64,
    pub asymmetry: f64,
    pub max_iterations: usize,
    pub gradient_tol: f64,
    /// Fan channels out over the rayon pool.
    pub parallel: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            smoothness: 1e6,
            asymmetry: 1e-4,
            max_iterations: 10,
            gradient_tol: 1e-4,
            parallel: true,
        }
    }
}

impl BaselineConfig {
    /// Clamps every parameter into its usable range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let smoothness = if self.smoothness > 0.0 && self.smoothness.is_finite() {
            self.smoothness
        } else {
            defaults.smoothness
        };
        let asymmetry = if self.asymmetry.is_nan() {
            defaults.asymmetry
        } else {
            self.asymmetry.clamp(ASYMMETRY_LIMIT, 1.0 - ASYMMETRY_LIMIT)
        };
        let gradient_tol = if self.gradient_tol > 0.0 {
            self.gradient_tol
        } else {
            0.0
        };
        Self {
            smoothness,
            asymmetry,
            max_iterations: self.max_iterations.max(1),
            gradient_tol,
            parallel: self.parallel,
        }
    }
}

/// How one channel's iteration ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub iterations: usize,
    pub converged: bool,
    /// All-zero channel; no solve was attempted.
    pub skipped: bool,
    /// The weighted system stopped being positive definite.
    pub singular: bool,
}

#[derive(Debug, Clone)]
pub struct BaselineEstimate {
    pub baseline: Array2<f64>,
    pub channels: Vec<ChannelReport>,
}

pub struct BaselineEstimator {
    config: BaselineConfig,
}

impl BaselineEstimator {
    pub fn new(config: &BaselineConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Estimates a baseline for every column of `intensity`.
    pub fn estimate(&self, intensity: ArrayView2<f64>) -> BaselineEstimate {
        let (rows, cols) = intensity.dim();
        let penalty = second_difference_penalty(rows, self.config.smoothness);

        let solved: Vec<(Array1<f64>, ChannelReport)> = if self.config.parallel {
            (0..cols)
                .into_par_iter()
                .map(|j| self.solve_column(j, intensity.column(j), &penalty))
                .collect()
        } else {
            (0..cols)
                .map(|j| self.solve_column(j, intensity.column(j), &penalty))
                .collect()
        };

        let mut baseline = Array2::zeros((rows, cols));
        let mut channels = Vec::with_capacity(cols);
        for (j, (column, report)) in solved.into_iter().enumerate() {
            baseline.column_mut(j).assign(&column);
            channels.push(report);
        }
        BaselineEstimate { baseline, channels }
    }

    /// Same as [`estimate`](Self::estimate) for any float element type; the
    /// solve runs in `f64` and the result is cast back.
    pub fn estimate_as<T: Float>(&self, intensity: ArrayView2<T>) -> Array2<T> {
        let promoted = intensity.mapv(|v| v.to_f64().unwrap_or(0.0));
        self.estimate(promoted.view())
            .baseline
            .mapv(|v| T::from(v).unwrap_or_else(T::zero))
    }

    fn solve_column(
        &self,
        channel: usize,
        y: ArrayView1<f64>,
        penalty: &BandedMatrix,
    ) -> (Array1<f64>, ChannelReport) {
        self.estimate_channel(channel, y, |weights| solve_weighted(penalty, weights, y))
    }

    /// Reweighting loop over `solve`; a failed solve keeps the previous
    /// baseline and marks the channel singular.
    fn estimate_channel<S>(
        &self,
        channel: usize,
        y: ArrayView1<f64>,
        solve: S,
    ) -> (Array1<f64>, ChannelReport)
    where
        S: Fn(ArrayView1<f64>) -> MathResult<Array1<f64>>,
    {
        let rows = y.len();
        let mut report = ChannelReport::default();
        let mut baseline = Array1::zeros(rows);

        if y.iter().all(|&v| v == 0.0) {
            debug!("baseline channel {channel}: all-zero, skipped");
            report.skipped = true;
            return (baseline, report);
        }

        let asymmetry = self.config.asymmetry;
        let mut weights = Array1::ones(rows);

        for iteration in 1..=self.config.max_iterations {
            match solve(weights.view()) {
                Ok(z) => baseline = z,
                Err(err) => {
                    warn!("baseline channel {channel}: {err}; keeping iteration {}", iteration - 1);
                    report.singular = true;
                    break;
                }
            }
            report.iterations = iteration;

            let updated: Array1<f64> = y
                .iter()
                .zip(baseline.iter())
                .map(|(&yi, &zi)| if yi > zi { asymmetry } else { 1.0 - asymmetry })
                .collect();
            let change = StatsHelper::mean_abs_diff(
                updated.as_slice().unwrap_or(&[]),
                weights.as_slice().unwrap_or(&[]),
            );
            weights = updated;

            if change <= self.config.gradient_tol {
                report.converged = true;
                break;
            }
        }

        debug!(
            "baseline channel {channel}: {} iteration(s), converged={}",
            report.iterations, report.converged
        );
        (baseline, report)
    }
}

fn solve_weighted(
    penalty: &BandedMatrix,
    weights: ArrayView1<f64>,
    y: ArrayView1<f64>,
) -> MathResult<Array1<f64>> {
    let factor = penalty.with_diagonal(weights)?.cholesky()?;
    let rhs = &weights * &y;
    factor.solve(rhs.view())
}

/// Baseline stage; optionally hands the corrected trace downstream.
pub struct BaselineStage {
    config: Option<StageConfig>,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl BaselineStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("BaselineStage"),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}

impl Default for BaselineStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for BaselineStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let estimator = BaselineEstimator::new(&config.baseline);
        let estimate = estimator.estimate(input.trace.intensity());

        for (channel, report) in estimate.channels.iter().enumerate() {
            if report.skipped {
                self.metrics.record_skipped();
                self.logger.degraded(channel, "all-zero channel, baseline left at zero");
                continue;
            }
            if report.singular {
                self.metrics.record_singular();
                self.logger
                    .degraded(channel, "singular weighted system, kept last baseline");
            }
            self.metrics.record_processed();
        }

        let converged = estimate.channels.iter().filter(|r| r.converged).count();
        let note = format!(
            "baseline converged on {}/{} channel(s)",
            converged,
            estimate.channels.len()
        );
        self.logger.record(&note);

        let trace = if config.subtract_baseline {
            input.trace.subtract(estimate.baseline.view())?
        } else {
            input.trace
        };

        let metadata = StageMetadata {
            baseline: Some(estimate.baseline),
            candidates: input.candidates,
            notes: vec![note],
            ..Default::default()
        };

        Ok(StageOutput { trace, metadata })
    }

    fn cleanup(&mut self) {
        self.metrics.reset();
        self.config = None;
    }
}
