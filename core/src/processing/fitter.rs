use log::debug;
use rayon::prelude::*;

use crate::interface::{ChannelPeaks, FittedPeak, PeakCandidate, Side, SideCandidate, Trace};
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::egh;
use crate::telemetry::{LogManager, MetricsRecorder};

/// Fits an EGH model to every candidate, trying the left- and right-seeded
/// geometry and keeping the one with the lower RMS error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeakFitter;

impl PeakFitter {
    pub fn new() -> Self {
        Self
    }

    pub fn fit(
        &self,
        trace: &Trace,
        candidates: &ChannelPeaks<PeakCandidate>,
    ) -> ChannelPeaks<FittedPeak> {
        (0..trace.channels())
            .into_par_iter()
            .map(|channel| {
                let Some(found) = candidates.get(channel) else {
                    return Vec::new();
                };
                let values = trace.channel(channel).to_vec();
                found
                    .iter()
                    .filter_map(|candidate| self.fit_candidate(trace.time(), &values, candidate))
                    .collect()
            })
            .collect()
    }

    /// Best of the two side models; `None` when neither side has a center.
    pub fn fit_candidate(
        &self,
        time: &[f64],
        values: &[f64],
        candidate: &PeakCandidate,
    ) -> Option<FittedPeak> {
        let floor = StatsHelper::min_max(values).map_or(0.0, |(lo, _)| lo);
        Side::BOTH
            .iter()
            .filter(|&&side| candidate.side(side).center != 0.0)
            .map(|&side| fit_side(time, values, floor, candidate.side(side), side))
            .min_by(|a, b| rank(a.error_pct).total_cmp(&rank(b.error_pct)))
    }
}

fn rank(error: f64) -> f64 {
    if error.is_nan() {
        f64::INFINITY
    } else {
        error
    }
}

fn fit_side(
    time: &[f64],
    values: &[f64],
    floor: f64,
    candidate: &SideCandidate,
    side: Side,
) -> FittedPeak {
    let SideCandidate {
        center,
        height,
        a,
        b,
        alpha,
        ..
    } = *candidate;
    let width = egh::width(a, b, alpha);
    let decay = egh::decay(a, b, alpha);
    let fit = egh::curve(time, center, height, width, decay);

    let mut residuals: Vec<f64> = time
        .iter()
        .zip(values.iter().zip(&fit))
        .filter(|&(&t, _)| t >= center - width && t <= center + width)
        .map(|(_, (y, f))| y - f)
        .collect();
    if residuals.is_empty() {
        residuals = values.iter().zip(&fit).map(|(y, f)| y - f).collect();
    }
    let scale = height - floor;
    let error_pct = if scale > 0.0 {
        StatsHelper::rms(&residuals) / scale * 100.0
    } else {
        f64::INFINITY
    };

    debug!("{side:?}-seeded fit at {center:.4}: w={width:.4} e={decay:.4} error={error_pct:.3}%");

    FittedPeak {
        time: center,
        height,
        width,
        decay,
        area: egh::area(height, width, decay),
        fit,
        error_pct,
        side,
    }
}

/// Fitting stage; consumes the candidates produced by the locator stage.
pub struct FitterStage {
    config: Option<StageConfig>,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl FitterStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("FitterStage"),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}

impl Default for FitterStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for FitterStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        if self.config.is_none() {
            return Err(StageError::Internal("stage not initialized".into()));
        }
        if input.candidates.len() != input.trace.channels() {
            return Err(StageError::InvalidInput(format!(
                "expected candidates for {} channel(s), got {}",
                input.trace.channels(),
                input.candidates.len()
            )));
        }

        let peaks = PeakFitter::new().fit(&input.trace, &input.candidates);
        for (channel, fitted) in peaks.iter().enumerate() {
            if fitted.is_empty() {
                self.metrics.record_skipped();
                self.logger.degraded(channel, "nothing to fit");
            } else {
                self.metrics.record_processed();
            }
        }

        let notes = peaks
            .iter()
            .enumerate()
            .flat_map(|(channel, fitted)| {
                fitted.iter().map(move |p| {
                    format!(
                        "channel {} peak t={:.4} h={:.4} area={:.4} error={:.3}%",
                        channel, p.time, p.height, p.area, p.error_pct
                    )
                })
            })
            .collect::<Vec<_>>();
        self.logger
            .record(&format!("fitted {} peak(s)", notes.len()));

        Ok(StageOutput {
            trace: input.trace,
            metadata: StageMetadata {
                candidates: input.candidates,
                peaks,
                notes,
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.metrics.reset();
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::locator::{LocatorConfig, PeakLocator};
    use std::f64::consts::PI;

    fn axis() -> Vec<f64> {
        (0..1001).map(|i| i as f64 * 0.01).collect()
    }

    fn locate_and_fit(time: &[f64], values: &[f64]) -> Vec<FittedPeak> {
        let trace = Trace::single(time.to_vec(), values.to_vec()).unwrap();
        let candidates = PeakLocator::new(&LocatorConfig::default()).locate(&trace);
        PeakFitter::new().fit(&trace, &candidates).remove(0)
    }

    #[test]
    fn gaussian_area_is_recovered() {
        let time = axis();
        let values = egh::curve(&time, 4.3, 50.0, 0.3, 0.0);
        let peaks = locate_and_fit(&time, &values);
        let peak = &peaks[0];
        let expected = 50.0 * 0.3 * (2.0 * PI).sqrt();
        assert!((peak.area / expected - 1.0).abs() < 0.05, "area {}", peak.area);
        assert!((peak.time - 4.3).abs() < 0.01);
        assert!(peak.error_pct < 1.0);
    }

    #[test]
    fn skewed_peak_recovers_decay_sign() {
        let time = axis();
        let values = egh::curve(&time, 4.3, 50.0, 0.3, 0.2);
        let peak = &locate_and_fit(&time, &values)[0];
        assert!((peak.time - 4.3).abs() < 0.02);
        assert!(peak.decay > 0.0);
        assert!(peak.error_pct < 5.0, "error {}", peak.error_pct);
        assert_eq!(peak.fit.len(), time.len());
    }

    #[test]
    fn refitting_the_fit_is_stable() {
        let time = axis();
        let values: Vec<f64> = time
            .iter()
            .map(|&t| 100.0 * (-(t - 5.003).powi(2) / (2.0 * 0.25)).exp())
            .collect();
        let first = locate_and_fit(&time, &values).remove(0);
        let second = locate_and_fit(&time, &first.fit).remove(0);
        assert!((first.time - second.time).abs() < 1e-3);
        assert!((first.height - second.height).abs() < 1e-3 * first.height);
    }

    #[test]
    fn zero_center_candidates_are_skipped() {
        let time = axis();
        let values = egh::curve(&time, 4.3, 50.0, 0.3, 0.0);
        let side = SideCandidate {
            center: 0.0,
            height: 1.0,
            width: 1.0,
            a: 0.5,
            b: 0.5,
            alpha: 0.5,
        };
        let candidate = PeakCandidate {
            apex_index: 0,
            left: side,
            right: side,
        };
        assert!(PeakFitter::new()
            .fit_candidate(&time, &values, &candidate)
            .is_none());
    }

    #[test]
    fn lower_error_side_wins() {
        let time = axis();
        let values = egh::curve(&time, 5.0, 10.0, 0.4, 0.0);
        let good = SideCandidate {
            center: 5.0,
            height: 10.0,
            width: 0.8,
            a: 0.4,
            b: 0.4,
            alpha: (-0.5_f64).exp(),
        };
        let poor = SideCandidate {
            width: 3.0,
            a: 1.5,
            b: 1.5,
            ..good
        };
        let candidate = PeakCandidate {
            apex_index: 500,
            left: poor,
            right: good,
        };
        let peak = PeakFitter::new()
            .fit_candidate(&time, &values, &candidate)
            .unwrap();
        assert_eq!(peak.side, Side::Right);
        assert!((peak.width - 0.4).abs() < 1e-9);
    }

    #[test]
    fn collapsed_geometry_yields_large_error() {
        let time = axis();
        let values = egh::curve(&time, 5.0, 10.0, 0.4, 0.0);
        let side = SideCandidate {
            center: 5.0,
            height: 10.0,
            width: 0.0,
            a: 0.0,
            b: 0.0,
            alpha: 0.5,
        };
        let candidate = PeakCandidate {
            apex_index: 500,
            left: side,
            right: side,
        };
        let peak = PeakFitter::new()
            .fit_candidate(&time, &values, &candidate)
            .unwrap();
        assert!(peak.fit.iter().all(|&v| v == 0.0));
        assert!(peak.error_pct > 20.0);
    }

    #[test]
    fn stage_rejects_missing_candidates() {
        let time = axis();
        let values = egh::curve(&time, 5.0, 10.0, 0.4, 0.0);
        let trace = Trace::single(time, values).unwrap();
        let mut stage = FitterStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let err = stage.execute(StageInput::new(trace)).unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }
}
