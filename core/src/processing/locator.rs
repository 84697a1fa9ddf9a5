//! Local-maximum search and asymmetric boundary estimation.
//!
//! For every selected apex the two flanks are walked outward over a common
//! reach. The boundary on a flank is the first sample where the running
//! shape difference between the normalized flanks exceeds that flank's own
//! normalized height. The opposite flank is then cut at the same absolute
//! height, which yields two boundary pairs: one seeded from each side.

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::interface::{ChannelPeaks, PeakCandidate, Side, SideCandidate, Trace};
use crate::math::spline::CubicSpline;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder};

/// Samples on each side of the apex used by the narrow refinement spline.
const APEX_SPLINE_HALF_WIDTH: usize = 2;
/// Interpolated crossings further than this multiple of the seeded distance
/// are replaced by the seeded distance.
const CROSSING_LIMIT: f64 = 2.0;
/// Boundary-distance ratio below which the refinement spline spans the whole
/// detected window.
const WIDE_SPLINE_RATIO: f64 = 0.5;
const HALF_HEIGHT: f64 = 0.5;

/// A scalar applied to every channel, or one value per channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Hint {
    Uniform(f64),
    PerChannel(Vec<f64>),
}

impl Hint {
    pub fn for_channel(&self, channel: usize) -> Option<f64> {
        match self {
            Hint::Uniform(value) => Some(*value),
            Hint::PerChannel(values) => values.get(channel).copied(),
        }
    }
}

/// Extra restrictions on which maxima qualify.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchBounds {
    pub xmin: Option<f64>,
    pub xmax: Option<f64>,
    pub ymin: Option<f64>,
    pub ymax: Option<f64>,
    /// Number of highest maxima per channel to report.
    pub amount: usize,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            xmin: None,
            xmax: None,
            ymin: None,
            ymax: None,
            amount: 1,
        }
    }
}

impl SearchBounds {
    fn admits(&self, x: f64, y: f64) -> bool {
        self.xmin.map_or(true, |v| x >= v)
            && self.xmax.map_or(true, |v| x <= v)
            && self.ymin.map_or(true, |v| y >= v)
            && self.ymax.map_or(true, |v| y <= v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocatorConfig {
    /// Search-window center; defaults to the middle of the time axis.
    pub center: Option<Hint>,
    /// Search-window width; defaults to the span of the time axis.
    pub width: Option<Hint>,
    pub bounds: SearchBounds,
}

pub struct PeakLocator {
    config: LocatorConfig,
}

impl PeakLocator {
    pub fn new(config: &LocatorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Candidates for every channel of `trace`; channels without a usable
    /// maximum get an empty list.
    pub fn locate(&self, trace: &Trace) -> ChannelPeaks<PeakCandidate> {
        let (default_center, default_width) = trace.time_extent();
        (0..trace.channels())
            .into_par_iter()
            .map(|channel| {
                let center = self
                    .config
                    .center
                    .as_ref()
                    .and_then(|h| h.for_channel(channel))
                    .unwrap_or(default_center);
                let width = self
                    .config
                    .width
                    .as_ref()
                    .and_then(|h| h.for_channel(channel))
                    .unwrap_or(default_width);
                let values = trace.channel(channel).to_vec();
                let found = self.locate_channel(trace.time(), &values, center, width);
                debug!("locator channel {channel}: {} candidate(s)", found.len());
                found
            })
            .collect()
    }

    pub fn locate_channel(
        &self,
        time: &[f64],
        values: &[f64],
        center: f64,
        width: f64,
    ) -> Vec<PeakCandidate> {
        let (lo, hi) = (center - width / 2.0, center + width / 2.0);
        let bounds = &self.config.bounds;

        let mut apexes: Vec<usize> = local_maxima(values)
            .into_iter()
            .filter(|&i| time[i] >= lo && time[i] <= hi && bounds.admits(time[i], values[i]))
            .collect();
        apexes.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        apexes.truncate(bounds.amount.max(1));

        apexes
            .into_iter()
            .map(|apex| describe_apex(time, values, apex))
            .collect()
    }
}

/// Indices `i` with `y[i] > y[i + 1]` and `y[i] >= y[i - 1]`.
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i + 1] && values[i] >= values[i - 1])
        .collect()
}

/// One flank of a peak, ordered outward from the apex.
struct Flank {
    intensity: Vec<f64>,
    distance: Vec<f64>,
    normalized: Vec<f64>,
    floor: f64,
}

impl Flank {
    fn walk(time: &[f64], values: &[f64], apex: usize, reach: usize, side: Side) -> Self {
        let index = |k: usize| match side {
            Side::Left => apex - k,
            Side::Right => apex + k,
        };
        let intensity: Vec<f64> = (0..=reach).map(|k| values[index(k)]).collect();
        let distance = (0..=reach)
            .map(|k| (time[index(k)] - time[apex]).abs())
            .collect();
        let normalized = StatsHelper::normalize_to_peak(&intensity);
        let floor = StatsHelper::min_max(&intensity).map_or(0.0, |(lo, _)| lo);
        Self {
            intensity,
            distance,
            normalized,
            floor,
        }
    }

    fn last(&self) -> usize {
        self.intensity.len() - 1
    }

    /// First sample where the running difference exceeds this flank's
    /// normalized height; the half-height sample when the flanks never
    /// diverge.
    fn boundary(&self, divergence: &[f64]) -> usize {
        let n = self.last();
        (1..=n)
            .find(|&k| self.normalized[k] > 0.0 && divergence[k] > self.normalized[k])
            .or_else(|| (1..=n).find(|&k| self.normalized[k] <= HALF_HEIGHT))
            .unwrap_or(n)
    }

    /// Distance at which this flank first falls to `height`, interpolated
    /// between the bracketing samples.
    fn crossing(&self, height: f64) -> f64 {
        let n = self.last();
        for k in 1..=n {
            if self.intensity[k] <= height {
                let (y0, y1) = (self.intensity[k - 1], self.intensity[k]);
                let (d0, d1) = (self.distance[k - 1], self.distance[k]);
                if y0 == y1 {
                    return d1;
                }
                let slope = (y1 - y0) / (d1 - d0);
                let intercept = y0 - slope * d0;
                return (height - intercept) / slope;
            }
        }
        self.distance[n]
    }
}

fn describe_apex(time: &[f64], values: &[f64], apex: usize) -> PeakCandidate {
    let reach = apex.min(values.len() - 1 - apex);
    let left = Flank::walk(time, values, apex, reach, Side::Left);
    let right = Flank::walk(time, values, apex, reach, Side::Right);

    let divergence: Vec<f64> = left
        .normalized
        .iter()
        .zip(&right.normalized)
        .scan(0.0, |acc, (l, r)| {
            *acc += (l - r).abs();
            Some(*acc)
        })
        .collect();

    let seeded = |own: &Flank, other: &Flank, side: Side| {
        let k = own.boundary(&divergence);
        let own_distance = own.distance[k];
        let height = own.intensity[k];
        let mut other_distance = other.crossing(height);
        if other_distance > CROSSING_LIMIT * own_distance || other_distance < 0.0 {
            other_distance = own_distance;
        }
        let (left_edge, right_edge) = match side {
            Side::Left => (time[apex] - own_distance, time[apex] + other_distance),
            Side::Right => (time[apex] - other_distance, time[apex] + own_distance),
        };
        let (center, apex_height) = refine_apex(time, values, apex, left_edge, right_edge);
        let range = apex_height - own.floor;
        let alpha = if range > 0.0 {
            (height - own.floor) / range
        } else {
            f64::NAN
        };
        SideCandidate {
            center,
            height: apex_height,
            width: right_edge - left_edge,
            a: center - left_edge,
            b: right_edge - center,
            alpha,
        }
        .sanitized()
    };

    PeakCandidate {
        apex_index: apex,
        left: seeded(&left, &right, Side::Left),
        right: seeded(&right, &left, Side::Right),
    }
}

/// Spline maximum near the apex. The spline covers five samples, or the
/// whole boundary window when one edge is much closer to the apex.
fn refine_apex(
    time: &[f64],
    values: &[f64],
    apex: usize,
    left_edge: f64,
    right_edge: f64,
) -> (f64, f64) {
    let last = values.len() - 1;
    let mut lo = apex.saturating_sub(APEX_SPLINE_HALF_WIDTH);
    let mut hi = (apex + APEX_SPLINE_HALF_WIDTH).min(last);

    let (near, far) = {
        let l = time[apex] - left_edge;
        let r = right_edge - time[apex];
        (l.min(r), l.max(r))
    };
    if near < WIDE_SPLINE_RATIO * far {
        let first = time.partition_point(|&t| t < left_edge).min(apex);
        let end = time.partition_point(|&t| t <= right_edge).max(apex + 1);
        lo = lo.min(first);
        hi = hi.max(end - 1).min(last);
    }

    match CubicSpline::natural(&time[lo..=hi], &values[lo..=hi]) {
        Ok(spline) => spline.maximum(),
        Err(err) => {
            debug!("apex refinement at sample {apex} fell back to raw sample: {err}");
            (time[apex], values[apex])
        }
    }
}

/// Locator stage; attaches candidates to the metadata.
pub struct LocatorStage {
    config: Option<StageConfig>,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl LocatorStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("LocatorStage"),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}

impl Default for LocatorStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for LocatorStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let candidates = PeakLocator::new(&config.locator).locate(&input.trace);
        for (channel, found) in candidates.iter().enumerate() {
            if found.is_empty() {
                self.metrics.record_skipped();
                self.logger.degraded(channel, "no local maximum inside the search window");
            } else {
                self.metrics.record_processed();
            }
        }

        let located = candidates.iter().filter(|c| !c.is_empty()).count();
        let note = format!("located peaks on {}/{} channel(s)", located, candidates.len());
        self.logger.record(&note);

        Ok(StageOutput {
            trace: input.trace,
            metadata: StageMetadata {
                candidates,
                notes: vec![note],
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

    fn axis() -> Vec<f64> {
        (0..1001).map(|i| i as f64 * 0.01).collect()
    }

    fn gaussian(time: &[f64], center: f64, sigma: f64, height: f64) -> Vec<f64> {
        time.iter()
            .map(|&t| height * (-(t - center).powi(2) / (2.0 * sigma * sigma)).exp())
            .collect()
    }

    fn locate(time: &[f64], values: &[f64], config: &LocatorConfig) -> Vec<PeakCandidate> {
        let trace = Trace::single(time.to_vec(), values.to_vec()).unwrap();
        PeakLocator::new(config).locate(&trace).remove(0)
    }

    #[test]
    fn local_maxima_prefers_last_plateau_sample() {
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 0.0]), vec![2]);
        assert_eq!(local_maxima(&[0.0, 2.0, 1.0, 3.0, 0.5]), vec![1, 3]);
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn gaussian_center_is_recovered_on_both_sides() {
        let time = axis();
        let values = gaussian(&time, 5.003, 0.5, 100.0);
        let found = locate(&time, &values, &LocatorConfig::default());
        assert_eq!(found.len(), 1);
        for side in Side::BOTH {
            let candidate = found[0].side(side);
            assert!((candidate.center - 5.003).abs() < 0.01, "{side:?}: {candidate:?}");
            assert!((candidate.height - 100.0).abs() < 0.1);
            assert!(candidate.alpha > 0.0 && candidate.alpha < 1.0);
            assert!(candidate.a > 0.0 && candidate.b > 0.0);
        }
    }

    #[test]
    fn symmetric_peak_has_matching_edges() {
        let time = axis();
        let values = gaussian(&time, 4.0, 0.3, 10.0);
        let found = locate(&time, &values, &LocatorConfig::default());
        let left = found[0].left;
        assert!((left.a - left.b).abs() < 0.02, "{left:?}");
        assert!((left.width - (left.a + left.b)).abs() < 1e-9);
    }

    /// Narrow core with a slowly decaying shelf on the right only.
    fn shouldered() -> (Vec<f64>, Vec<f64>) {
        let time: Vec<f64> = (0..101).map(|i| i as f64 * 0.1).collect();
        let core = gaussian(&time, 5.0, 0.3, 10.0);
        let values = time
            .iter()
            .zip(core)
            .enumerate()
            .map(|(i, (&t, g))| if i >= 50 { g + 5.0 * (-(t - 5.0) / 4.0).exp() } else { g })
            .collect();
        (time, values)
    }

    #[test]
    fn distant_crossing_is_clipped_to_seeded_distance() {
        let (time, values) = shouldered();
        let candidate = describe_apex(&time, &values, 50);
        // left boundary two samples out; the shelf crosses that height at ~0.436
        let left = candidate.left;
        assert!((left.width - 0.4).abs() < 1e-9, "{left:?}");
        assert!((left.a + left.b - 0.4).abs() < 1e-9);
    }

    #[test]
    fn lopsided_window_widens_refinement_spline() {
        let (time, values) = shouldered();
        let candidate = describe_apex(&time, &values, 50);
        let (left, right) = (candidate.left, candidate.right);
        // right edge at 0.3, left crossing at ~0.078: spline spans samples 48..=53
        assert!((right.width - 0.377539).abs() < 1e-5, "{right:?}");
        assert!((right.center - 5.030561).abs() < 1e-5, "{right:?}");
        assert!((left.center - 5.030981).abs() < 1e-5, "{left:?}");
        assert!((left.center - right.center).abs() > 1e-4);
    }

    #[test]
    fn monotonic_trace_has_no_candidate() {
        let time = axis();
        let found = locate(&time, &time, &LocatorConfig::default());
        assert!(found.is_empty());
    }

    #[test]
    fn window_restricts_candidates() {
        let time = axis();
        let values: Vec<f64> = gaussian(&time, 3.0, 0.2, 80.0)
            .iter()
            .zip(gaussian(&time, 7.0, 0.3, 40.0))
            .map(|(a, b)| a + b)
            .collect();

        let around_second = LocatorConfig {
            center: Some(Hint::Uniform(7.0)),
            width: Some(Hint::Uniform(2.0)),
            ..Default::default()
        };
        let found = locate(&time, &values, &around_second);
        assert_eq!(found.len(), 1);
        assert!((found[0].left.center - 7.0).abs() < 0.01);

        let empty_window = LocatorConfig {
            center: Some(Hint::Uniform(5.0)),
            width: Some(Hint::Uniform(1.0)),
            ..Default::default()
        };
        assert!(locate(&time, &values, &empty_window).is_empty());
    }

    #[test]
    fn amount_returns_highest_maxima_first() {
        let time = axis();
        let values: Vec<f64> = gaussian(&time, 3.0, 0.2, 80.0)
            .iter()
            .zip(gaussian(&time, 7.0, 0.3, 40.0))
            .map(|(a, b)| a + b)
            .collect();
        let config = LocatorConfig {
            bounds: SearchBounds {
                amount: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let found = locate(&time, &values, &config);
        assert_eq!(found.len(), 2);
        assert!((found[0].left.center - 3.0).abs() < 0.01);
        assert!((found[1].left.center - 7.0).abs() < 0.01);

        let capped = LocatorConfig {
            bounds: SearchBounds {
                ymax: Some(50.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let found = locate(&time, &values, &capped);
        assert_eq!(found.len(), 1);
        assert!((found[0].right.center - 7.0).abs() < 0.01);
    }

    #[test]
    fn per_channel_hints_fall_back_to_defaults() {
        let time = axis();
        let first = gaussian(&time, 2.0, 0.2, 10.0);
        let second = gaussian(&time, 8.0, 0.2, 10.0);
        let intensity = ndarray::Array2::from_shape_fn((time.len(), 2), |(i, j)| {
            if j == 0 {
                first[i]
            } else {
                second[i]
            }
        });
        let trace = Trace::new(time, intensity).unwrap();
        let config = LocatorConfig {
            center: Some(Hint::PerChannel(vec![2.0])),
            width: Some(Hint::PerChannel(vec![1.0])),
            ..Default::default()
        };
        let found = PeakLocator::new(&config).locate(&trace);
        assert_eq!(found.len(), 2);
        assert!((found[0][0].left.center - 2.0).abs() < 0.01);
        assert!((found[1][0].left.center - 8.0).abs() < 0.01);
    }

    #[test]
    fn plateau_apex_is_refined_between_samples() {
        let found = locate(
            &[0.0, 1.0, 2.0, 3.0],
            &[0.0, 1.0, 1.0, 0.0],
            &LocatorConfig::default(),
        );
        assert_eq!(found[0].apex_index, 2);
        assert!((found[0].left.center - 1.5).abs() < 1e-9);
    }

    #[test]
    fn hint_deserializes_scalar_or_list() {
        let scalar: Hint = serde_json::from_str("4.5").unwrap();
        assert_eq!(scalar, Hint::Uniform(4.5));
        let list: Hint = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(list.for_channel(1), Some(2.0));
        assert_eq!(list.for_channel(2), None);
    }

    #[test]
    fn stage_reports_skipped_channels() {
        let time = axis();
        let trace = Trace::single(time.clone(), time).unwrap();
        let mut stage = LocatorStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let output = stage.execute(StageInput::new(trace)).unwrap();
        assert!(output.metadata.candidates[0].is_empty());
        assert_eq!(stage.metrics().snapshot().skipped, 1);
        stage.cleanup();
    }
}
