//! Signal-processing core for chromatographic and mass-spectrometric traces.
//!
//! The pipeline runs baseline estimation, peak boundary location and
//! exponential-Gaussian-hybrid fitting over the channels of a [`Trace`].
//! Each step is available as a pure function here and as a
//! [`ProcessingStage`] under [`processing`].

pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

use ndarray::{Array2, ArrayView2};

pub use interface::{ChannelPeaks, FittedPeak, PeakCandidate, Side, SideCandidate, Trace};
pub use prelude::{ProcessingStage, StageConfig, StageInput, StageOutput};
pub use processing::{BaselineConfig, LocatorConfig};

/// Asymmetric least-squares baseline for every column of `intensity`.
pub fn estimate_baseline(intensity: ArrayView2<f64>, config: &BaselineConfig) -> Array2<f64> {
    processing::BaselineEstimator::new(config)
        .estimate(intensity)
        .baseline
}

/// Boundary candidates for the strongest maxima of each channel.
pub fn locate_peaks(trace: &Trace, config: &LocatorConfig) -> ChannelPeaks<PeakCandidate> {
    processing::PeakLocator::new(config).locate(trace)
}

/// EGH fits for the located candidates of each channel.
pub fn fit_peaks(
    trace: &Trace,
    candidates: &ChannelPeaks<PeakCandidate>,
) -> ChannelPeaks<FittedPeak> {
    processing::PeakFitter::new().fit(trace, candidates)
}
