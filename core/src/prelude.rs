use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::interface::{ChannelPeaks, FittedPeak, PeakCandidate, Trace, TraceError};
use crate::processing::baseline::BaselineConfig;
use crate::processing::locator::LocatorConfig;

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub baseline: BaselineConfig,
    pub locator: LocatorConfig,
    /// Whether the baseline stage hands the corrected trace downstream.
    pub subtract_baseline: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            baseline: BaselineConfig::default(),
            locator: LocatorConfig::default(),
            subtract_baseline: true,
        }
    }
}

/// Input payload for a processing stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub trace: Trace,
    /// Candidates from an earlier locator stage; empty when not yet located.
    pub candidates: ChannelPeaks<PeakCandidate>,
}

impl StageInput {
    pub fn new(trace: Trace) -> Self {
        Self {
            trace,
            candidates: Vec::new(),
        }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub trace: Trace,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub baseline: Option<Array2<f64>>,
    pub candidates: ChannelPeaks<PeakCandidate>,
    pub peaks: ChannelPeaks<FittedPeak>,
    pub notes: Vec<String>,
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid trace: {0}")]
    Trace(#[from] TraceError),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing the chained trace-processing stages.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}
