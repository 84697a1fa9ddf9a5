use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use chromacore::interface::{FittedPeak, Side, Trace};
use chromacore::prelude::{ProcessingStage, StageInput};
use chromacore::processing::{BaselineStage, FitterStage, LocatorStage};
use chromacore::telemetry::MetricsSnapshot;
use serde::Serialize;

/// Fitted peak without its curve samples.
#[derive(Debug, Clone, Serialize)]
pub struct PeakSummary {
    pub channel: usize,
    pub time: f64,
    pub height: f64,
    pub width: f64,
    pub decay: f64,
    pub area: f64,
    pub error_pct: f64,
    pub side: Side,
}

impl PeakSummary {
    fn new(channel: usize, peak: &FittedPeak) -> Self {
        Self {
            channel,
            time: peak.time,
            height: peak.height,
            width: peak.width,
            decay: peak.decay,
            area: peak.area,
            error_pct: peak.error_pct,
            side: peak.side,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub baseline: MetricsSnapshot,
    pub locator: MetricsSnapshot,
    pub fitter: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub channels: usize,
    pub peaks: Vec<PeakSummary>,
    pub notes: Vec<String>,
    pub metrics: StageMetrics,
}

impl WorkflowResult {
    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, trace: &Trace) -> anyhow::Result<WorkflowResult> {
        let stage_config = self.config.to_stage_config();
        let mut notes = Vec::new();

        let mut baseline_stage = BaselineStage::new();
        baseline_stage
            .initialize(&stage_config)
            .context("initializing baseline stage")?;
        let baseline_output = baseline_stage
            .execute(StageInput::new(trace.clone()))
            .context("executing baseline stage")?;
        let baseline_metrics = baseline_stage.metrics().snapshot();
        baseline_stage.cleanup();
        notes.extend(baseline_output.metadata.notes);

        let mut locator_stage = LocatorStage::new();
        locator_stage
            .initialize(&stage_config)
            .context("initializing locator stage")?;
        let locator_output = locator_stage
            .execute(StageInput::new(baseline_output.trace))
            .context("executing locator stage")?;
        let locator_metrics = locator_stage.metrics().snapshot();
        locator_stage.cleanup();
        notes.extend(locator_output.metadata.notes);

        let mut fitter_stage = FitterStage::new();
        fitter_stage
            .initialize(&stage_config)
            .context("initializing fitter stage")?;
        let fitter_output = fitter_stage
            .execute(StageInput {
                trace: locator_output.trace,
                candidates: locator_output.metadata.candidates,
            })
            .context("executing fitter stage")?;
        let fitter_metrics = fitter_stage.metrics().snapshot();
        fitter_stage.cleanup();
        notes.extend(fitter_output.metadata.notes);

        let peaks = fitter_output
            .metadata
            .peaks
            .iter()
            .enumerate()
            .flat_map(|(channel, found)| found.iter().map(move |p| PeakSummary::new(channel, p)))
            .collect();

        Ok(WorkflowResult {
            channels: trace.channels(),
            peaks,
            notes,
            metrics: StageMetrics {
                baseline: baseline_metrics,
                locator: locator_metrics,
                fitter: fitter_metrics,
            },
        })
    }
}
