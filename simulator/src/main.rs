use anyhow::Context;
use clap::Parser;
use generator::profile::build_trace_from_config;
use log::info;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use workflow::config::{Overrides, WorkflowConfig};
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline driver for the chromatography peak pipeline")]
struct Args {
    /// Generate one synthetic batch, run the pipeline and write a report
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long)]
    channels: Option<usize>,
    #[arg(long)]
    samples: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Locate and fit on the raw trace instead of the baseline-corrected one
    #[arg(long, default_value_t = false)]
    no_subtract: bool,
    /// Where the JSON report is written
    #[arg(long, default_value = "tools/data/peak_report.json")]
    report: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let base_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::default()
    };
    let workflow_config = base_config.with_overrides(&Overrides {
        channels: args.channels,
        samples: args.samples,
        seed: args.seed,
        keep_baseline: args.no_subtract,
    });

    if !args.offline {
        let rendered =
            serde_yaml::to_string(&workflow_config).context("rendering workflow config")?;
        println!("{rendered}");
        info!("dry run; pass --offline to process a synthetic batch");
        return Ok(());
    }

    let trace = build_trace_from_config(&workflow_config.generator)?;
    let runner = Runner::new(workflow_config);
    let result = runner.execute(&trace)?;

    println!(
        "Offline run -> channels {}, peaks {}",
        result.channels,
        result.peak_count()
    );
    for peak in &result.peaks {
        println!(
            "  ch{} t={:.4} h={:.4} w={:.4} e={:.4} area={:.4} error={:.3}% ({:?})",
            peak.channel,
            peak.time,
            peak.height,
            peak.width,
            peak.decay,
            peak.area,
            peak.error_pct,
            peak.side
        );
    }

    if let Some(parent) = args.report.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let file = File::create(&args.report)
        .with_context(|| format!("creating report {}", args.report.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &result)
        .with_context(|| format!("writing report {}", args.report.display()))?;
    info!("report written to {}", args.report.display());

    Ok(())
}
