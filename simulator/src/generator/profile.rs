use anyhow::Context;
use chromacore::Trace;
use ndarray::{aview1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::template::{peak, ramp, time_axis, PeakComponent, Ramp};

/// Configuration for generating synthetic chromatograms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub start: f64,
    pub end: f64,
    pub samples: usize,
    pub channels: usize,
    /// Center offset applied per channel index.
    pub channel_shift: f64,
    pub components: Vec<PeakComponent>,
    pub ramp: Ramp,
    pub noise: f64,
    pub seed: u64,
    pub description: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 10.0,
            samples: 1001,
            channels: 1,
            channel_shift: 0.0,
            components: vec![PeakComponent {
                center: 5.0,
                height: 100.0,
                width: 0.5,
                decay: 0.0,
            }],
            ramp: Ramp {
                offset: 0.0,
                slope: 0.1,
            },
            noise: 0.0,
            seed: 0,
            description: None,
        }
    }
}

impl GeneratorConfig {
    fn normalized_samples(&self) -> usize {
        self.samples.max(3)
    }

    fn normalized_channels(&self) -> usize {
        self.channels.max(1)
    }
}

pub fn build_trace_from_config(config: &GeneratorConfig) -> anyhow::Result<Trace> {
    let samples = config.normalized_samples();
    let channels = config.normalized_channels();
    let time = time_axis(config.start, config.end, samples);
    let drift = ramp(&time, &config.ramp);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut intensity = Array2::zeros((samples, channels));

    for (channel, mut column) in intensity.columns_mut().into_iter().enumerate() {
        let shift = config.channel_shift * channel as f64;
        column.assign(&aview1(&drift));
        for component in &config.components {
            for (slot, value) in column.iter_mut().zip(peak(&time, component, shift)) {
                *slot += value;
            }
        }
        if config.noise > 0.0 {
            for slot in column.iter_mut() {
                *slot += rng.gen_range(-config.noise..config.noise);
            }
        }
    }

    Trace::new(time, intensity).context("assembling synthetic trace")
}
