use serde::{Deserialize, Serialize};

/// One exponential-Gaussian-hybrid peak in a synthetic trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeakComponent {
    pub center: f64,
    pub height: f64,
    pub width: f64,
    #[serde(default)]
    pub decay: f64,
}

/// Straight-line drift added under every channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Ramp {
    pub offset: f64,
    pub slope: f64,
}

pub fn time_axis(start: f64, end: f64, samples: usize) -> Vec<f64> {
    if samples < 2 {
        return vec![start; samples];
    }
    let step = (end - start) / (samples - 1) as f64;
    (0..samples).map(|i| start + i as f64 * step).collect()
}

/// Noise-free EGH samples; zero where the model is undefined.
pub fn peak(time: &[f64], component: &PeakComponent, shift: f64) -> Vec<f64> {
    let center = component.center + shift;
    let spread = 2.0 * component.width * component.width;
    time.iter()
        .map(|&t| {
            let offset = t - center;
            let denominator = spread + component.decay * offset;
            if denominator > 0.0 {
                component.height * (-(offset * offset) / denominator).exp()
            } else {
                0.0
            }
        })
        .collect()
}

pub fn ramp(time: &[f64], ramp: &Ramp) -> Vec<f64> {
    time.iter().map(|&t| ramp.offset + ramp.slope * t).collect()
}
