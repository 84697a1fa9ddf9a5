//! Exponential-Gaussian hybrid peak model (Lan & Jorgenson 2001).
//!
//! `y(x) = h · exp(-(x - c)² / (2w² + e·(x - c)))`, defined only where the
//! denominator is positive.

use std::f64::consts::{FRAC_PI_2, PI};

/// Polynomial in the asymmetry angle relating the closed-form area estimate
/// to the numerical integral.
const AREA_COEFFICIENTS: [f64; 7] = [
    4.000000, -6.293724, 9.232834, -11.342910, 9.123978, -4.173753, 0.827797,
];

/// Fitted values below `h · MIN_FRACTION` or above `h · MAX_FRACTION` are
/// zeroed.
const MIN_FRACTION: f64 = 1e-6;
const MAX_FRACTION: f64 = 2.0;

/// Gaussian width from edge distances `a`, `b` measured at height fraction
/// `alpha`.
pub fn width(a: f64, b: f64, alpha: f64) -> f64 {
    (-(a * b) / (2.0 * alpha.ln())).sqrt()
}

/// Exponential decay from edge distances `a`, `b` measured at height
/// fraction `alpha`.
pub fn decay(a: f64, b: f64, alpha: f64) -> f64 {
    -(b - a) / alpha.ln()
}

/// Model value at `x`; zero where the denominator is not positive or the
/// value falls outside the sane band.
pub fn evaluate(x: f64, center: f64, height: f64, width: f64, decay: f64) -> f64 {
    let offset = x - center;
    let denominator = 2.0 * width * width + decay * offset;
    if !(denominator > 0.0) {
        return 0.0;
    }
    let value = height * (-(offset * offset) / denominator).exp();
    if value < height * MIN_FRACTION || value > height * MAX_FRACTION || !value.is_finite() {
        0.0
    } else {
        value
    }
}

pub fn curve(time: &[f64], center: f64, height: f64, width: f64, decay: f64) -> Vec<f64> {
    time.iter()
        .map(|&x| evaluate(x, center, height, width, decay))
        .collect()
}

/// Correction factor `e0(θ)` for `θ = atan(|e| / w)`.
pub fn area_factor(theta: f64) -> f64 {
    AREA_COEFFICIENTS
        .iter()
        .rev()
        .fold(0.0, |acc, &coef| acc * theta + coef)
}

/// Closed-form peak area `h · (w·√(π/8) + |e|) · e0(θ)`.
pub fn area(height: f64, width: f64, decay: f64) -> f64 {
    let theta = if width > 0.0 {
        (decay.abs() / width).atan()
    } else {
        FRAC_PI_2
    };
    height * (width * (PI / 8.0).sqrt() + decay.abs()) * area_factor(theta)
}
