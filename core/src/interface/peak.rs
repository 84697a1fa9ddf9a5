use serde::{Deserialize, Serialize};

/// Which boundary of a peak seeded a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

/// Peak geometry measured from one side's boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SideCandidate {
    pub center: f64,
    pub height: f64,
    pub width: f64,
    /// Distance from `center` to the left boundary.
    pub a: f64,
    /// Distance from `center` to the right boundary.
    pub b: f64,
    /// Fraction of `height` at which both boundaries were measured.
    pub alpha: f64,
}

impl SideCandidate {
    /// Replaces negative edge distances with half the width and an `alpha`
    /// outside `(0, 1)` with one half.
    pub fn sanitized(mut self) -> Self {
        if self.a < 0.0 || !self.a.is_finite() {
            self.a = self.width / 2.0;
        }
        if self.b < 0.0 || !self.b.is_finite() {
            self.b = self.width / 2.0;
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            self.alpha = 0.5;
        }
        self
    }
}

/// Boundary estimate for one local maximum, seeded from each side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeakCandidate {
    /// Sample index of the local maximum.
    pub apex_index: usize,
    pub left: SideCandidate,
    pub right: SideCandidate,
}

impl PeakCandidate {
    pub fn side(&self, side: Side) -> &SideCandidate {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Exponential-Gaussian-hybrid fit for one peak.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FittedPeak {
    pub time: f64,
    pub height: f64,
    pub width: f64,
    pub decay: f64,
    pub area: f64,
    /// Model values over the full time axis.
    pub fit: Vec<f64>,
    /// RMS residual near the apex, as a percentage of the peak height.
    pub error_pct: f64,
    /// Candidate side that produced the retained model.
    pub side: Side,
}

/// Per-channel results; an empty entry means nothing usable was found.
pub type ChannelPeaks<T> = Vec<Vec<T>>;
