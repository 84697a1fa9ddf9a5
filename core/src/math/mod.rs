pub mod matrix;
pub mod spline;
pub mod stats;

pub use matrix::{second_difference_penalty, BandedMatrix, CholeskyFactor, MathError, MathResult};
pub use spline::CubicSpline;
pub use stats::StatsHelper;
