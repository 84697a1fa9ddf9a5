pub mod peak;
pub mod trace;

pub use peak::{ChannelPeaks, FittedPeak, PeakCandidate, Side, SideCandidate};
pub use trace::{Trace, TraceError};
