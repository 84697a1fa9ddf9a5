pub mod baseline;
pub mod egh;
pub mod fitter;
pub mod locator;

pub use baseline::{
    BaselineConfig, BaselineEstimate, BaselineEstimator, BaselineStage, ChannelReport,
};
pub use fitter::{FitterStage, PeakFitter};
pub use locator::{Hint, LocatorConfig, LocatorStage, PeakLocator, SearchBounds};
