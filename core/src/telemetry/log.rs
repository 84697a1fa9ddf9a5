use log::{info, warn};

/// Tags stage summaries with the emitting component.
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.component, message);
    }

    pub fn degraded(&self, channel: usize, reason: &str) {
        warn!("[{}] channel {}: {}", self.component, channel, reason);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("chromacore")
    }
}
