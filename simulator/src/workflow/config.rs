use anyhow::Context;
use chromacore::prelude::StageConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub stages: StageConfig,
    pub generator: GeneratorConfig,
}

/// Command-line values that take precedence over the YAML file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub channels: Option<usize>,
    pub samples: Option<usize>,
    pub seed: Option<u64>,
    pub keep_baseline: bool,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(channels) = overrides.channels {
            self.generator.channels = channels;
        }
        if let Some(samples) = overrides.samples {
            self.generator.samples = samples;
        }
        if let Some(seed) = overrides.seed {
            self.generator.seed = seed;
        }
        if overrides.keep_baseline {
            self.stages.subtract_baseline = false;
        }
        self
    }

    pub fn to_stage_config(&self) -> StageConfig {
        self.stages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromacore::processing::Hint;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn overrides_replace_generator_fields() {
        let cfg = WorkflowConfig::default().with_overrides(&Overrides {
            channels: Some(4),
            samples: Some(512),
            seed: None,
            keep_baseline: true,
        });
        assert_eq!(cfg.generator.channels, 4);
        assert_eq!(cfg.generator.samples, 512);
        assert!(!cfg.to_stage_config().subtract_baseline);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"stages:\n  baseline:\n    smoothness: 1.0e8\n    asymmetry: 1.0e-6\n  locator:\n    center: [4.0, 6.0]\n    width: 2.0\ngenerator:\n  channels: 2\n  components:\n    - center: 4.0\n      height: 20.0\n      width: 0.3\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.stages.baseline.smoothness, 1e8);
        assert_eq!(cfg.stages.baseline.max_iterations, 10);
        assert_eq!(cfg.stages.locator.center, Some(Hint::PerChannel(vec![4.0, 6.0])));
        assert_eq!(cfg.stages.locator.width, Some(Hint::Uniform(2.0)));
        assert!(cfg.stages.subtract_baseline);
        assert_eq!(cfg.generator.components[0].decay, 0.0);
        assert_eq!(cfg.generator.samples, 1001);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = WorkflowConfig::load("/nonexistent/workflow.yaml").unwrap_err();
        assert!(format!("{err}").contains("/nonexistent/workflow.yaml"));
    }
}
