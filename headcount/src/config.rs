// THEORY:
// All tunables of the engine in one place. They are loaded from TOML or built in code,
// and validated once before a driver is constructed. The defaults
// reproduce the reference tuning: a 5-frame window, a 5-level intensity deviation
// threshold, 15000-pixel people and a 5x5 elliptical opening.

use crate::annotate::DisplayMode;
use crate::core_modules::morphology::{MorphStep, StructuringElement, StructuringShape};
use crate::core_modules::region_labeller::LabelConnectivity;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Configuration for the `PipelineDriver`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of grayscale frames kept in the sliding window (W).
    pub window_size: usize,
    /// Temporal standard deviation, in intensity levels, at or above which a pixel is
    /// foreground. Compared internally as variance against its square.
    pub background_threshold: f64,
    /// Minimum region area in pixels for a region to count as a person. Inclusive.
    pub min_human_area: u32,
    /// Pixel adjacency used by the connected-component labeller.
    pub connectivity: LabelConnectivity,
    pub morphology: MorphologyConfig,
    pub execution: ExecutionConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MorphologyConfig {
    /// Operations applied to the raw mask, in order. Erode then dilate is an opening.
    pub steps: Vec<MorphStep>,
    pub shape: StructuringShape,
    /// Side length of the structuring element in pixels.
    pub size: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Classify mask rows in parallel.
    pub parallel: bool,
    /// Worker threads for parallel classification; 0 picks one per logical CPU.
    pub worker_threads: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            background_threshold: 5.0,
            min_human_area: 15_000,
            connectivity: LabelConnectivity::Eight,
            morphology: MorphologyConfig::default(),
            execution: ExecutionConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            steps: vec![MorphStep::Erode, MorphStep::Dilate],
            shape: StructuringShape::Ellipse,
            size: 5,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: 0,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Annotated,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl MorphologyConfig {
    pub fn structuring_element(&self) -> StructuringElement {
        StructuringElement::new(self.shape, self.size)
    }
}

impl ExecutionConfig {
    /// The thread count the classification pool should use.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

impl PipelineConfig {
    /// Reads, parses and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the statistics or morphology cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if !self.background_threshold.is_finite() || self.background_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "background_threshold must be a positive number, got {}",
                self.background_threshold
            )));
        }
        if self.morphology.size == 0 {
            return Err(ConfigError::Invalid(
                "morphology.size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
