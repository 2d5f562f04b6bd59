use crate::core::models::histogram::BinGrid;
pub use crate::core::models::histogram::PadfMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// What to do with a worker whose accumulation still fails after its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Drop the failed contribution from its loop and keep going.
    #[default]
    Exclude,
    /// Abort the whole run.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HistogramConfig {
    pub probe_radius: f64,
    pub radial_bin_width: f64,
    /// Angular bin width in degrees.
    pub angular_bin_width: f64,
    pub radial_power: f64,
    pub mode: PadfMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SamplingConfig {
    pub four_body: bool,
    /// Number of subject atoms drawn at random; `None` uses all of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_sample_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionConfig {
    pub worker_count: usize,
    pub max_retries: usize,
    pub failure_policy: FailurePolicy,
    pub keep_intermediates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConvergenceConfig {
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PadfConfig {
    pub histogram: HistogramConfig,
    pub sampling: SamplingConfig,
    pub execution: ExecutionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceConfig>,
}

impl PadfConfig {
    pub fn bin_grid(&self) -> BinGrid {
        BinGrid::new(
            self.histogram.probe_radius,
            self.histogram.radial_bin_width,
            self.histogram.angular_bin_width,
        )
    }
}

const DEFAULT_RADIAL_POWER: f64 = 2.0;
const DEFAULT_MAX_RETRIES: usize = 1;

#[derive(Default)]
pub struct PadfConfigBuilder {
    probe_radius: Option<f64>,
    radial_bin_width: Option<f64>,
    angular_bin_width: Option<f64>,
    radial_power: Option<f64>,
    mode: Option<PadfMode>,
    four_body: Option<bool>,
    subject_sample_size: Option<usize>,
    seed: Option<u64>,
    worker_count: Option<usize>,
    max_retries: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    keep_intermediates: Option<bool>,
    convergence_target: Option<f64>,
}

impl PadfConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_radius(mut self, radius: f64) -> Self {
        self.probe_radius = Some(radius);
        self
    }
    pub fn radial_bin_width(mut self, width: f64) -> Self {
        self.radial_bin_width = Some(width);
        self
    }
    pub fn angular_bin_width(mut self, degrees: f64) -> Self {
        self.angular_bin_width = Some(degrees);
        self
    }
    pub fn radial_power(mut self, power: f64) -> Self {
        self.radial_power = Some(power);
        self
    }
    pub fn mode(mut self, mode: PadfMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn four_body(mut self, enabled: bool) -> Self {
        self.four_body = Some(enabled);
        self
    }
    pub fn subject_sample_size(mut self, size: Option<usize>) -> Self {
        self.subject_sample_size = size;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }
    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = Some(keep);
        self
    }
    pub fn convergence_target(mut self, target: Option<f64>) -> Self {
        self.convergence_target = target;
        self
    }

    pub fn build(self) -> Result<PadfConfig, ConfigError> {
        let histogram = HistogramConfig {
            probe_radius: self
                .probe_radius
                .ok_or(ConfigError::MissingParameter("probe_radius"))?,
            radial_bin_width: self
                .radial_bin_width
                .ok_or(ConfigError::MissingParameter("radial_bin_width"))?,
            angular_bin_width: self
                .angular_bin_width
                .ok_or(ConfigError::MissingParameter("angular_bin_width"))?,
            radial_power: self.radial_power.unwrap_or(DEFAULT_RADIAL_POWER),
            mode: self.mode.ok_or(ConfigError::MissingParameter("mode"))?,
        };
        let sampling = SamplingConfig {
            four_body: self.four_body.unwrap_or(false),
            subject_sample_size: self.subject_sample_size,
            seed: self.seed,
        };
        let execution = ExecutionConfig {
            worker_count: self
                .worker_count
                .ok_or(ConfigError::MissingParameter("worker_count"))?,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            failure_policy: self.failure_policy.unwrap_or_default(),
            keep_intermediates: self.keep_intermediates.unwrap_or(false),
        };
        let convergence = self
            .convergence_target
            .map(|target| ConvergenceConfig { target });

        let config = PadfConfig {
            histogram,
            sampling,
            execution,
            convergence,
        };
        validate(&config)?;
        Ok(config)
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn positive_finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a positive number, got {}", value)))
    }
}

fn validate(config: &PadfConfig) -> Result<(), ConfigError> {
    let histogram = &config.histogram;
    positive_finite("probe_radius", histogram.probe_radius)?;
    positive_finite("radial_bin_width", histogram.radial_bin_width)?;
    positive_finite("angular_bin_width", histogram.angular_bin_width)?;

    if histogram.radial_bin_width > histogram.probe_radius {
        return Err(invalid(
            "radial_bin_width",
            "must not exceed the probe radius",
        ));
    }
    if histogram.angular_bin_width > 180.0 {
        return Err(invalid("angular_bin_width", "must not exceed 180 degrees"));
    }
    if !histogram.radial_power.is_finite() {
        return Err(invalid("radial_power", "must be finite"));
    }
    if config.sampling.subject_sample_size == Some(0) {
        return Err(invalid(
            "subject_sample_size",
            "must be at least 1 (omit it to use every subject atom)",
        ));
    }
    if config.execution.worker_count == 0 {
        return Err(invalid("worker_count", "must be at least 1"));
    }
    if let Some(convergence) = &config.convergence {
        if !convergence.target.is_finite() {
            return Err(invalid("convergence_target", "must be finite"));
        }
    }
    Ok(())
}
