use crate::error::{CliError, Result};
use modelpadf::core::io::cif::UnitCell;
use modelpadf::engine::config::{FailurePolicy, PadfMode};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileHistogramConfig {
    pub probe_radius: Option<f64>,
    pub radial_bin_width: Option<f64>,
    pub angular_bin_width: Option<f64>,
    pub radial_power: Option<f64>,
    pub mode: Option<PadfMode>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSamplingConfig {
    pub four_body: Option<bool>,
    pub subject_sample_size: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileExecutionConfig {
    pub workers: Option<usize>,
    pub max_retries: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
    pub keep_intermediates: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConvergenceConfig {
    pub target: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileStructureConfig {
    pub name: Option<String>,
    pub include_hydrogens: Option<bool>,
    pub unit_cell: Option<UnitCell>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub histogram: Option<FileHistogramConfig>,
    pub sampling: Option<FileSamplingConfig>,
    pub execution: Option<FileExecutionConfig>,
    pub convergence: Option<FileConvergenceConfig>,
    pub structure: Option<FileStructureConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
