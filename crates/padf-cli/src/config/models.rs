use crate::error::{CliError, Result};
use modelpadf::core::io::cif::{CifOptions, UnitCell};
use modelpadf::engine::config::{
    ConvergenceConfig, ExecutionConfig, HistogramConfig, PadfConfig, SamplingConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub struct AppConfig {
    pub subject_path: PathBuf,
    pub extended_path: PathBuf,
    pub output_dir: PathBuf,
    pub name: String,
    pub cif_options: CifOptions,
    pub core_config: PadfConfig,
}

/// The resolved parameters of a run, as written next to its results.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ParameterLog<'a> {
    name: &'a str,
    version: &'static str,
    subject: &'a Path,
    extended: &'a Path,
    output: &'a Path,
    include_hydrogens: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_cell: Option<&'a UnitCell>,
    histogram: &'a HistogramConfig,
    sampling: &'a SamplingConfig,
    execution: &'a ExecutionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    convergence: Option<&'a ConvergenceConfig>,
}

impl AppConfig {
    pub fn parameter_log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_parameters.toml", self.name))
    }

    /// Renders the resolved configuration as TOML.
    pub fn parameter_log(&self) -> Result<String> {
        let log = ParameterLog {
            name: &self.name,
            version: env!("CARGO_PKG_VERSION"),
            subject: &self.subject_path,
            extended: &self.extended_path,
            output: &self.output_dir,
            include_hydrogens: self.cif_options.include_hydrogens,
            unit_cell: self.cif_options.unit_cell.as_ref(),
            histogram: &self.core_config.histogram,
            sampling: &self.core_config.sampling,
            execution: &self.core_config.execution,
            convergence: self.core_config.convergence.as_ref(),
        };
        toml::to_string_pretty(&log)
            .map_err(|e| CliError::Config(format!("Failed to render parameter log: {}", e)))
    }
}
