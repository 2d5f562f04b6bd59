use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use modelpadf::core::io::cif::CifOptions;
use modelpadf::engine::config as core_config;
use std::path::Path;
use std::str::FromStr;

pub fn build_config(args: &RunArgs, threads: Option<usize>) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let histogram_file = file_config.histogram.take().unwrap_or_default();
    let sampling_file = file_config.sampling.take().unwrap_or_default();
    let execution_file = file_config.execution.take().unwrap_or_default();
    let convergence_file = file_config.convergence.take().unwrap_or_default();
    let structure_file = file_config.structure.take().unwrap_or_default();

    let mode = args
        .mode
        .map(Into::into)
        .or(histogram_file.mode)
        .unwrap_or(defaults.mode);
    let probe_radius = args
        .probe_radius
        .or(histogram_file.probe_radius)
        .unwrap_or(defaults.probe_radius);

    let four_body = match (args.four_body.four_body, args.four_body.no_four_body) {
        (true, false) => true,
        (false, true) => false,
        _ => sampling_file.four_body.unwrap_or(defaults.four_body),
    };

    let worker_count = threads
        .or(execution_file.workers)
        .unwrap_or(defaults.workers);
    let keep_intermediates =
        args.keep_intermediates || execution_file.keep_intermediates.unwrap_or(false);

    let core_config = core_config::PadfConfigBuilder::new()
        .probe_radius(probe_radius)
        .radial_bin_width(
            histogram_file
                .radial_bin_width
                .unwrap_or(defaults.radial_bin_width),
        )
        .angular_bin_width(
            histogram_file
                .angular_bin_width
                .unwrap_or(defaults.angular_bin_width),
        )
        .radial_power(histogram_file.radial_power.unwrap_or(defaults.radial_power))
        .mode(mode)
        .four_body(four_body)
        .subject_sample_size(sampling_file.subject_sample_size)
        .seed(args.seed.or(sampling_file.seed))
        .worker_count(worker_count)
        .max_retries(execution_file.max_retries.unwrap_or(defaults.max_retries))
        .failure_policy(
            execution_file
                .failure_policy
                .unwrap_or(defaults.failure_policy),
        )
        .keep_intermediates(keep_intermediates)
        .convergence_target(args.convergence_target.or(convergence_file.target))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let name = match args.name.clone().or(structure_file.name) {
        Some(name) => name,
        None => default_name(&args.subject)?,
    };

    let cif_options = CifOptions {
        unit_cell: structure_file.unit_cell,
        include_hydrogens: structure_file.include_hydrogens.unwrap_or(false),
    };

    Ok(AppConfig {
        subject_path: args.subject.clone(),
        extended_path: args.extended.clone(),
        output_dir: args.output.clone(),
        name,
        cif_options,
        core_config,
    })
}

fn default_name(subject: &Path) -> Result<String> {
    subject
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::Argument(format!(
                "Cannot derive a run name from {:?}; pass --name explicitly.",
                subject
            ))
        })
}

fn parse_value<T: FromStr>(key: &str, value_str: &str, kind: &str) -> Result<T> {
    value_str.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value_str))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let parts: Vec<_> = kv_pair.splitn(2, '=').collect();
        if parts.len() != 2 {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        }
        let key = parts[0].trim();
        let value_str = parts[1];

        match key {
            "histogram.probe-radius" => {
                config
                    .histogram
                    .get_or_insert_with(Default::default)
                    .probe_radius = Some(parse_value(key, value_str, "float")?);
            }
            "histogram.radial-bin-width" => {
                config
                    .histogram
                    .get_or_insert_with(Default::default)
                    .radial_bin_width = Some(parse_value(key, value_str, "float")?);
            }
            "histogram.angular-bin-width" => {
                config
                    .histogram
                    .get_or_insert_with(Default::default)
                    .angular_bin_width = Some(parse_value(key, value_str, "float")?);
            }
            "histogram.radial-power" => {
                config
                    .histogram
                    .get_or_insert_with(Default::default)
                    .radial_power = Some(parse_value(key, value_str, "float")?);
            }
            "histogram.mode" => {
                let mode = match value_str.trim() {
                    "slice" | "rrprime" => core_config::PadfMode::Slice,
                    "full" | "stm" => core_config::PadfMode::Full,
                    other => {
                        return Err(CliError::Config(format!(
                            "Invalid mode for {}: '{}' (expected slice/rrprime or full/stm)",
                            key, other
                        )));
                    }
                };
                config.histogram.get_or_insert_with(Default::default).mode = Some(mode);
            }
            "sampling.four-body" => {
                config
                    .sampling
                    .get_or_insert_with(Default::default)
                    .four_body = Some(parse_value(key, value_str, "boolean")?);
            }
            "sampling.subject-sample-size" => {
                config
                    .sampling
                    .get_or_insert_with(Default::default)
                    .subject_sample_size = Some(parse_value(key, value_str, "integer")?);
            }
            "sampling.seed" => {
                config.sampling.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "execution.workers" => {
                config.execution.get_or_insert_with(Default::default).workers =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "execution.max-retries" => {
                config
                    .execution
                    .get_or_insert_with(Default::default)
                    .max_retries = Some(parse_value(key, value_str, "integer")?);
            }
            "execution.failure-policy" => {
                let policy = match value_str.trim() {
                    "exclude" => core_config::FailurePolicy::Exclude,
                    "abort" => core_config::FailurePolicy::Abort,
                    other => {
                        return Err(CliError::Config(format!(
                            "Invalid failure policy for {}: '{}' (expected exclude or abort)",
                            key, other
                        )));
                    }
                };
                config
                    .execution
                    .get_or_insert_with(Default::default)
                    .failure_policy = Some(policy);
            }
            "execution.keep-intermediates" => {
                config
                    .execution
                    .get_or_insert_with(Default::default)
                    .keep_intermediates = Some(parse_value(key, value_str, "boolean")?);
            }
            "convergence.target" => {
                config.convergence.get_or_insert_with(Default::default).target =
                    Some(parse_value(key, value_str, "float")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
