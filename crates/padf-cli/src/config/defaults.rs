use modelpadf::engine::config::{FailurePolicy, PadfMode};

pub struct DefaultsConfig {
    pub probe_radius: f64,
    pub radial_bin_width: f64,
    pub angular_bin_width: f64,
    pub radial_power: f64,
    pub mode: PadfMode,
    pub four_body: bool,
    pub workers: usize,
    pub max_retries: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            probe_radius: 10.0,
            radial_bin_width: 0.1,
            angular_bin_width: 2.0,
            radial_power: 2.0,
            mode: PadfMode::Slice,
            four_body: true,
            workers: 2,
            max_retries: 1,
            failure_policy: FailurePolicy::Exclude,
        }
    }
}
