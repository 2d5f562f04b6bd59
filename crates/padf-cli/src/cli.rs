use clap::{Args, Parser, Subcommand, ValueEnum};
use modelpadf::core::models::histogram::PadfMode;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Andrew Martin, Jack Binns",
    version,
    about = "padf - Compute model pair-angle distribution functions (PADF) from atomic crystal structures.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of parallel correlation workers (atoms processed per loop).
    /// Overrides `execution.workers` from the config file.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a PADF calculation over a subject structure and its extended environment.
    Run(RunArgs),
    /// Summarize the results of a finished run.
    Report(ReportArgs),
}

/// Histogram mode accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// The r = r' slice: a (r, theta) histogram.
    #[value(alias = "rrprime")]
    Slice,
    /// The full (r, r', theta) volume.
    #[value(alias = "stm")]
    Full,
}

impl From<ModeArg> for PadfMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Slice => PadfMode::Slice,
            ModeArg::Full => PadfMode::Full,
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Subject atoms (correlation centers), usually the asymmetric unit (.cif or .xyz).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub subject: PathBuf,

    /// Extended environment atoms (.xyz or .cif).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub extended: PathBuf,

    /// Directory that receives the histograms and logs of the run.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name prefixed to every output file. Defaults to the subject file stem.
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    // --- Histogram Overrides ---
    /// Override the histogram mode.
    #[arg(short, long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Override the probe radius in Angstroms.
    #[arg(short = 'r', long, value_name = "FLOAT")]
    pub probe_radius: Option<f64>,

    /// Override `sampling.four-body` from the config file.
    #[command(flatten)]
    pub four_body: FourBodyFlags,

    // --- Run Control Overrides ---
    /// Enable convergence monitoring and stop once successive loops reach this cosine similarity.
    #[arg(short = 't', long, value_name = "FLOAT")]
    pub convergence_target: Option<f64>,

    /// Seed for shuffling and subsampling the subject atoms.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Keep per-worker and per-loop histograms after the run.
    #[arg(long)]
    pub keep_intermediates: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S histogram.radial-bin-width=0.05
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// A group to handle mutually exclusive boolean flags for the four-body term.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct FourBodyFlags {
    /// Force the four-body correlation term on.
    #[arg(long)]
    pub four_body: bool,
    /// Force the four-body correlation term off.
    #[arg(long)]
    pub no_four_body: bool,
}

/// Arguments for the `report` subcommand.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Output directory of the finished run.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Name of the run.
    #[arg(short, long, required = true, value_name = "NAME")]
    pub name: String,

    /// Mode of the run. Detected from the saved total histogram when omitted.
    #[arg(short, long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,
}
