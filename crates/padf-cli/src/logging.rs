use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{Layer, Registry, filter::LevelFilter, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console level: warnings by default, one level more per `-v`, errors only with `--quiet`.
pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// The run log always keeps per-loop progress, even when the console is quiet.
pub fn run_log_level(console: LevelFilter) -> LevelFilter {
    console.max(LevelFilter::INFO)
}

fn console_layer(level: LevelFilter) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(level)
        .boxed()
}

/// Plain-text events tagged with the `padf-worker-*` thread that emitted them.
fn run_log_layer(file: File, level: LevelFilter) -> BoxedLayer {
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_filter(level)
        .boxed()
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let console = level_for(verbosity, quiet);
    let mut layers = vec![console_layer(console)];

    if let Some(path) = log_file {
        let file = File::create(path).map_err(CliError::Io)?;
        layers.push(run_log_layer(file, run_log_level(console)));
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(())
}
