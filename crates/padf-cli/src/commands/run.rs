use crate::cli::RunArgs;
use crate::commands::report::format_similarity_table;
use crate::config::builder::build_config;
use crate::config::models::AppConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use modelpadf::{
    core::{io::read_coordinates, models::atom::Structure},
    engine::{error::EngineError, progress::ProgressReporter, sink::NpyDirectorySink},
    workflows::padf::{self, PadfResult},
};
use std::path::Path;
use tracing::{info, warn};

pub async fn run(args: RunArgs, threads: Option<usize>) -> Result<()> {
    info!("Resolving configuration from defaults, file and CLI arguments...");
    let app = build_config(&args, threads)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting PADF calculation '{}'...", app.name);
    let (result, sink) = tokio::task::block_in_place(|| execute(&app, &reporter))?;

    print_summary(&app, &result, &sink);
    Ok(())
}

fn load_structure(app: &AppConfig) -> Result<Structure> {
    let read = |path: &Path| {
        info!("Loading coordinates from {:?}", path);
        read_coordinates(path, &app.cif_options).map_err(|source| CliError::Coordinates {
            path: path.to_path_buf(),
            source,
        })
    };
    let subject = read(&app.subject_path)?;
    let extended = read(&app.extended_path)?;
    info!(
        "Read {} subject atoms and {} extended atoms.",
        subject.len(),
        extended.len()
    );
    Ok(Structure::new(subject, extended))
}

/// Loads the structure, records the parameters and runs the workflow into the output directory.
pub fn execute(
    app: &AppConfig,
    reporter: &ProgressReporter,
) -> Result<(PadfResult, NpyDirectorySink)> {
    let structure = load_structure(app)?;

    let mut sink =
        NpyDirectorySink::new(&app.output_dir, app.name.clone()).map_err(EngineError::from)?;

    let log_path = app.parameter_log_path();
    std::fs::write(&log_path, app.parameter_log()?)?;
    info!("Run parameters written to {:?}", log_path);

    info!("Invoking the core PADF workflow...");
    let result = padf::run(&structure, &app.core_config, &mut sink, reporter)?;
    Ok((result, sink))
}

fn print_summary(app: &AppConfig, result: &PadfResult, sink: &NpyDirectorySink) {
    let state = &result.state;
    println!(
        "Correlated {} subject atoms against {} extended atoms over {} loop(s).",
        result.subject_count,
        result.extended_count,
        state.loops_completed()
    );
    println!("Total correlation counts: {}", result.total.total());

    if let Some(loop_index) = state.stopping_loop() {
        println!("Converged at loop {}.", loop_index);
    }
    if !state.record().is_empty() {
        print!("{}", format_similarity_table(state.record()));
    }
    if !state.failures().is_empty() {
        warn!(
            "{} worker contribution(s) were excluded.",
            state.failures().len()
        );
        for failure in state.failures() {
            println!(
                "  Excluded worker {} of loop {} after {} attempt(s): {}",
                failure.slot, failure.loop_index, failure.attempts, failure.message
            );
        }
    }

    println!(
        "✓ Total histogram written to: {}",
        sink.total_path(app.core_config.histogram.mode).display()
    );
    println!(
        "✓ Corrected histogram written to: {}",
        sink.corrected_path().display()
    );
}
