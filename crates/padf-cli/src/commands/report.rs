use crate::cli::ReportArgs;
use crate::error::{CliError, Result};
use modelpadf::{
    core::models::histogram::PadfMode,
    engine::{
        error::EngineError,
        sink::{NpyDirectorySink, SinkError},
        state::ConvergenceRecord,
    },
};
use std::fmt::Write;
use tracing::info;

const RULE: &str = "---------------------------------";

/// Renders a convergence record as the loop/similarity table printed after a run.
pub fn format_similarity_table(record: &ConvergenceRecord) -> String {
    let mut table = String::new();
    let _ = writeln!(table, "{}", RULE);
    let _ = writeln!(table, "Loop num        cosine similarity");
    let _ = writeln!(table, "{}", RULE);
    for entry in record.entries() {
        let _ = writeln!(table, "{:<16}{:.6}", entry.loop_index, entry.similarity);
    }
    let _ = writeln!(table, "{}", RULE);
    table
}

fn detect_mode(sink: &NpyDirectorySink) -> Result<PadfMode> {
    [PadfMode::Slice, PadfMode::Full]
        .into_iter()
        .find(|&mode| sink.total_path(mode).exists())
        .ok_or_else(|| {
            CliError::Argument(format!(
                "No total histogram for run '{}' in {:?}",
                sink.name(),
                sink.directory()
            ))
        })
}

pub fn summarize(args: &ReportArgs) -> Result<String> {
    let sink = NpyDirectorySink::open(&args.output, args.name.clone()).map_err(|e| match e {
        SinkError::Missing(dir) => {
            CliError::Argument(format!("Output directory {} does not exist", dir))
        }
        other => EngineError::from(other).into(),
    })?;
    let mode = match args.mode {
        Some(mode) => mode.into(),
        None => detect_mode(&sink)?,
    };
    info!("Reading {} results of '{}' from {:?}", mode, args.name, args.output);

    let total = sink.load_total(mode).map_err(EngineError::from)?;
    let mut summary = String::new();
    let _ = writeln!(summary, "Run:          {}", args.name);
    let _ = writeln!(summary, "Mode:         {}", mode);
    let _ = writeln!(summary, "Shape:        {:?}", total.shape());
    let _ = writeln!(summary, "Total counts: {}", total.total());

    match sink.load_convergence() {
        Ok(record) if !record.is_empty() => summary.push_str(&format_similarity_table(&record)),
        Ok(_) | Err(SinkError::Missing(_)) => {
            let _ = writeln!(summary, "No convergence record.");
        }
        Err(e) => return Err(EngineError::from(e).into()),
    }
    Ok(summary)
}

pub async fn run(args: ReportArgs) -> Result<()> {
    print!("{}", summarize(&args)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelpadf::core::models::histogram::{BinGrid, Theta};
    use modelpadf::engine::sink::ResultSink;
    use modelpadf::engine::state::SimilarityEntry;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn record() -> ConvergenceRecord {
        [
            SimilarityEntry {
                loop_index: 2,
                similarity: 0.5,
            },
            SimilarityEntry {
                loop_index: 3,
                similarity: 0.9990004,
            },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn similarity_table_lists_every_entry() {
        let table = format_similarity_table(&record());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "Loop num        cosine similarity");
        assert_eq!(lines[3], "2               0.500000");
        assert_eq!(lines[4], "3               0.999000");
        assert_eq!(lines[5], RULE);
    }

    #[test]
    fn summarize_detects_mode_and_reads_convergence() {
        let dir = tempdir().unwrap();
        let mut sink = NpyDirectorySink::new(dir.path(), "quartz").unwrap();
        let grid = BinGrid::new(2.0, 1.0, 90.0);
        let mut total = Theta::zeros(PadfMode::Full, &grid);
        total.record(&grid, 1.0, 1.0, std::f64::consts::FRAC_PI_2);
        sink.store_total(&total, &Array2::zeros((2, 2))).unwrap();
        sink.store_convergence(&record()).unwrap();

        let args = ReportArgs {
            output: dir.path().to_path_buf(),
            name: "quartz".to_string(),
            mode: None,
        };
        let summary = summarize(&args).unwrap();
        assert!(summary.contains("Mode:         full"));
        assert!(summary.contains("Shape:        [2, 2, 2]"));
        assert!(summary.contains("Total counts: 1"));
        assert!(summary.contains("0.999000"));
    }

    #[test]
    fn summarize_without_results_is_an_argument_error() {
        let dir = tempdir().unwrap();
        let args = ReportArgs {
            output: dir.path().to_path_buf(),
            name: "missing".to_string(),
            mode: None,
        };
        assert!(matches!(summarize(&args), Err(CliError::Argument(_))));
    }

    #[test]
    fn summarize_leaves_a_missing_output_directory_uncreated() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("never_written");
        let args = ReportArgs {
            output: absent.clone(),
            name: "quartz".to_string(),
            mode: Some(crate::cli::ModeArg::Slice),
        };
        assert!(matches!(summarize(&args), Err(CliError::Argument(_))));
        assert!(!absent.exists());
    }
}
