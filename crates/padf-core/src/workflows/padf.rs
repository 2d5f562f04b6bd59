use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument, warn};

use crate::core::models::atom::Structure;
use crate::core::models::histogram::Theta;
use crate::engine::config::PadfConfig;
use crate::engine::convergence::ConvergenceMonitor;
use crate::engine::correction::Correction;
use crate::engine::dispatcher::ParallelDispatcher;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sink::{ResultSink, sum_loops};
use crate::engine::state::RunState;
use crate::engine::tasks::correlation::CorrelationAccumulator;
use crate::engine::utils::query::filter_extended_atoms;
use crate::engine::utils::sampling::select_subjects;

#[derive(Debug, Clone)]
pub struct PadfResult {
    /// Raw cumulative histogram over every completed loop.
    pub total: Theta,
    /// Angular- and radially-corrected rank-2 form of `total`.
    pub corrected: Array2<f64>,
    pub state: RunState,
    pub subject_count: usize,
    pub extended_count: usize,
}

#[instrument(skip_all, name = "padf_workflow")]
pub fn run(
    structure: &Structure,
    config: &PadfConfig,
    sink: &mut dyn ResultSink,
    reporter: &ProgressReporter,
) -> Result<PadfResult, EngineError> {
    // === Phase 0: Preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    if !structure.is_finite() {
        warn!("Structure contains non-finite coordinates; affected atoms will not correlate.");
    }

    let histogram = &config.histogram;
    let mut rng = match config.sampling.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let subjects = select_subjects(
        structure.subject(),
        config.sampling.subject_sample_size,
        &mut rng,
    );
    if subjects.is_empty() {
        return Err(EngineError::EmptySubjectSet);
    }
    let extended = filter_extended_atoms(&subjects, structure.extended(), histogram.probe_radius);

    let grid = config.bin_grid();
    info!(
        mode = %histogram.mode,
        radial_bins = grid.radial_bins(),
        angular_bins = grid.angular_bins(),
        four_body = config.sampling.four_body,
        "Prepared {} subject atoms against {} extended atoms.",
        subjects.len(),
        extended.len()
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Correlation ===
    reporter.report(Progress::PhaseStart {
        name: "Correlating",
    });
    let correction = Correction::new(histogram.probe_radius, histogram.radial_power);
    let monitor = config
        .convergence
        .as_ref()
        .map(|convergence| ConvergenceMonitor::new(convergence.target, correction));
    let accumulator = CorrelationAccumulator::from_config(&extended, config);
    let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, monitor)?;
    let state = dispatcher.run(&subjects, sink, reporter)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Final reduction ===
    reporter.report(Progress::PhaseStart { name: "Finalizing" });
    let total = sum_loops(sink, histogram.mode, &grid, state.loops_completed())?;
    let corrected = correction.apply(&total);
    sink.store_total(&total, &corrected)?;
    if config.convergence.is_some() {
        sink.store_convergence(state.record())?;
    }
    if !config.execution.keep_intermediates {
        sink.clear_intermediates()?;
    }
    if !state.failures().is_empty() {
        warn!(
            "{} worker contribution(s) were excluded from the result.",
            state.failures().len()
        );
    }
    reporter.report(Progress::PhaseFinish);

    info!(
        loops = state.loops_completed(),
        counts = total.total(),
        "Workflow complete."
    );
    Ok(PadfResult {
        total,
        corrected,
        subject_count: subjects.len(),
        extended_count: extended.len(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::histogram::PadfMode;
    use crate::engine::config::PadfConfigBuilder;
    use crate::engine::sink::{MemorySink, NpyDirectorySink};
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn scenario() -> Structure {
        Structure::new(
            vec![Point3::new(0.0, 0.0, 0.0)],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
        )
    }

    fn scenario_config() -> PadfConfigBuilder {
        PadfConfigBuilder::new()
            .probe_radius(2.0)
            .angular_bin_width(90.0)
            .radial_bin_width(1.0)
            .mode(PadfMode::Slice)
            .four_body(false)
            .worker_count(1)
            .seed(Some(3))
    }

    fn cluster() -> Structure {
        let extended: Vec<Atom> = (0..5)
            .flat_map(|i| {
                (0..5).map(move |j| Point3::new(i as f64 * 0.9, j as f64 * 1.1, (i * j) as f64 * 0.2))
            })
            .collect();
        let subject = extended.iter().step_by(3).copied().collect();
        Structure::new(subject, extended)
    }

    #[test]
    fn perpendicular_neighbors_produce_the_expected_histogram() {
        let config = scenario_config().build().unwrap();
        let mut sink = MemorySink::new();
        let result = run(&scenario(), &config, &mut sink, &ProgressReporter::new()).unwrap();

        assert_eq!(result.total.get(&[0, 1]), Some(2.0));
        assert_eq!(result.total.total(), 2.0);
        assert_eq!(result.subject_count, 1);
        assert_eq!(result.extended_count, 3);
        assert_eq!(sink.total(), Some(&result.total));
        assert_eq!(sink.loop_count(), 0);
        assert!(sink.convergence().is_none());
    }

    #[test]
    fn keep_intermediates_preserves_loop_histograms() {
        let config = scenario_config().keep_intermediates(true).build().unwrap();
        let mut sink = MemorySink::new();
        run(&scenario(), &config, &mut sink, &ProgressReporter::new()).unwrap();
        assert_eq!(sink.loop_count(), 1);
        assert_eq!(sink.partial_count(), 1);
    }

    #[test]
    fn same_seed_reproduces_the_same_result() {
        let config = scenario_config()
            .probe_radius(2.0)
            .radial_bin_width(0.25)
            .angular_bin_width(10.0)
            .four_body(true)
            .worker_count(2)
            .subject_sample_size(Some(4))
            .seed(Some(11))
            .build()
            .unwrap();
        let first = run(&cluster(), &config, &mut MemorySink::new(), &ProgressReporter::new()).unwrap();
        let second = run(&cluster(), &config, &mut MemorySink::new(), &ProgressReporter::new()).unwrap();

        assert_eq!(first.subject_count, 4);
        assert_eq!(first.total, second.total);
        assert_eq!(first.corrected, second.corrected);
    }

    #[test]
    fn convergence_record_is_persisted_when_monitoring() {
        let config = scenario_config()
            .mode(PadfMode::Full)
            .radial_bin_width(0.5)
            .angular_bin_width(15.0)
            .worker_count(2)
            .convergence_target(Some(2.0))
            .build()
            .unwrap();
        let mut sink = MemorySink::new();
        let result = run(&cluster(), &config, &mut sink, &ProgressReporter::new()).unwrap();

        let loops = result.state.loops_completed();
        assert_eq!(loops, 5);
        assert!(!result.state.is_converged());
        let record = sink.convergence().unwrap();
        assert_eq!(record.len(), loops - 1);
        assert_eq!(record.entries()[0].loop_index, 2);
        assert_eq!(result.corrected.dim(), (4, 12));
    }

    #[test]
    fn empty_subject_set_is_an_error() {
        let structure = Structure::new(Vec::new(), vec![Point3::new(1.0, 0.0, 0.0)]);
        let config = scenario_config().build().unwrap();
        assert!(matches!(
            run(&structure, &config, &mut MemorySink::new(), &ProgressReporter::new()),
            Err(EngineError::EmptySubjectSet)
        ));
    }

    #[test]
    fn npy_directory_run_leaves_only_final_artifacts() {
        let dir = tempdir().unwrap();
        let config = scenario_config()
            .convergence_target(Some(0.5))
            .build()
            .unwrap();
        let mut sink = NpyDirectorySink::new(dir.path(), "scenario").unwrap();
        let result = run(&scenario(), &config, &mut sink, &ProgressReporter::new()).unwrap();

        assert_eq!(sink.load_total(PadfMode::Slice).unwrap(), result.total);
        assert!(sink.load_convergence().unwrap().is_empty());
        assert!(sink.corrected_path().exists());
        assert!(!sink.loop_path(1).exists());
    }
}
