use crossbeam_channel::bounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, instrument, warn};

use super::config::{ExecutionConfig, FailurePolicy};
use super::convergence::ConvergenceMonitor;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::sink::ResultSink;
use super::state::{RunState, WorkerFailure};
use super::tasks::Accumulator;
use crate::core::models::atom::Atom;
use crate::core::models::histogram::Theta;

/// What a worker slot hands back: its histogram, or a description of its failure.
type SlotOutcome = (usize, Result<Theta, String>);

/// Fans subject atoms out to a bounded worker pool, one chunk per loop.
///
/// Each chunk holds up to `worker_count` atoms, one per slot. A loop ends when every
/// slot of its chunk has reported back; the successful histograms are then reduced in
/// slot order into the loop histogram, which is persisted and folded into the run state.
pub struct ParallelDispatcher<'a, A: Accumulator> {
    accumulator: &'a A,
    execution: &'a ExecutionConfig,
    monitor: Option<ConvergenceMonitor>,
    pool: ThreadPool,
}

impl<'a, A: Accumulator> ParallelDispatcher<'a, A> {
    pub fn new(
        accumulator: &'a A,
        execution: &'a ExecutionConfig,
        monitor: Option<ConvergenceMonitor>,
    ) -> Result<Self, EngineError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(execution.worker_count)
            .thread_name(|i| format!("padf-worker-{}", i))
            .build()
            .map_err(|e| EngineError::Initialization(e.to_string()))?;
        Ok(Self {
            accumulator,
            execution,
            monitor,
            pool,
        })
    }

    /// Number of loops needed to visit `subject_count` atoms.
    pub fn loop_count(&self, subject_count: usize) -> usize {
        subject_count.div_ceil(self.execution.worker_count)
    }

    /// Runs every loop over `subjects`, stopping early once converged.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EmptySubjectSet`] for an empty subject set,
    /// [`EngineError::WorkerFailure`] when a worker keeps failing under the abort policy,
    /// and propagates sink and histogram errors from the reduction.
    #[instrument(skip_all, name = "dispatch", fields(subjects = subjects.len(), workers = self.execution.worker_count))]
    pub fn run(
        &self,
        subjects: &[Atom],
        sink: &mut dyn ResultSink,
        reporter: &ProgressReporter,
    ) -> Result<RunState, EngineError> {
        if subjects.is_empty() {
            return Err(EngineError::EmptySubjectSet);
        }

        let total_loops = self.loop_count(subjects.len());
        info!("Dispatching {} subject atoms over {} loops.", subjects.len(), total_loops);
        reporter.report(Progress::TaskStart {
            total_steps: subjects.len() as u64,
        });

        let mut state = RunState::new();
        for (offset, chunk) in subjects.chunks(self.execution.worker_count).enumerate() {
            let loop_index = offset + 1;
            let (loop_histogram, failures) = self.reduce_chunk(loop_index, chunk, sink, reporter)?;
            sink.store_loop(loop_index, &loop_histogram)?;

            state = state
                .advance(loop_index, &loop_histogram, self.monitor.as_ref())?
                .with_failures(failures);
            debug!(
                loop_index,
                total_loops,
                counts = loop_histogram.total(),
                "Loop reduced"
            );
            reporter.report(Progress::LoopFinish {
                loop_index,
                total_loops,
                similarity: state.last_similarity(),
            });

            if let Some(stopping_loop) = state.stopping_loop() {
                info!("Calculation converged at loop {}.", stopping_loop);
                break;
            }
        }

        reporter.report(Progress::TaskFinish);
        Ok(state)
    }

    fn reduce_chunk(
        &self,
        loop_index: usize,
        chunk: &[Atom],
        sink: &mut dyn ResultSink,
        reporter: &ProgressReporter,
    ) -> Result<(Theta, Vec<WorkerFailure>), EngineError> {
        let mut loop_histogram = self.accumulator.empty_histogram();
        let mut failures = Vec::new();

        for (slot, outcome) in self.run_chunk(chunk, reporter) {
            let histogram = match outcome {
                Ok(histogram) => histogram,
                Err(message) => match self.retry(&chunk[slot], message) {
                    Ok(histogram) => histogram,
                    Err((attempts, message)) => {
                        match self.execution.failure_policy {
                            FailurePolicy::Abort => {
                                return Err(EngineError::WorkerFailure {
                                    loop_index,
                                    slot,
                                    attempts,
                                    message,
                                });
                            }
                            FailurePolicy::Exclude => {
                                warn!(
                                    loop_index,
                                    slot, attempts, "Excluding failed worker from loop: {}", message
                                );
                                failures.push(WorkerFailure {
                                    loop_index,
                                    slot,
                                    attempts,
                                    message,
                                });
                            }
                        }
                        continue;
                    }
                },
            };

            if self.execution.keep_intermediates {
                sink.store_partial(loop_index, slot, &histogram)?;
            }
            loop_histogram.accumulate(&histogram)?;
        }

        Ok((loop_histogram, failures))
    }

    /// Runs one task per atom and waits for all of them; outcomes come back in slot order.
    fn run_chunk(&self, chunk: &[Atom], reporter: &ProgressReporter) -> Vec<SlotOutcome> {
        let (sender, receiver) = bounded::<SlotOutcome>(chunk.len());
        let accumulator = self.accumulator;

        self.pool.scope(|scope| {
            for (slot, center) in chunk.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let outcome = run_guarded(accumulator, center);
                    reporter.report(Progress::TaskIncrement);
                    // The channel holds one message per slot, so this never blocks.
                    if sender.send((slot, outcome)).is_err() {
                        warn!(slot, "Dispatcher stopped listening before the worker finished");
                    }
                });
            }
        });
        drop(sender);

        let mut outcomes: Vec<SlotOutcome> = receiver.iter().collect();
        outcomes.sort_by_key(|(slot, _)| *slot);
        outcomes
    }

    /// Re-runs a failed unit alone, up to `max_retries` times.
    ///
    /// On final failure returns the total number of attempts and the last error.
    fn retry(&self, center: &Atom, first_error: String) -> Result<Theta, (usize, String)> {
        let mut attempts = 1;
        let mut last_error = first_error;
        while attempts <= self.execution.max_retries {
            attempts += 1;
            warn!(attempt = attempts, "Retrying failed worker: {}", last_error);
            match self
                .pool
                .install(|| run_guarded(self.accumulator, center))
            {
                Ok(histogram) => return Ok(histogram),
                Err(message) => last_error = message,
            }
        }
        Err((attempts, last_error))
    }
}

/// Runs the accumulator, turning both errors and panics into an error message.
fn run_guarded<A: Accumulator>(accumulator: &A, center: &Atom) -> Result<Theta, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| accumulator.accumulate(center))) {
        Ok(Ok(histogram)) => Ok(histogram),
        Ok(Err(error)) => Err(error.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", message)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::as_array;
    use crate::core::models::histogram::{BinGrid, PadfMode};
    use crate::engine::config::{PadfConfig, PadfConfigBuilder};
    use crate::engine::correction::Correction;
    use crate::engine::sink::{MemorySink, sum_loops};
    use crate::engine::tasks::correlation::CorrelationAccumulator;
    use nalgebra::Point3;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(workers: usize, policy: FailurePolicy, keep: bool) -> PadfConfig {
        PadfConfigBuilder::new()
            .probe_radius(2.0)
            .radial_bin_width(0.5)
            .angular_bin_width(15.0)
            .mode(PadfMode::Slice)
            .four_body(true)
            .worker_count(workers)
            .failure_policy(policy)
            .keep_intermediates(keep)
            .build()
            .unwrap()
    }

    fn subjects(n: usize) -> Vec<Atom> {
        (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect()
    }

    /// Every center contributes one count, except `failing_x`, which fails its first
    /// `failures` calls (by error or by panic).
    struct Scripted {
        grid: BinGrid,
        failing_x: f64,
        failures: usize,
        panics: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(failing_x: f64, failures: usize, panics: bool) -> Self {
            Self {
                grid: BinGrid::new(2.0, 0.5, 15.0),
                failing_x,
                failures,
                panics,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Accumulator for Scripted {
        fn accumulate(&self, center: &Atom) -> Result<Theta, EngineError> {
            if center.x == self.failing_x && self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
            {
                if self.panics {
                    panic!("kernel exploded");
                }
                return Err(EngineError::Accumulation {
                    center: as_array(center),
                    reason: "scripted failure".to_string(),
                });
            }
            let mut histogram = self.empty_histogram();
            histogram.record(&self.grid, 1.0, 1.0, 0.0);
            Ok(histogram)
        }

        fn empty_histogram(&self) -> Theta {
            Theta::zeros(PadfMode::Slice, &self.grid)
        }
    }

    #[test]
    fn chunked_reduction_equals_sum_of_single_passes() {
        let extended: Vec<Atom> = (0..4)
            .flat_map(|i| {
                (0..4).map(move |j| Point3::new(i as f64 * 0.8, j as f64 * 0.9, (i + j) as f64 * 0.3))
            })
            .collect();
        let subject_atoms = vec![extended[0], extended[5], extended[10], extended[15]];
        let config = config(2, FailurePolicy::Exclude, false);
        let accumulator = CorrelationAccumulator::from_config(&extended, &config);

        let mut expected = accumulator.empty_histogram();
        for center in &subject_atoms {
            expected
                .accumulate(&accumulator.accumulate(center).unwrap())
                .unwrap();
        }

        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();
        let state = dispatcher
            .run(&subject_atoms, &mut sink, &ProgressReporter::new())
            .unwrap();

        assert_eq!(state.loops_completed(), 2);
        assert_eq!(state.cumulative(), Some(&expected));
        let rebuilt = sum_loops(&sink, PadfMode::Slice, &config.bin_grid(), 2).unwrap();
        assert_eq!(rebuilt, expected);
        assert!(expected.total() > 0.0);
    }

    #[test]
    fn short_last_chunk_adds_a_partial_loop() {
        let config = config(2, FailurePolicy::Exclude, true);
        let accumulator = Scripted::new(f64::NAN, 0, false);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();

        let state = dispatcher
            .run(&subjects(5), &mut sink, &ProgressReporter::new())
            .unwrap();

        assert_eq!(dispatcher.loop_count(5), 3);
        assert_eq!(state.loops_completed(), 3);
        assert_eq!(sink.loop_count(), 3);
        assert_eq!(sink.partial_count(), 5);
        assert!(sink.partial(3, 1).is_none());
        assert_eq!(sink.loop_histogram(3).map(Theta::total), Some(1.0));
    }

    #[test]
    fn transient_failure_is_recovered_by_retry() {
        let config = config(2, FailurePolicy::Exclude, false);
        let accumulator = Scripted::new(1.0, 1, false);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();

        let state = dispatcher
            .run(&subjects(4), &mut sink, &ProgressReporter::new())
            .unwrap();
        assert!(state.failures().is_empty());
        assert_eq!(state.cumulative().map(Theta::total), Some(4.0));
    }

    #[test]
    fn persistent_failure_is_excluded_and_recorded() {
        let config = config(2, FailurePolicy::Exclude, false);
        let accumulator = Scripted::new(2.0, usize::MAX, false);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();

        let state = dispatcher
            .run(&subjects(4), &mut sink, &ProgressReporter::new())
            .unwrap();
        assert_eq!(state.cumulative().map(Theta::total), Some(3.0));
        assert_eq!(
            state.failures(),
            &[WorkerFailure {
                loop_index: 2,
                slot: 0,
                attempts: 2,
                message: state.failures()[0].message.clone(),
            }]
        );
        assert!(state.failures()[0].message.contains("scripted failure"));
    }

    #[test]
    fn persistent_failure_aborts_under_abort_policy() {
        let config = config(2, FailurePolicy::Abort, false);
        let accumulator = Scripted::new(3.0, usize::MAX, false);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();

        let result = dispatcher.run(&subjects(4), &mut sink, &ProgressReporter::new());
        assert!(matches!(
            result,
            Err(EngineError::WorkerFailure {
                loop_index: 2,
                slot: 1,
                attempts: 2,
                ..
            })
        ));
        assert_eq!(sink.loop_count(), 1);
    }

    #[test]
    fn worker_panic_is_caught_and_excluded() {
        let config = config(2, FailurePolicy::Exclude, false);
        let accumulator = Scripted::new(0.0, usize::MAX, true);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();

        let state = dispatcher
            .run(&subjects(2), &mut sink, &ProgressReporter::new())
            .unwrap();
        assert_eq!(state.failures().len(), 1);
        assert!(state.failures()[0].message.contains("kernel exploded"));
        assert_eq!(state.cumulative().map(Theta::total), Some(1.0));
    }

    #[test]
    fn identical_loops_stop_at_loop_two() {
        let config = config(1, FailurePolicy::Exclude, false);
        let accumulator = Scripted::new(f64::NAN, 0, false);
        let monitor = ConvergenceMonitor::new(0.99, Correction::new(2.0, 2.0));
        let mut sink = MemorySink::new();
        let dispatcher =
            ParallelDispatcher::new(&accumulator, &config.execution, Some(monitor)).unwrap();

        let loops = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::LoopFinish {
                loop_index,
                similarity,
                ..
            } = event
            {
                loops.lock().unwrap().push((loop_index, similarity.is_some()));
            }
        }));

        let state = dispatcher.run(&subjects(6), &mut sink, &reporter).unwrap();
        drop(reporter);

        assert_eq!(state.stopping_loop(), Some(2));
        assert_eq!(sink.loop_count(), 2);
        assert_eq!(state.record().len(), 1);
        assert_eq!(loops.into_inner().unwrap(), vec![(1, false), (2, true)]);
    }

    #[test]
    fn empty_subject_set_is_rejected() {
        let config = config(2, FailurePolicy::Exclude, false);
        let accumulator = Scripted::new(f64::NAN, 0, false);
        let mut sink = MemorySink::new();
        let dispatcher = ParallelDispatcher::new(&accumulator, &config.execution, None).unwrap();
        assert!(matches!(
            dispatcher.run(&[], &mut sink, &ProgressReporter::new()),
            Err(EngineError::EmptySubjectSet)
        ));
    }
}
