use serde::{Deserialize, Serialize};

use super::convergence::ConvergenceMonitor;
use crate::core::models::histogram::{HistogramError, Theta};

/// One convergence measurement: the similarity observed after a loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEntry {
    pub loop_index: usize,
    pub similarity: f64,
}

/// Append-only history of convergence measurements, in loop order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceRecord {
    entries: Vec<SimilarityEntry>,
}

impl ConvergenceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, loop_index: usize, similarity: f64) {
        self.entries.push(SimilarityEntry {
            loop_index,
            similarity,
        });
    }

    pub fn entries(&self) -> &[SimilarityEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&SimilarityEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<SimilarityEntry> for ConvergenceRecord {
    fn from_iter<I: IntoIterator<Item = SimilarityEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergencePhase {
    /// No cumulative histogram exists yet to compare against.
    AwaitingBaseline,
    Comparing,
    Converged { loop_index: usize },
}

/// A worker contribution that was dropped from its loop after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerFailure {
    pub loop_index: usize,
    pub slot: usize,
    pub attempts: usize,
    pub message: String,
}

/// The state threaded through the dispatch loops.
///
/// Each loop produces a new state from the previous one and the loop's reduced
/// histogram; nothing else mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    cumulative: Option<Theta>,
    loops_completed: usize,
    phase: ConvergencePhase,
    record: ConvergenceRecord,
    failures: Vec<WorkerFailure>,
    last_similarity: Option<f64>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            cumulative: None,
            loops_completed: 0,
            phase: ConvergencePhase::AwaitingBaseline,
            record: ConvergenceRecord::new(),
            failures: Vec::new(),
            last_similarity: None,
        }
    }

    /// Folds a finished loop into the state.
    ///
    /// With a monitor, the first loop only establishes the baseline; every later
    /// loop compares the corrected cumulative histograms before and after it and
    /// appends the similarity to the record. Once converged the phase is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`HistogramError`] if the loop histogram does not match the shape of
    /// the cumulative histogram.
    pub fn advance(
        mut self,
        loop_index: usize,
        loop_histogram: &Theta,
        monitor: Option<&ConvergenceMonitor>,
    ) -> Result<Self, HistogramError> {
        let previous = self.cumulative.take();
        let mut current = match &previous {
            Some(previous) => previous.clone(),
            None => Theta::zeros_like(loop_histogram),
        };
        current.accumulate(loop_histogram)?;

        self.last_similarity = None;
        if let Some(monitor) = monitor {
            match (self.phase, &previous) {
                (ConvergencePhase::Converged { .. }, _) => {}
                (_, None) => self.phase = ConvergencePhase::Comparing,
                (_, Some(previous)) => {
                    let similarity = monitor.compare(previous, &current)?;
                    self.record.push(loop_index, similarity);
                    self.last_similarity = Some(similarity);
                    self.phase = if monitor.is_converged(similarity) {
                        ConvergencePhase::Converged { loop_index }
                    } else {
                        ConvergencePhase::Comparing
                    };
                }
            }
        }

        self.cumulative = Some(current);
        self.loops_completed = loop_index;
        Ok(self)
    }

    /// Appends the failures excluded from the latest loop.
    pub fn with_failures(mut self, failures: Vec<WorkerFailure>) -> Self {
        self.failures.extend(failures);
        self
    }

    pub fn cumulative(&self) -> Option<&Theta> {
        self.cumulative.as_ref()
    }

    pub fn loops_completed(&self) -> usize {
        self.loops_completed
    }

    pub fn phase(&self) -> ConvergencePhase {
        self.phase
    }

    pub fn is_converged(&self) -> bool {
        matches!(self.phase, ConvergencePhase::Converged { .. })
    }

    /// The loop at which the run converged, if it did.
    pub fn stopping_loop(&self) -> Option<usize> {
        match self.phase {
            ConvergencePhase::Converged { loop_index } => Some(loop_index),
            _ => None,
        }
    }

    pub fn record(&self) -> &ConvergenceRecord {
        &self.record
    }

    pub fn failures(&self) -> &[WorkerFailure] {
        &self.failures
    }

    pub fn last_similarity(&self) -> Option<f64> {
        self.last_similarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::histogram::{BinGrid, PadfMode};
    use crate::engine::correction::Correction;

    fn grid() -> BinGrid {
        BinGrid::new(2.0, 0.5, 45.0)
    }

    fn histogram(points: &[(f64, f64)]) -> Theta {
        let grid = grid();
        let mut theta = Theta::zeros(PadfMode::Slice, &grid);
        for &(r, t) in points {
            theta.record(&grid, r, r, t);
        }
        theta
    }

    #[test]
    fn advance_without_monitor_only_accumulates() {
        let state = RunState::new()
            .advance(1, &histogram(&[(1.0, 0.5)]), None)
            .unwrap()
            .advance(2, &histogram(&[(1.0, 0.5), (1.5, 1.0)]), None)
            .unwrap();

        assert_eq!(state.loops_completed(), 2);
        assert_eq!(state.cumulative().map(Theta::total), Some(3.0));
        assert!(state.record().is_empty());
        assert_eq!(state.phase(), ConvergencePhase::AwaitingBaseline);
    }

    #[test]
    fn first_loop_only_establishes_the_baseline() {
        let monitor = ConvergenceMonitor::new(0.99, Correction::new(2.0, 2.0));
        let state = RunState::new()
            .advance(1, &histogram(&[(1.0, 0.5)]), Some(&monitor))
            .unwrap();

        assert_eq!(state.phase(), ConvergencePhase::Comparing);
        assert!(state.record().is_empty());
        assert_eq!(state.last_similarity(), None);
    }

    #[test]
    fn identical_loops_converge_at_loop_two() {
        let monitor = ConvergenceMonitor::new(0.99, Correction::new(2.0, 2.0));
        let loop_histogram = histogram(&[(1.0, 0.5), (1.5, 2.0)]);
        let state = RunState::new()
            .advance(1, &loop_histogram, Some(&monitor))
            .unwrap()
            .advance(2, &loop_histogram, Some(&monitor))
            .unwrap();

        assert!(state.is_converged());
        assert_eq!(state.stopping_loop(), Some(2));
        let entry = state.record().last().unwrap();
        assert_eq!(entry.loop_index, 2);
        assert!((entry.similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn dissimilar_loops_keep_comparing() {
        let monitor = ConvergenceMonitor::new(0.999, Correction::new(2.0, 2.0));
        let state = RunState::new()
            .advance(1, &histogram(&[(0.5, 0.1)]), Some(&monitor))
            .unwrap()
            .advance(2, &histogram(&[(2.0, 2.5)]), Some(&monitor))
            .unwrap();

        assert_eq!(state.phase(), ConvergencePhase::Comparing);
        assert_eq!(state.record().len(), 1);
        assert!(state.last_similarity().unwrap() < 0.999);
    }

    #[test]
    fn mismatched_loop_shape_is_an_error() {
        let other = Theta::zeros(PadfMode::Slice, &BinGrid::new(3.0, 0.5, 45.0));
        let result = RunState::new()
            .advance(1, &histogram(&[(1.0, 0.5)]), None)
            .unwrap()
            .advance(2, &other, None);
        assert!(result.is_err());
    }

    #[test]
    fn failures_accumulate_across_loops() {
        let failure = |loop_index| WorkerFailure {
            loop_index,
            slot: 0,
            attempts: 2,
            message: "boom".to_string(),
        };
        let state = RunState::new()
            .with_failures(vec![failure(1)])
            .with_failures(vec![failure(3)]);
        assert_eq!(state.failures().len(), 2);
        assert_eq!(state.failures()[1].loop_index, 3);
    }
}
