//! Persistence of the histograms and convergence history produced by a run.
//!
//! The dispatcher is the only writer. Loop histograms are stored as they are
//! reduced and read back when the total histogram is rebuilt.

pub mod npy;

use ndarray::Array2;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::models::histogram::{BinGrid, HistogramError, PadfMode, Theta};
use crate::engine::state::ConvergenceRecord;

pub use npy::NpyDirectorySink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing artifact: {0}")]
    Missing(String),
    #[error("Corrupt artifact '{artifact}': {message}")]
    Corrupt { artifact: String, message: String },
    #[error("Failed to write '{path}': {message}")]
    Write { path: String, message: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Histogram error: {0}")]
    Histogram(#[from] HistogramError),
}

/// Destination for everything a run persists.
pub trait ResultSink {
    /// Stores the histogram produced by one worker slot of one loop.
    fn store_partial(
        &mut self,
        loop_index: usize,
        slot: usize,
        histogram: &Theta,
    ) -> Result<(), SinkError>;

    /// Stores the reduced histogram of one loop.
    fn store_loop(&mut self, loop_index: usize, histogram: &Theta) -> Result<(), SinkError>;

    /// Loads a loop histogram stored earlier, checking it against `mode`.
    fn load_loop(&self, loop_index: usize, mode: PadfMode) -> Result<Theta, SinkError>;

    /// Stores the raw total histogram and its corrected rank-2 form.
    fn store_total(&mut self, total: &Theta, corrected: &Array2<f64>) -> Result<(), SinkError>;

    fn store_convergence(&mut self, record: &ConvergenceRecord) -> Result<(), SinkError>;

    /// Removes per-slot and per-loop artifacts written during the run.
    fn clear_intermediates(&mut self) -> Result<(), SinkError>;
}

/// Rebuilds the cumulative histogram of loops `1..=through` from `sink`.
pub fn sum_loops(
    sink: &dyn ResultSink,
    mode: PadfMode,
    grid: &BinGrid,
    through: usize,
) -> Result<Theta, SinkError> {
    let mut total = Theta::zeros(mode, grid);
    for loop_index in 1..=through {
        let histogram = sink.load_loop(loop_index, mode)?;
        total.accumulate(&histogram)?;
    }
    Ok(total)
}

/// Keeps every artifact in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    partials: BTreeMap<(usize, usize), Theta>,
    loops: BTreeMap<usize, Theta>,
    total: Option<(Theta, Array2<f64>)>,
    convergence: Option<ConvergenceRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partial(&self, loop_index: usize, slot: usize) -> Option<&Theta> {
        self.partials.get(&(loop_index, slot))
    }

    pub fn partial_count(&self) -> usize {
        self.partials.len()
    }

    pub fn loop_histogram(&self, loop_index: usize) -> Option<&Theta> {
        self.loops.get(&loop_index)
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    pub fn total(&self) -> Option<&Theta> {
        self.total.as_ref().map(|(raw, _)| raw)
    }

    pub fn corrected(&self) -> Option<&Array2<f64>> {
        self.total.as_ref().map(|(_, corrected)| corrected)
    }

    pub fn convergence(&self) -> Option<&ConvergenceRecord> {
        self.convergence.as_ref()
    }
}

impl ResultSink for MemorySink {
    fn store_partial(
        &mut self,
        loop_index: usize,
        slot: usize,
        histogram: &Theta,
    ) -> Result<(), SinkError> {
        self.partials
            .insert((loop_index, slot), histogram.clone());
        Ok(())
    }

    fn store_loop(&mut self, loop_index: usize, histogram: &Theta) -> Result<(), SinkError> {
        self.loops.insert(loop_index, histogram.clone());
        Ok(())
    }

    fn load_loop(&self, loop_index: usize, mode: PadfMode) -> Result<Theta, SinkError> {
        let histogram = self
            .loops
            .get(&loop_index)
            .ok_or_else(|| SinkError::Missing(format!("loop {} histogram", loop_index)))?;
        if histogram.mode() != mode {
            return Err(SinkError::Corrupt {
                artifact: format!("loop {} histogram", loop_index),
                message: format!("stored in {} mode, expected {}", histogram.mode(), mode),
            });
        }
        Ok(histogram.clone())
    }

    fn store_total(&mut self, total: &Theta, corrected: &Array2<f64>) -> Result<(), SinkError> {
        self.total = Some((total.clone(), corrected.clone()));
        Ok(())
    }

    fn store_convergence(&mut self, record: &ConvergenceRecord) -> Result<(), SinkError> {
        self.convergence = Some(record.clone());
        Ok(())
    }

    fn clear_intermediates(&mut self) -> Result<(), SinkError> {
        self.partials.clear();
        self.loops.clear();
        Ok(())
    }
}
