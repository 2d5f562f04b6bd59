use thiserror::Error;

use super::config::ConfigError;
use super::sink::SinkError;
use crate::core::models::histogram::HistogramError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("The subject atom set is empty; nothing to correlate")]
    EmptySubjectSet,

    #[error("Accumulation failed for center atom {center:?}: {reason}")]
    Accumulation { center: [f64; 3], reason: String },

    #[error("Worker {slot} in loop {loop_index} failed after {attempts} attempt(s): {message}")]
    WorkerFailure {
        loop_index: usize,
        slot: usize,
        attempts: usize,
        message: String,
    },

    #[error("Histogram reduction failed: {0}")]
    Histogram(#[from] HistogramError),

    #[error("Result handoff failed: {0}")]
    Handoff(#[from] SinkError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
