//! Per-center computational tasks executed by the dispatcher's workers.
//!
//! A task turns one subject atom into a private histogram. Tasks share only
//! read-only data, so any number of them can run concurrently.

pub mod correlation;

use crate::core::models::atom::Atom;
use crate::core::models::histogram::Theta;
use crate::engine::error::EngineError;

/// The per-center unit of work run by each dispatcher slot.
pub trait Accumulator: Sync {
    /// Accumulates every correlation around `center` into a fresh histogram.
    fn accumulate(&self, center: &Atom) -> Result<Theta, EngineError>;

    /// An empty histogram of the shape this accumulator produces.
    fn empty_histogram(&self) -> Theta;
}
