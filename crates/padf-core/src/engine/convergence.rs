use ndarray::{ArrayView2, Zip};
use tracing::debug;

use super::correction::Correction;
use crate::core::models::histogram::{HistogramError, Theta};

/// Cosine similarity of two equally shaped arrays.
///
/// Both arrays are L2-normalized and flattened before taking their dot product.
/// If either array has zero norm the similarity is reported as `0.0`.
pub fn cosine_similarity(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<f64, HistogramError> {
    if a.shape() != b.shape() {
        return Err(HistogramError::ShapeMismatch {
            expected: a.shape().to_vec(),
            found: b.shape().to_vec(),
        });
    }
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let dot = Zip::from(&a)
        .and(&b)
        .fold(0.0, |acc, x, y| acc + (x / norm_a) * (y / norm_b));
    Ok(dot)
}

/// Compares successive cumulative histograms after correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceMonitor {
    target: f64,
    correction: Correction,
}

impl ConvergenceMonitor {
    pub fn new(target: f64, correction: Correction) -> Self {
        Self { target, correction }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Similarity between the corrected cumulative histograms before and after a loop.
    pub fn compare(&self, previous: &Theta, current: &Theta) -> Result<f64, HistogramError> {
        let previous = self.correction.apply(previous);
        let current = self.correction.apply(current);
        let similarity = cosine_similarity(current.view(), previous.view())?;
        debug!(similarity, target = self.target, "Compared cumulative histograms");
        Ok(similarity)
    }

    pub fn is_converged(&self, similarity: f64) -> bool {
        similarity >= self.target
    }
}
