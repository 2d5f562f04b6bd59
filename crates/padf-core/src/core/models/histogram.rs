use ndarray::{Array2, Array3, ArrayD, ArrayViewD, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// Guards bin-count floors against representation error (e.g. `0.3 / 0.1`).
const BIN_COUNT_TOLERANCE: f64 = 1e-9;

/// Selects which correlations are accumulated and the rank of the resulting histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PadfMode {
    /// The `r = r'` slice: a rank-2 histogram over `(r, theta)`, restricted to pairs
    /// whose two distances fall within one radial bin width of each other.
    #[default]
    #[serde(alias = "rrprime")]
    Slice,
    /// The full `(r, r', theta)` volume: a rank-3 histogram without restriction.
    #[serde(alias = "stm")]
    Full,
}

impl PadfMode {
    /// Returns the rank of the histogram accumulated in this mode.
    pub fn rank(self) -> usize {
        match self {
            PadfMode::Slice => 2,
            PadfMode::Full => 3,
        }
    }
}

impl fmt::Display for PadfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadfMode::Slice => write!(f, "slice"),
            PadfMode::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistogramError {
    #[error("Histogram shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Histogram rank mismatch: {mode} mode expects rank {expected}, found rank {found}")]
    RankMismatch {
        mode: PadfMode,
        expected: usize,
        found: usize,
    },
}

/// The binning layout shared by every histogram of a run.
///
/// Radial bin edges sit at `(k + 1) * radial_bin_width` and angular bin edges at
/// `k * angular_bin_width`. A value is assigned to the bin whose edge lies closest
/// to it, with exact ties resolved towards the lower index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinGrid {
    probe_radius: f64,
    radial_bin_width: f64,
    angular_bin_width: f64,
    radial_bins: usize,
    angular_bins: usize,
}

impl BinGrid {
    /// Derives the grid from the probe radius and the two bin widths.
    ///
    /// # Arguments
    ///
    /// * `probe_radius` - The neighbor-sphere radius in Angstroms.
    /// * `radial_bin_width` - The width of a radial bin in Angstroms.
    /// * `angular_bin_width_degrees` - The width of an angular bin in degrees.
    pub fn new(probe_radius: f64, radial_bin_width: f64, angular_bin_width_degrees: f64) -> Self {
        let angular_bin_width = angular_bin_width_degrees.to_radians();
        Self {
            probe_radius,
            radial_bin_width,
            angular_bin_width,
            radial_bins: bin_count(probe_radius, radial_bin_width),
            angular_bins: bin_count(PI, angular_bin_width),
        }
    }

    pub fn probe_radius(&self) -> f64 {
        self.probe_radius
    }

    pub fn radial_bin_width(&self) -> f64 {
        self.radial_bin_width
    }

    /// Angular bin width in radians.
    pub fn angular_bin_width(&self) -> f64 {
        self.angular_bin_width
    }

    pub fn radial_bins(&self) -> usize {
        self.radial_bins
    }

    pub fn angular_bins(&self) -> usize {
        self.angular_bins
    }

    /// Returns the histogram shape for the given mode.
    pub fn shape(&self, mode: PadfMode) -> Vec<usize> {
        match mode {
            PadfMode::Slice => vec![self.radial_bins, self.angular_bins],
            PadfMode::Full => vec![self.radial_bins, self.radial_bins, self.angular_bins],
        }
    }

    pub fn radial_edges(&self) -> Vec<f64> {
        (0..self.radial_bins)
            .map(|k| (k + 1) as f64 * self.radial_bin_width)
            .collect()
    }

    pub fn angular_edges(&self) -> Vec<f64> {
        (0..self.angular_bins)
            .map(|k| k as f64 * self.angular_bin_width)
            .collect()
    }

    /// Index of the radial edge nearest to `r`.
    #[inline]
    pub fn radial_index(&self, r: f64) -> usize {
        nearest_edge_index(
            r,
            self.radial_bin_width,
            self.radial_bin_width,
            self.radial_bins,
        )
    }

    /// Index of the angular edge nearest to `theta` (radians).
    #[inline]
    pub fn angular_index(&self, theta: f64) -> usize {
        nearest_edge_index(theta, 0.0, self.angular_bin_width, self.angular_bins)
    }
}

fn bin_count(extent: f64, width: f64) -> usize {
    (extent / width + BIN_COUNT_TOLERANCE).floor() as usize
}

/// Closed-form nearest-edge lookup over the evenly spaced edges
/// `first_edge + k * width` for `k` in `0..count`.
#[inline]
fn nearest_edge_index(value: f64, first_edge: f64, width: f64, count: usize) -> usize {
    let position = (value - first_edge) / width;
    // Exactly half-way between two edges rounds down.
    let index = (position - 0.5).ceil();
    if index <= 0.0 || index.is_nan() {
        0
    } else {
        (index as usize).min(count.saturating_sub(1))
    }
}

/// The accumulated PADF histogram tensor.
///
/// Bin counts are stored as `f64` so that the same type can carry normalized
/// values after post-processing. Every histogram of a run shares one shape,
/// fixed by the [`BinGrid`] and the [`PadfMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Theta {
    /// Rank-2 histogram indexed by `(r, theta)`.
    Slice(Array2<f64>),
    /// Rank-3 histogram indexed by `(r, r', theta)`.
    Full(Array3<f64>),
}

impl Theta {
    /// Creates an empty histogram for the given mode and grid.
    pub fn zeros(mode: PadfMode, grid: &BinGrid) -> Self {
        match mode {
            PadfMode::Slice => Theta::Slice(Array2::zeros((grid.radial_bins, grid.angular_bins))),
            PadfMode::Full => Theta::Full(Array3::zeros((
                grid.radial_bins,
                grid.radial_bins,
                grid.angular_bins,
            ))),
        }
    }

    /// Creates an empty histogram with the mode and shape of `other`.
    pub fn zeros_like(other: &Theta) -> Self {
        match other {
            Theta::Slice(data) => Theta::Slice(Array2::zeros(data.raw_dim())),
            Theta::Full(data) => Theta::Full(Array3::zeros(data.raw_dim())),
        }
    }

    /// Rebuilds a histogram from a dynamically shaped array, checking its rank.
    pub fn from_dyn(mode: PadfMode, data: ArrayD<f64>) -> Result<Self, HistogramError> {
        let found = data.ndim();
        let rank_mismatch = || HistogramError::RankMismatch {
            mode,
            expected: mode.rank(),
            found,
        };
        match mode {
            PadfMode::Slice => data
                .into_dimensionality::<Ix2>()
                .map(Theta::Slice)
                .map_err(|_| rank_mismatch()),
            PadfMode::Full => data
                .into_dimensionality::<Ix3>()
                .map(Theta::Full)
                .map_err(|_| rank_mismatch()),
        }
    }

    pub fn mode(&self) -> PadfMode {
        match self {
            Theta::Slice(_) => PadfMode::Slice,
            Theta::Full(_) => PadfMode::Full,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Theta::Slice(data) => data.shape(),
            Theta::Full(data) => data.shape(),
        }
    }

    /// Sum of all bin counts.
    pub fn total(&self) -> f64 {
        match self {
            Theta::Slice(data) => data.sum(),
            Theta::Full(data) => data.sum(),
        }
    }

    /// Returns the count stored at `index`, or `None` if the index is out of range
    /// or has the wrong rank.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        match (self, index) {
            (Theta::Slice(data), &[r, t]) => data.get((r, t)).copied(),
            (Theta::Full(data), &[r, rp, t]) => data.get((r, rp, t)).copied(),
            _ => None,
        }
    }

    pub fn view_dyn(&self) -> ArrayViewD<'_, f64> {
        match self {
            Theta::Slice(data) => data.view().into_dyn(),
            Theta::Full(data) => data.view().into_dyn(),
        }
    }

    /// Adds one count for a correlation.
    ///
    /// `r_prime` is ignored in slice mode, where the histogram has no `r'` axis.
    #[inline]
    pub fn record(&mut self, grid: &BinGrid, r: f64, r_prime: f64, theta: f64) {
        let t = grid.angular_index(theta);
        match self {
            Theta::Slice(data) => data[[grid.radial_index(r), t]] += 1.0,
            Theta::Full(data) => {
                data[[grid.radial_index(r), grid.radial_index(r_prime), t]] += 1.0
            }
        }
    }

    /// Adds `other` elementwise into `self`.
    pub fn accumulate(&mut self, other: &Theta) -> Result<(), HistogramError> {
        if self.shape() != other.shape() {
            return Err(HistogramError::ShapeMismatch {
                expected: self.shape().to_vec(),
                found: other.shape().to_vec(),
            });
        }
        match (self, other) {
            (Theta::Slice(lhs), Theta::Slice(rhs)) => *lhs += rhs,
            (Theta::Full(lhs), Theta::Full(rhs)) => *lhs += rhs,
            (lhs, rhs) => {
                return Err(HistogramError::RankMismatch {
                    mode: lhs.mode(),
                    expected: lhs.mode().rank(),
                    found: rhs.mode().rank(),
                });
            }
        }
        Ok(())
    }
}
