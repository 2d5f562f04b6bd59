use ndarray::{Array2, Array3, s};
use std::f64::consts::PI;

use crate::core::models::histogram::Theta;

/// Offset that keeps the angular correction finite near `theta = pi`.
const ANGULAR_OFFSET: f64 = 1e-3;

/// Radial coordinates at or below this value are left uncorrected.
const RADIAL_THRESHOLD: f64 = 1.0;

/// Angular and radial normalization of a raw histogram.
///
/// The angular term divides by `|sin(theta) + 1e-3|` to remove the solid-angle bias
/// of uniform angular bins; the radial term divides by `r^p` beyond 1 Angstrom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    probe_radius: f64,
    radial_power: f64,
}

impl Correction {
    pub fn new(probe_radius: f64, radial_power: f64) -> Self {
        Self {
            probe_radius,
            radial_power,
        }
    }

    /// Returns a corrected rank-2 copy of `theta`; the input is left untouched.
    ///
    /// Full-mode histograms are first projected onto their `r = r'` diagonal and
    /// folded along the angular axis (see [`diagonal_projection`]).
    pub fn apply(&self, theta: &Theta) -> Array2<f64> {
        match theta {
            Theta::Slice(data) => self.correct(data.clone()),
            Theta::Full(data) => self.correct(diagonal_projection(data)),
        }
    }

    /// Applies both corrections to a rank-2 `(r, theta)` array.
    pub fn correct(&self, mut data: Array2<f64>) -> Array2<f64> {
        let (radial_bins, angular_bins) = data.dim();
        if radial_bins == 0 || angular_bins == 0 {
            return data;
        }
        for ((i, t), value) in data.indexed_iter_mut() {
            if t > 0 {
                let theta = PI * t as f64 / angular_bins as f64;
                *value /= (theta.sin() + ANGULAR_OFFSET).abs();
            }
            let r = i as f64 * self.probe_radius / radial_bins as f64;
            if r > RADIAL_THRESHOLD {
                *value /= r.powf(self.radial_power);
            }
        }
        data
    }
}

/// Projects a `(r, r', theta)` histogram onto its `r = r'` diagonal and adds the
/// angular mirror image, `data[i, t] = raw[i, i, t] + raw[i, i, n_t - 1 - t]`.
pub fn diagonal_projection(raw: &Array3<f64>) -> Array2<f64> {
    let (radial_bins, _, angular_bins) = raw.dim();
    let mut data = Array2::zeros((radial_bins, angular_bins));
    for i in 0..radial_bins {
        data.row_mut(i).assign(&raw.slice(s![i, i, ..]));
    }
    let mirrored = data.slice(s![.., ..;-1]).to_owned();
    data += &mirrored;
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::histogram::{BinGrid, PadfMode};

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn first_angular_bin_and_short_radii_are_untouched() {
        let correction = Correction::new(2.0, 2.0);
        let data = Array2::from_elem((4, 3), 1.0);
        let corrected = correction.correct(data);
        // r = i * 2.0 / 4 stays <= 1 for i <= 2.
        assert_eq!(corrected[[0, 0]], 1.0);
        assert_eq!(corrected[[2, 0]], 1.0);
    }

    #[test]
    fn angular_term_divides_by_offset_sine() {
        let correction = Correction::new(2.0, 2.0);
        let corrected = correction.correct(Array2::from_elem((4, 3), 1.0));
        let expected = 1.0 / ((PI / 3.0).sin() + ANGULAR_OFFSET).abs();
        assert!(f64_approx_equal(corrected[[0, 1]], expected));
    }

    #[test]
    fn radial_term_applies_beyond_one_angstrom() {
        let correction = Correction::new(2.0, 2.0);
        let corrected = correction.correct(Array2::from_elem((4, 3), 1.0));
        // i = 3 gives r = 1.5.
        assert!(f64_approx_equal(corrected[[3, 0]], 1.0 / 2.25));
    }

    #[test]
    fn apply_leaves_the_raw_histogram_unchanged() {
        let grid = BinGrid::new(2.0, 0.5, 60.0);
        let mut theta = Theta::zeros(PadfMode::Slice, &grid);
        theta.record(&grid, 1.9, 1.9, 1.0);
        let before = theta.clone();

        let corrected = correction_for(&grid).apply(&theta);
        assert_eq!(theta, before);
        assert_ne!(corrected.sum(), theta.total());
    }

    #[test]
    fn double_correction_differs_from_single_correction() {
        let correction = Correction::new(4.0, 2.0);
        let data = Array2::from_elem((4, 6), 2.0);
        let once = correction.correct(data.clone());
        let twice = correction.correct(once.clone());
        assert_ne!(once, twice);
    }

    #[test]
    fn diagonal_projection_folds_the_angular_axis() {
        let mut raw = Array3::zeros((2, 2, 3));
        raw[[0, 0, 0]] = 1.0;
        raw[[1, 1, 1]] = 5.0;
        raw[[0, 1, 0]] = 100.0;

        let data = diagonal_projection(&raw);
        assert_eq!(data.dim(), (2, 3));
        assert_eq!(data.row(0).to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(data.row(1).to_vec(), vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn full_mode_output_is_rank_two() {
        let grid = BinGrid::new(3.0, 1.0, 30.0);
        let theta = Theta::zeros(PadfMode::Full, &grid);
        let corrected = correction_for(&grid).apply(&theta);
        assert_eq!(corrected.dim(), (3, 6));
    }

    fn correction_for(grid: &BinGrid) -> Correction {
        Correction::new(grid.probe_radius(), 2.0)
    }
}
