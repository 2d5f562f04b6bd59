use itertools::Itertools;
use tracing::{instrument, trace};

use super::Accumulator;
use crate::core::models::atom::{Atom, as_array};
use crate::core::models::histogram::{BinGrid, PadfMode, Theta};
use crate::core::utils::geometry::{angle, difference, distance};
use crate::core::utils::neighbors::NeighborIndex;
use crate::engine::config::PadfConfig;
use crate::engine::error::EngineError;

/// Three- and four-body correlation kernel over a fixed extended atom set.
///
/// For a center `a_i` with neighbor sphere `S`, every ordered pair `(a_j, a_k)` in
/// `S x S` contributes `(r_ij, theta)` in slice mode or `(r_ij, r_ik, theta)` in full
/// mode, where `theta` is the angle between `a_j - a_i` and `a_k - a_i`. With the
/// four-body term enabled, each binned pair additionally contributes one count per
/// atom `a_m` in the sphere around `a_k`, using the angle between `a_j - a_i` and
/// `a_m - a_k`. In slice mode only radii within one radial bin width of `r_ij` are kept.
#[derive(Debug, Clone)]
pub struct CorrelationAccumulator<'a> {
    index: NeighborIndex<'a>,
    grid: BinGrid,
    mode: PadfMode,
    four_body: bool,
}

impl<'a> CorrelationAccumulator<'a> {
    pub fn new(extended: &'a [Atom], grid: BinGrid, mode: PadfMode, four_body: bool) -> Self {
        Self {
            index: NeighborIndex::build(extended, grid.probe_radius()),
            grid,
            mode,
            four_body,
        }
    }

    pub fn from_config(extended: &'a [Atom], config: &PadfConfig) -> Self {
        Self::new(
            extended,
            config.bin_grid(),
            config.histogram.mode,
            config.sampling.four_body,
        )
    }

    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    pub fn mode(&self) -> PadfMode {
        self.mode
    }

    fn within_slice(&self, r: f64, r_prime: f64) -> bool {
        self.mode == PadfMode::Full || (r - r_prime).abs() < self.grid.radial_bin_width()
    }
}

impl Accumulator for CorrelationAccumulator<'_> {
    #[instrument(level = "debug", skip_all, fields(center = ?as_array(center)))]
    fn accumulate(&self, center: &Atom) -> Result<Theta, EngineError> {
        if !center.coords.iter().all(|c| c.is_finite()) {
            return Err(EngineError::Accumulation {
                center: as_array(center),
                reason: "center atom has non-finite coordinates".to_string(),
            });
        }

        let probe = self.grid.probe_radius();
        let mut histogram = Theta::zeros(self.mode, &self.grid);
        let sphere = self.index.sphere(center, probe);
        trace!(neighbors = sphere.len(), "Built correlation sphere");

        let outer_spheres: Vec<Vec<usize>> = if self.four_body {
            sphere
                .iter()
                .map(|&k| self.index.sphere(self.index.atom(k), probe))
                .collect()
        } else {
            Vec::new()
        };

        for (&j, (k_pos, &k)) in sphere.iter().cartesian_product(sphere.iter().enumerate()) {
            let a_j = self.index.atom(j);
            let a_k = self.index.atom(k);
            let r_ij = distance(center, a_j);
            let r_ik = distance(center, a_k);
            if !self.within_slice(r_ij, r_ik) {
                continue;
            }

            let ij = difference(center, a_j);
            let Ok(theta) = angle(&ij, &difference(center, a_k)) else {
                continue;
            };
            histogram.record(&self.grid, r_ij, r_ik, theta);

            if !self.four_body {
                continue;
            }
            for &m in &outer_spheres[k_pos] {
                let a_m = self.index.atom(m);
                let r_km = distance(a_k, a_m);
                if !self.within_slice(r_ij, r_km) {
                    continue;
                }
                if let Ok(theta_km) = angle(&ij, &difference(a_k, a_m)) {
                    histogram.record(&self.grid, r_ij, r_km, theta_km);
                }
            }
        }

        Ok(histogram)
    }

    fn empty_histogram(&self) -> Theta {
        Theta::zeros(self.mode, &self.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn origin() -> Atom {
        Point3::origin()
    }

    #[test]
    fn two_perpendicular_neighbors_fill_one_slice_bin() {
        let extended = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let grid = BinGrid::new(2.0, 1.0, 90.0);
        let accumulator = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, false);

        let histogram = accumulator.accumulate(&origin()).unwrap();
        assert_eq!(histogram.shape(), &[2, 2]);
        assert_eq!(histogram.get(&[0, 1]), Some(2.0));
        assert_eq!(histogram.total(), 2.0);
    }

    #[test]
    fn full_mode_counts_every_ordered_pair_of_distinct_neighbors() {
        let extended = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.2, 0.0),
            Point3::new(0.0, 0.0, 0.7),
            Point3::new(-0.5, 0.5, 0.3),
            Point3::new(0.9, 0.9, 0.9),
            Point3::new(5.0, 0.0, 0.0),
        ];
        let grid = BinGrid::new(2.0, 0.25, 5.0);
        let accumulator = CorrelationAccumulator::new(&extended, grid, PadfMode::Full, false);

        let histogram = accumulator.accumulate(&origin()).unwrap();
        let neighbors = 5.0;
        assert_eq!(histogram.total(), neighbors * neighbors - neighbors);
    }

    #[test]
    fn four_body_term_adds_outer_sphere_correlations() {
        let extended = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let grid = BinGrid::new(1.5, 0.5, 45.0);

        let three_body = CorrelationAccumulator::new(&extended, grid, PadfMode::Full, false)
            .accumulate(&origin())
            .unwrap();
        assert_eq!(three_body.total(), 2.0);
        assert_eq!(three_body.get(&[1, 1, 2]), Some(2.0));

        let four_body = CorrelationAccumulator::new(&extended, grid, PadfMode::Full, true)
            .accumulate(&origin())
            .unwrap();
        assert_eq!(four_body.total(), 4.0);
        assert_eq!(four_body.get(&[1, 2, 1]), Some(2.0));
    }

    #[test]
    fn slice_four_body_keeps_only_outer_atoms_within_one_radial_bin() {
        // B sees A at sqrt(2) and C at 1.8; A sees B at sqrt(2) and C at ~2.97.
        // Only the sqrt(2) outer distances stay within 0.5 of r_ij = 1.
        let extended = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 2.8, 0.0),
        ];
        let grid = BinGrid::new(3.0, 0.5, 45.0);

        let three_body = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, false)
            .accumulate(&origin())
            .unwrap();
        assert_eq!(three_body.shape(), &[6, 4]);
        assert_eq!(three_body.get(&[1, 2]), Some(2.0));
        assert_eq!(three_body.total(), 2.0);

        let four_body = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, true)
            .accumulate(&origin())
            .unwrap();
        assert_eq!(four_body.get(&[1, 2]), Some(2.0));
        assert_eq!(four_body.get(&[1, 1]), Some(2.0));
        assert_eq!(four_body.total(), 4.0);
    }

    #[test]
    fn antiparallel_neighbors_are_not_binned() {
        let extended = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(-1.0, 0.0, 0.0)];
        let grid = BinGrid::new(2.0, 1.0, 90.0);
        for four_body in [false, true] {
            let histogram = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, four_body)
                .accumulate(&origin())
                .unwrap();
            assert_eq!(histogram.total(), 0.0);
        }
    }

    #[test]
    fn slice_mode_skips_pairs_with_unequal_radii() {
        let extended = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.8, 0.0)];
        let grid = BinGrid::new(2.0, 0.5, 90.0);
        let histogram = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, false)
            .accumulate(&origin())
            .unwrap();
        assert_eq!(histogram.total(), 0.0);
    }

    #[test]
    fn isolated_center_yields_an_empty_histogram() {
        let extended = vec![Point3::new(9.0, 9.0, 9.0)];
        let grid = BinGrid::new(2.0, 1.0, 90.0);
        let accumulator = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, true);
        let histogram = accumulator.accumulate(&origin()).unwrap();
        assert_eq!(histogram, accumulator.empty_histogram());
    }

    #[test]
    fn non_finite_center_is_an_accumulation_failure() {
        let extended = vec![Point3::new(1.0, 0.0, 0.0)];
        let grid = BinGrid::new(2.0, 1.0, 90.0);
        let accumulator = CorrelationAccumulator::new(&extended, grid, PadfMode::Slice, false);
        let result = accumulator.accumulate(&Point3::new(f64::NAN, 0.0, 0.0));
        assert!(matches!(result, Err(EngineError::Accumulation { .. })));
    }
}
