use std::collections::HashMap;

use super::geometry::distance;
use crate::core::models::atom::Atom;

type CellKey = [i64; 3];

/// Returns `true` if `candidate` lies inside the probe sphere around `center`.
///
/// The sphere is closed at the probe radius but excludes its own center: an atom
/// at exactly zero distance (the center itself, or a coincident copy) never counts.
#[inline]
pub fn is_neighbor(probe_radius: f64, center: &Atom, candidate: &Atom) -> bool {
    let d = distance(center, candidate);
    d != 0.0 && d <= probe_radius
}

/// Collects every candidate within the probe sphere of `center`, in candidate order.
pub fn find_neighbors(probe_radius: f64, center: &Atom, candidates: &[Atom]) -> Vec<Atom> {
    candidates
        .iter()
        .filter(|candidate| is_neighbor(probe_radius, center, candidate))
        .copied()
        .collect()
}

/// A uniform cell list over an atom set, answering neighbor-sphere queries by index.
///
/// Queries visit only the cells that can intersect the probe sphere and then apply
/// the exact [`is_neighbor`] predicate, so results are identical to
/// [`find_neighbors`]. Indices are returned in ascending (candidate) order.
#[derive(Debug, Clone)]
pub struct NeighborIndex<'a> {
    atoms: &'a [Atom],
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl<'a> NeighborIndex<'a> {
    /// Bins `atoms` into cubic cells of edge `cell_size` (typically the probe radius).
    pub fn build(atoms: &'a [Atom], cell_size: f64) -> Self {
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for (index, atom) in atoms.iter().enumerate() {
            cells
                .entry(cell_key(atom, cell_size))
                .or_default()
                .push(index);
        }
        Self {
            atoms,
            cell_size,
            cells,
        }
    }

    pub fn atoms(&self) -> &'a [Atom] {
        self.atoms
    }

    pub fn atom(&self, index: usize) -> &'a Atom {
        &self.atoms[index]
    }

    /// Indices of all atoms within `probe_radius` of `center`, excluding zero distance.
    pub fn sphere(&self, center: &Atom, probe_radius: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .candidates(center, probe_radius)
            .filter(|&i| is_neighbor(probe_radius, center, &self.atoms[i]))
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Returns `true` if any indexed atom lies within `radius` of `point`.
    ///
    /// Unlike [`sphere`](Self::sphere), an atom coinciding with `point` counts.
    pub fn any_within(&self, point: &Atom, radius: f64) -> bool {
        self.candidates(point, radius)
            .any(|i| distance(point, &self.atoms[i]) <= radius)
    }

    /// Indices stored in every cell that can intersect the ball of `radius` around `center`.
    fn candidates<'s>(&'s self, center: &Atom, radius: f64) -> impl Iterator<Item = usize> + 's {
        let reach = (radius / self.cell_size).ceil().max(1.0) as i64;
        let [cx, cy, cz] = cell_key(center, self.cell_size);
        (-reach..=reach)
            .flat_map(move |dx| (-reach..=reach).map(move |dy| (dx, dy)))
            .flat_map(move |(dx, dy)| (-reach..=reach).map(move |dz| (dx, dy, dz)))
            .filter_map(move |(dx, dy, dz)| {
                self.cells.get(&[
                    cx.saturating_add(dx),
                    cy.saturating_add(dy),
                    cz.saturating_add(dz),
                ])
            })
            .flat_map(|members| members.iter().copied())
    }
}

fn cell_key(atom: &Atom, cell_size: f64) -> CellKey {
    [
        (atom.x / cell_size).floor() as i64,
        (atom.y / cell_size).floor() as i64,
        (atom.z / cell_size).floor() as i64,
    ]
}
