use rayon::prelude::*;
use tracing::{info, instrument};

use crate::core::models::atom::Atom;
use crate::core::utils::neighbors::NeighborIndex;

/// Keeps the extended atoms that lie within `probe_radius` of at least one subject atom.
///
/// Subject atoms are binned into a cell list of edge `probe_radius`, so each extended
/// atom is tested only against subjects in adjacent cells. Degenerate subject layouts
/// (planar sheets, long colinear chains, repeated coordinates) are handled the same
/// as any other. Atoms coinciding with a subject atom are kept. The relative order of
/// the extended atoms is preserved.
#[instrument(level = "debug", skip_all, fields(subjects = subjects.len(), extended = extended.len()))]
pub fn filter_extended_atoms(subjects: &[Atom], extended: &[Atom], probe_radius: f64) -> Vec<Atom> {
    if subjects.is_empty() {
        return Vec::new();
    }

    let index = NeighborIndex::build(subjects, probe_radius);
    let kept: Vec<Atom> = extended
        .par_iter()
        .filter(|atom| index.any_within(atom, probe_radius))
        .copied()
        .collect();

    info!(
        "Extended atom set has been reduced to {} atoms within {} radius.",
        kept.len(),
        probe_radius
    );
    kept
}
