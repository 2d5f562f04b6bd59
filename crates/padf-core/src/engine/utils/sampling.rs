use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

use crate::core::models::atom::Atom;

/// Shuffles the subject atoms and keeps at most `sample_size` of them.
///
/// `None` keeps every atom, in shuffled order. A sample size larger than the
/// subject set also keeps every atom.
#[instrument(level = "debug", skip_all, fields(available = subjects.len(), requested = ?sample_size))]
pub fn select_subjects(
    subjects: &[Atom],
    sample_size: Option<usize>,
    rng: &mut impl Rng,
) -> Vec<Atom> {
    let mut selected = subjects.to_vec();
    selected.shuffle(rng);

    if let Some(size) = sample_size {
        if size > selected.len() {
            warn!(
                "Requested {} subject atoms but only {} are available; using all of them.",
                size,
                selected.len()
            );
        }
        selected.truncate(size);
        info!("Subject set now includes {} atoms.", selected.len());
    }
    selected
}
