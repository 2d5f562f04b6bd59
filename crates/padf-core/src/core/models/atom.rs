use nalgebra::Point3;

/// A single atom, represented by its Cartesian position in Angstroms.
///
/// Atoms carry no identity beyond their coordinates; a correlation only ever
/// depends on where the atoms are.
pub type Atom = Point3<f64>;

/// The two atom sets a PADF calculation operates on.
///
/// The subject set holds the correlation centers (typically the asymmetric unit),
/// while the extended set is the symmetry- and translation-expanded environment
/// those centers are correlated against. Both sets are read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    subject: Vec<Atom>,
    extended: Vec<Atom>,
}

impl Structure {
    /// Creates a structure from its subject and extended atom sets.
    ///
    /// # Arguments
    ///
    /// * `subject` - The atoms used as correlation centers.
    /// * `extended` - The neighbor environment of the subject atoms.
    pub fn new(subject: Vec<Atom>, extended: Vec<Atom>) -> Self {
        Self { subject, extended }
    }

    /// Returns the subject atoms in load order.
    pub fn subject(&self) -> &[Atom] {
        &self.subject
    }

    /// Returns the extended (environment) atoms in load order.
    pub fn extended(&self) -> &[Atom] {
        &self.extended
    }

    /// Returns `true` if every coordinate of every atom is finite.
    pub fn is_finite(&self) -> bool {
        self.subject
            .iter()
            .chain(self.extended.iter())
            .all(|atom| atom.coords.iter().all(|c| c.is_finite()))
    }
}

/// Converts an atom to the fixed-size array layout used by spatial indices.
#[inline]
pub fn as_array(atom: &Atom) -> [f64; 3] {
    [atom.x, atom.y, atom.z]
}
