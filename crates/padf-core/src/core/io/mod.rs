//! Provides readers for the coordinate files that feed a PADF calculation.
//!
//! Subject atoms usually come from a CIF describing the asymmetric unit, and the
//! extended environment from an XYZ file produced by an upstream expansion tool.
//! [`read_coordinates`] picks the reader from the file extension.

pub mod cif;
pub mod traits;
pub mod xyz;

use crate::core::models::atom::Atom;
use cif::{CifError, CifFile, CifOptions};
use std::path::Path;
use thiserror::Error;
use traits::CoordinateFile;
use xyz::{XyzError, XyzFile};

#[derive(Debug, Error)]
pub enum CoordinateError {
    #[error(transparent)]
    Xyz(#[from] XyzError),
    #[error(transparent)]
    Cif(#[from] CifError),
    #[error("Unsupported coordinate file format: '{0}' (expected .xyz or .cif)")]
    UnsupportedFormat(String),
}

/// Reads atom coordinates from `path`, choosing the reader by extension.
///
/// # Arguments
///
/// * `path` - A `.xyz` or `.cif` file.
/// * `cif_options` - Options applied when the file is a CIF.
///
/// # Errors
///
/// Returns [`CoordinateError::UnsupportedFormat`] for any other extension, or the
/// reader's error if parsing fails.
pub fn read_coordinates(path: &Path, cif_options: &CifOptions) -> Result<Vec<Atom>, CoordinateError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xyz" => Ok(XyzFile::read_from_path(path, &())?),
        "cif" => Ok(CifFile::read_from_path(path, cif_options)?),
        _ => Err(CoordinateError::UnsupportedFormat(
            path.display().to_string(),
        )),
    }
}
