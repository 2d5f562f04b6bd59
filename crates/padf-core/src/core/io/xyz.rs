use crate::core::io::traits::CoordinateFile;
use crate::core::models::atom::Atom;
use nalgebra::Point3;
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: invalid coordinate '{value}'")]
    InvalidCoordinate { line: usize, value: String },
}

/// Reader for plain XYZ coordinate files.
///
/// Every line with four fields (`element x y z`) or three fields (`x y z`) is an atom.
/// A leading atom-count line, and the comment line that follows it, are skipped;
/// any other line shape is ignored.
pub struct XyzFile;

impl CoordinateFile for XyzFile {
    type Options = ();
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead, _options: &()) -> Result<Vec<Atom>, XyzError> {
        let mut atoms = Vec::new();
        let mut skip_comment = false;
        let mut seen_content = false;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();

            if fields.is_empty() {
                continue;
            }
            if skip_comment {
                skip_comment = false;
                continue;
            }
            if !seen_content {
                seen_content = true;
                if fields.len() == 1 && fields[0].parse::<usize>().is_ok() {
                    skip_comment = true;
                    continue;
                }
            }

            let coords = match fields.len() {
                4 => &fields[1..4],
                3 => &fields[0..3],
                _ => continue,
            };
            let mut xyz = [0.0; 3];
            for (slot, field) in xyz.iter_mut().zip(coords) {
                *slot = field.parse().map_err(|_| XyzError::InvalidCoordinate {
                    line: line_num,
                    value: field.to_string(),
                })?;
            }
            atoms.push(Point3::from(xyz));
        }

        Ok(atoms)
    }
}
