use crate::core::io::traits::CoordinateFile;
use crate::core::models::atom::Atom;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: CifParseErrorKind },
    #[error("No _atom_site_ loop with fractional coordinates was found")]
    MissingAtomSiteLoop,
    #[error("Unit cell is incomplete: missing {0}")]
    MissingCellParameter(&'static str),
    #[error("Unit cell is degenerate: {0:?}")]
    DegenerateCell(UnitCell),
}

#[derive(Debug, Error)]
pub enum CifParseErrorKind {
    #[error("Invalid number for {tag} (value: '{value}')")]
    InvalidNumber { tag: String, value: String },
}

/// Lattice parameters of a crystal: edge lengths in Angstroms, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        }
    }

    /// Matrix mapping fractional coordinates to Cartesian coordinates, with the
    /// `a` axis along x and the `b` axis in the xy plane.
    ///
    /// Returns `None` if the parameters do not describe a cell with positive volume.
    pub fn fractional_to_cartesian(&self) -> Option<Matrix3<f64>> {
        let (cos_alpha, cos_beta, cos_gamma) = (
            cos_degrees(self.alpha),
            cos_degrees(self.beta),
            cos_degrees(self.gamma),
        );
        let sin_gamma = self.gamma.to_radians().sin();
        if sin_gamma <= 0.0 || self.a <= 0.0 || self.b <= 0.0 || self.c <= 0.0 {
            return None;
        }

        let cy = (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz_squared = 1.0 - cos_beta * cos_beta - cy * cy;
        if cz_squared <= 0.0 || !cz_squared.is_finite() {
            return None;
        }

        let a_axis = Vector3::new(self.a, 0.0, 0.0);
        let b_axis = Vector3::new(self.b * cos_gamma, self.b * sin_gamma, 0.0);
        let c_axis = Vector3::new(self.c * cos_beta, self.c * cy, self.c * cz_squared.sqrt());
        Some(Matrix3::from_columns(&[a_axis, b_axis, c_axis]))
    }
}

/// Cosine of an angle in degrees, exact for right angles.
fn cos_degrees(angle: f64) -> f64 {
    if angle == 90.0 {
        0.0
    } else {
        angle.to_radians().cos()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifOptions {
    /// Overrides the `_cell_*` parameters found in the file.
    pub unit_cell: Option<UnitCell>,
    /// Keeps hydrogen and deuterium sites, which are skipped by default.
    pub include_hydrogens: bool,
}

/// Reader for the atom sites of a CIF file (typically the asymmetric unit).
///
/// Fractional coordinates are read from the first `_atom_site_` loop that has
/// `_atom_site_fract_x/y/z` columns; standard uncertainties such as `0.1234(5)`
/// are dropped. Coordinates are converted to Cartesian with the file's unit cell
/// unless one is supplied in [`CifOptions`].
pub struct CifFile;

#[derive(Default)]
struct CellBuilder {
    a: Option<f64>,
    b: Option<f64>,
    c: Option<f64>,
    alpha: Option<f64>,
    beta: Option<f64>,
    gamma: Option<f64>,
}

impl CellBuilder {
    fn slot(&mut self, tag: &str) -> Option<&mut Option<f64>> {
        match tag {
            "_cell_length_a" => Some(&mut self.a),
            "_cell_length_b" => Some(&mut self.b),
            "_cell_length_c" => Some(&mut self.c),
            "_cell_angle_alpha" => Some(&mut self.alpha),
            "_cell_angle_beta" => Some(&mut self.beta),
            "_cell_angle_gamma" => Some(&mut self.gamma),
            _ => None,
        }
    }

    fn build(self) -> Result<UnitCell, CifError> {
        Ok(UnitCell {
            a: self.a.ok_or(CifError::MissingCellParameter("_cell_length_a"))?,
            b: self.b.ok_or(CifError::MissingCellParameter("_cell_length_b"))?,
            c: self.c.ok_or(CifError::MissingCellParameter("_cell_length_c"))?,
            alpha: self.alpha.unwrap_or(90.0),
            beta: self.beta.unwrap_or(90.0),
            gamma: self.gamma.unwrap_or(90.0),
        })
    }
}

struct AtomSiteColumns {
    fract: [usize; 3],
    symbol: Option<usize>,
    width: usize,
}

impl AtomSiteColumns {
    fn locate(headers: &[String]) -> Option<Self> {
        let find = |tag: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(tag));
        let fract = [
            find("_atom_site_fract_x")?,
            find("_atom_site_fract_y")?,
            find("_atom_site_fract_z")?,
        ];
        let symbol = find("_atom_site_type_symbol").or_else(|| find("_atom_site_label"));
        Some(Self {
            fract,
            symbol,
            width: headers.len(),
        })
    }
}

enum State {
    Scanning,
    LoopHeaders(Vec<String>),
    AtomRows(AtomSiteColumns),
    OtherLoop,
}

fn strip_uncertainty(value: &str) -> &str {
    value.split('(').next().unwrap_or(value)
}

fn parse_number(value: &str, tag: &str, line: usize) -> Result<f64, CifError> {
    strip_uncertainty(value)
        .parse()
        .map_err(|_| CifError::Parse {
            line,
            kind: CifParseErrorKind::InvalidNumber {
                tag: tag.to_string(),
                value: value.to_string(),
            },
        })
}

/// `H` or `D` not followed by a lowercase letter (so `Hg` or `Dy` are kept).
fn is_hydrogen(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    matches!(chars.next(), Some('H' | 'D'))
        && !matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
}

impl CoordinateFile for CifFile {
    type Options = CifOptions;
    type Error = CifError;

    fn read_from(reader: &mut impl BufRead, options: &CifOptions) -> Result<Vec<Atom>, CifError> {
        let mut cell = CellBuilder::default();
        let mut fractional: Vec<Vector3<f64>> = Vec::new();
        let mut found_atom_loop = false;
        let mut state = State::Scanning;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                if matches!(state, State::AtomRows(_)) {
                    state = State::Scanning;
                }
                continue;
            }

            if trimmed.starts_with('_') {
                if let State::LoopHeaders(headers) = &mut state {
                    headers.push(trimmed.split_whitespace().next().unwrap_or("").to_string());
                    continue;
                }
                state = State::Scanning;
                let mut fields = trimmed.split_whitespace();
                let tag = fields.next().unwrap_or("");
                if let (Some(slot), Some(value)) = (cell.slot(tag), fields.next()) {
                    *slot = Some(parse_number(value, tag, line_num)?);
                }
                continue;
            }

            if trimmed.eq_ignore_ascii_case("loop_") {
                state = State::LoopHeaders(Vec::new());
                continue;
            }

            if let State::LoopHeaders(headers) = &state {
                state = match AtomSiteColumns::locate(headers) {
                    Some(columns) if !found_atom_loop => {
                        found_atom_loop = true;
                        State::AtomRows(columns)
                    }
                    _ => State::OtherLoop,
                };
            }

            if let State::AtomRows(columns) = &state {
                let fields: Vec<&str> = trimmed.split_whitespace().collect();
                if fields.len() != columns.width {
                    continue;
                }
                if !options.include_hydrogens
                    && columns.symbol.is_some_and(|i| is_hydrogen(fields[i]))
                {
                    continue;
                }
                let tags = ["_atom_site_fract_x", "_atom_site_fract_y", "_atom_site_fract_z"];
                let mut xyz = [0.0; 3];
                for axis in 0..3 {
                    xyz[axis] = parse_number(fields[columns.fract[axis]], tags[axis], line_num)?;
                }
                fractional.push(Vector3::from(xyz));
            }
        }

        if !found_atom_loop {
            return Err(CifError::MissingAtomSiteLoop);
        }

        let unit_cell = match options.unit_cell {
            Some(cell) => cell,
            None => cell.build()?,
        };
        let to_cartesian = unit_cell
            .fractional_to_cartesian()
            .ok_or(CifError::DegenerateCell(unit_cell))?;

        Ok(fractional
            .into_iter()
            .map(|f| Point3::from(to_cartesian * f))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TOLERANCE: f64 = 1e-9;

    const SAMPLE_CIF: &str = "\
data_sample
_cell_length_a 10.0(2)
_cell_length_b 20.0
_cell_length_c 5.0
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90

loop_
_symmetry_equiv_pos_as_xyz
x,y,z

loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_type_symbol
C1 0.1000(3) 0.5 0.2 C
H1 0.2 0.5 0.2 H
Hg1 0.5 0.25 1.0 Hg

_geom_bond_atom_site_label_1 C1
";

    fn read(content: &str, options: &CifOptions) -> Result<Vec<Atom>, CifError> {
        CifFile::read_from(&mut Cursor::new(content), options)
    }

    fn approx_point(a: &Atom, b: &Atom) -> bool {
        (a - b).norm() < TOLERANCE
    }

    #[test]
    fn reads_atom_sites_and_converts_to_cartesian() {
        let atoms = read(SAMPLE_CIF, &CifOptions::default()).unwrap();
        assert_eq!(atoms.len(), 2);
        assert!(approx_point(&atoms[0], &Point3::new(1.0, 10.0, 1.0)));
        assert!(approx_point(&atoms[1], &Point3::new(5.0, 5.0, 5.0)));
    }

    #[test]
    fn hydrogens_are_kept_on_request() {
        let options = CifOptions {
            include_hydrogens: true,
            ..Default::default()
        };
        assert_eq!(read(SAMPLE_CIF, &options).unwrap().len(), 3);
    }

    #[test]
    fn explicit_unit_cell_overrides_file_cell() {
        let options = CifOptions {
            unit_cell: Some(UnitCell::new(1.0, 1.0, 1.0, 90.0, 90.0, 90.0)),
            ..Default::default()
        };
        let atoms = read(SAMPLE_CIF, &options).unwrap();
        assert!(approx_point(&atoms[0], &Point3::new(0.1, 0.5, 0.2)));
    }

    #[test]
    fn missing_cell_length_is_reported() {
        let content = "loop_\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\n0 0 0\n";
        assert!(matches!(
            read(content, &CifOptions::default()),
            Err(CifError::MissingCellParameter("_cell_length_a"))
        ));
    }

    #[test]
    fn file_without_atom_sites_is_rejected() {
        let content = "_cell_length_a 1\n_cell_length_b 1\n_cell_length_c 1\n";
        assert!(matches!(
            read(content, &CifOptions::default()),
            Err(CifError::MissingAtomSiteLoop)
        ));
    }

    #[test]
    fn invalid_fractional_coordinate_reports_line() {
        let content = "_cell_length_a 1\n_cell_length_b 1\n_cell_length_c 1\nloop_\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\n0.1 ? 0.3\n";
        assert!(matches!(
            read(content, &CifOptions::default()),
            Err(CifError::Parse { line: 8, .. })
        ));
    }

    #[test]
    fn oblique_cell_preserves_edge_lengths() {
        let cell = UnitCell::new(3.0, 4.0, 5.0, 80.0, 95.0, 110.0);
        let m = cell.fractional_to_cartesian().unwrap();
        assert!((m.column(0).norm() - 3.0).abs() < TOLERANCE);
        assert!((m.column(1).norm() - 4.0).abs() < TOLERANCE);
        assert!((m.column(2).norm() - 5.0).abs() < TOLERANCE);
        let cos_gamma = m.column(0).dot(&m.column(1)) / 12.0;
        assert!((cos_gamma - 110f64.to_radians().cos()).abs() < TOLERANCE);
    }

    #[test]
    fn degenerate_cell_has_no_conversion() {
        let cell = UnitCell::new(0.0, 1.0, 1.0, 90.0, 90.0, 90.0);
        assert!(cell.fractional_to_cartesian().is_none());
    }

    #[test]
    fn hydrogen_detection_spares_heavier_elements() {
        assert!(is_hydrogen("H"));
        assert!(is_hydrogen("H12"));
        assert!(is_hydrogen("D"));
        assert!(!is_hydrogen("Hg"));
        assert!(!is_hydrogen("Dy1"));
        assert!(!is_hydrogen("C"));
    }
}
