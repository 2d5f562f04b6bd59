//! # Core Models Module
//!
//! This module contains the data structures shared by every stage of a PADF calculation.
//!
//! ## Key Components
//!
//! - [`atom`] - Cartesian atoms and the subject/extended atom sets of a structure
//! - [`histogram`] - The accumulation mode, the bin grid, and the `Theta` histogram tensor
//!
//! ## Usage
//!
//! ```ignore
//! use modelpadf::core::models::{atom::Structure, histogram::{BinGrid, PadfMode, Theta}};
//!
//! let structure = Structure::new(subject_atoms, extended_atoms);
//! let grid = BinGrid::new(10.0, 0.1, 2.0);
//! let theta = Theta::zeros(PadfMode::Slice, &grid);
//! ```

pub mod atom;
pub mod histogram;
