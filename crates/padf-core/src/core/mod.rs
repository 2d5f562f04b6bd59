//! # Core Module
//!
//! This module provides the fundamental building blocks of a model PADF calculation.
//!
//! ## Overview
//!
//! Everything in `core` is stateless: atom sets are immutable once loaded, the geometry
//! kernel consists of pure functions, and the histogram type only knows how to bin and
//! sum. Higher layers compose these pieces into a parallel calculation.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Atom sets, bin grids, and the `Theta` histogram tensor
//! - **Geometry & Search** ([`utils`]) - Distance/angle primitives and neighbor spheres
//! - **File I/O** ([`io`]) - Readers for XYZ and CIF coordinate files

pub mod io;
pub mod models;
pub mod utils;
