//! # Model PADF Core Library
//!
//! A parallel engine for computing the pair-angle distribution function (PADF) of an
//! atomic model: a histogram over radial distances and subtended angles that captures
//! the three-body and four-body geometry around every subject atom of a crystal.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture to keep each concern testable on its own.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`, `Theta`), the
//!   geometry kernel, neighbor-sphere search, and coordinate file readers.
//!
//! - **[`engine`]: The Logic Core.** Run configuration, the correlation accumulator,
//!   the parallel dispatcher with its per-loop reduction, post-process correction,
//!   convergence monitoring, and result sinks.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a complete
//!   PADF calculation, from atom-set preparation to the final cumulative histogram.

pub mod core;
pub mod engine;
pub mod workflows;
