//! # Workflows Module
//!
//! High-level entry points that run a complete PADF calculation.
//!
//! ## Overview
//!
//! A workflow takes a loaded [`Structure`](crate::core::models::atom::Structure) and a
//! validated [`PadfConfig`](crate::engine::config::PadfConfig), prepares the atom sets,
//! drives the parallel dispatcher, and produces the final raw and corrected histograms
//! through a [`ResultSink`](crate::engine::sink::ResultSink).
//!
//! - **PADF Workflow** ([`padf`]) - Subject sampling, extended-set filtering, chunked
//!   correlation with optional convergence monitoring, and final correction.

pub mod padf;
