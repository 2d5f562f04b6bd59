//! # Engine Module
//!
//! This module implements the correlation engine that turns a structure's atom sets
//! into a pair-angle distribution histogram.
//!
//! ## Overview
//!
//! Subject atoms are dispatched in fixed-size chunks to a bounded worker pool. Each
//! worker accumulates the three- and four-body correlations around one center atom
//! into a private histogram and hands it back over a channel. The dispatcher reduces
//! the partial histograms of a chunk into a loop histogram, persists it through a
//! result sink, and optionally stops early once successive cumulative histograms agree.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Histogram, sampling, execution and convergence settings
//! - **State Tracking** ([`state`]) - The run state threaded through the dispatch loops
//! - **Progress Monitoring** ([`progress`]) - Progress reporting callbacks
//! - **Error Handling** ([`error`]) - Engine-specific error types
//! - **Correction** ([`correction`]) - Angular and radial normalization of histograms
//! - **Convergence** ([`convergence`]) - Cosine-similarity based early termination
//! - **Result Sinks** ([`sink`]) - In-memory and `.npy` directory persistence

pub mod config;
pub mod convergence;
pub mod correction;
pub mod dispatcher;
pub mod error;
pub mod progress;
pub mod sink;
pub mod state;
pub mod tasks;
pub(crate) mod utils;
