//! Setup helpers used before dispatch: subject sampling and extended-set filtering.

pub mod query;
pub mod sampling;
