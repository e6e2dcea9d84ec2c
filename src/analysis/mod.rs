//! Aggregation of source counts into per-project contributions.

pub mod aggregator;

pub use aggregator::*;
