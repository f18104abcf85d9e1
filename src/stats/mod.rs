//! Online, mergeable accumulators
//!
//! Everything in this module is a sufficient statistic that can be updated one
//! sample at a time and merged with another instance in O(1):
//! - `Covariance` / `Covariances`: (Σxy, Σx, Σy, n) per lag
//! - `MeanVariance` / `MeanVariances`: Welford mean and M2 per lag
//! - `Calculator`: the `Cs`, `Cr`, `Ct` lag tables fed together
//! - `GenomeAggregator`: across-chunk summary of chunk calculators
//! - `RateAggregator`: across-chunk summary of diversity covariance tables

mod aggregate;
mod calculator;
mod covariance;
mod mean_variance;

pub use aggregate::{
    GenomeAggregator, LagRow, RateAggregator, RateRow, DEFAULT_MIN_CHUNK_SAMPLES,
};
pub use calculator::Calculator;
pub use covariance::{Covariance, Covariances};
pub use mean_variance::{MeanVariance, MeanVariances};
