//! # Position-lag correlation of pileup diversity
//!
//! This library measures how read-level diversity at one genome position
//! covaries with diversity at a position `l` bases away, for every lag
//! `0 ≤ l < maxL`, over an ordered stream of pileup sites.
//!
//! ## Pipeline
//!
//! 1. **Chunking**: the site stream is cut into fixed-size genomic chunks
//! 2. **Windowing**: each site anchors one window of the sites within `maxL`
//! 3. **Pairing**: reads shared between anchor and candidate yield difference
//!    indicators, summarised per window by a covariance accumulator
//! 4. **Reduction**: per-worker calculators merge into a chunk calculator, and
//!    chunk-level scalars are summarised genome-wide
//!
//! Three statistics are reported per lag: `Cs` (mean per-window covariance),
//! `Cr` (covariance of per-window means) and `Ct` (pooled covariance of every
//! raw sample). A lighter variant, [`RateCorrelator`], skips read pairing and
//! correlates per-site nucleotide diversity directly.
//!
//! ## Usage Example
//!
//! ```ignore
//! use pcorr::{CorrelationConfig, LagCorrelator};
//! use pcorr::genomics::PileupReader;
//!
//! let config = CorrelationConfig::new(300).with_workers(4);
//! let correlator = LagCorrelator::new(config)?;
//! let result = correlator.run(PileupReader::new(std::io::stdin().lock()))?;
//! for row in &result.rows {
//!     println!("{} {}", row.lag, row.ct_mean);
//! }
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod framework; // Generic worker pool
pub mod genomics;  // Sites, readers, pairing, chunking, reports
pub mod stats;     // Online accumulators and lag tables

pub use framework::{FrameworkError, PoolConfig, WorkerPool};
pub use genomics::{
    Chunk, ChunkSplitter, CorrelationResult, InputError, LagCorrelator, OrderingError,
    PairingParams, RateCorrelator, RateResult, Region, Site,
};
pub use stats::{
    Calculator, GenomeAggregator, LagRow, RateAggregator, RateRow, DEFAULT_MIN_CHUNK_SAMPLES,
};

use thiserror::Error;

/// Default minimum number of read pairs for a lag to be compared.
pub const DEFAULT_MIN_COVERAGE: usize = 2;

/// Default chunk width in bases.
pub const DEFAULT_CHUNK_SIZE: u64 = 100_000;

/// Configuration of one correlation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// Lags `0..max_lag` are measured.
    pub max_lag: usize,
    /// Lags with fewer read pairs are skipped.
    pub min_coverage: usize,
    /// Chunks with at most this many windows at a lag are left out of the
    /// genome-wide estimate for that lag.
    pub min_chunk_samples: u64,
    /// Chunk width in bases.
    pub chunk_size: u64,
    /// First position analysed.
    pub region_start: u64,
    /// First position no longer analysed (`None` = end of reference).
    pub region_end: Option<u64>,
    /// Worker threads.
    pub num_workers: usize,
    /// Job queue depth (`None` = twice the worker count).
    pub queue_capacity: Option<usize>,
    /// Verbose diagnostics.
    pub debug: bool,
}

impl CorrelationConfig {
    /// Construct a configuration for lags `0..max_lag` with default thresholds
    /// and one worker per logical CPU.
    pub fn new(max_lag: usize) -> Self {
        Self {
            max_lag,
            min_coverage: DEFAULT_MIN_COVERAGE,
            min_chunk_samples: DEFAULT_MIN_CHUNK_SAMPLES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            region_start: 0,
            region_end: None,
            num_workers: num_cpus::get().max(1),
            queue_capacity: None,
            debug: false,
        }
    }

    /// Set the minimum read-pair coverage.
    pub fn with_min_coverage(mut self, min_coverage: usize) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    /// Set the per-chunk sample threshold.
    pub fn with_min_chunk_samples(mut self, min_chunk_samples: u64) -> Self {
        self.min_chunk_samples = min_chunk_samples;
        self
    }

    /// Set the chunk width.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Restrict the analysis to `start..end`.
    pub fn with_region(mut self, start: u64, end: Option<u64>) -> Self {
        self.region_start = start;
        self.region_end = end;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the job queue depth.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = Some(queue_capacity);
        self
    }

    /// Enable debug diagnostics.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), CorrelationError> {
        if self.max_lag == 0 {
            return Err(CorrelationError::InvalidConfiguration(
                "max lag must be > 0".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(CorrelationError::InvalidConfiguration(
                "chunk size must be > 0".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(CorrelationError::InvalidConfiguration(
                "number of workers must be > 0".to_string(),
            ));
        }
        if let Some(end) = self.region_end {
            if end <= self.region_start {
                return Err(CorrelationError::InvalidConfiguration(format!(
                    "region end {end} must be greater than region start {}",
                    self.region_start
                )));
            }
        }
        Ok(())
    }

    /// Pool sizing derived from this configuration.
    pub fn pool_config(&self) -> Result<PoolConfig, FrameworkError> {
        let pool = PoolConfig::new(self.num_workers)?;
        Ok(match self.queue_capacity {
            Some(capacity) => pool.with_queue_capacity(capacity),
            None => pool,
        })
    }

    /// Pair comparison parameters.
    pub fn pairing_params(&self) -> PairingParams {
        PairingParams::new(self.max_lag, self.min_coverage)
    }

    /// Analysed region.
    pub fn region(&self) -> Region {
        Region::new(self.region_start, self.region_end)
    }
}

/// Errors that abort a correlation run.
#[derive(Error, Debug)]
pub enum CorrelationError {
    /// Configuration rejected before any work started.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input sites were not sorted.
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    /// Input could not be read or parsed.
    #[error("input error: {0}")]
    Input(InputError),

    /// Worker pool failure.
    #[error("worker pool error: {0}")]
    Framework(#[from] FrameworkError),
}

impl From<InputError> for CorrelationError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Ordering(err) => CorrelationError::Ordering(err),
            other => CorrelationError::Input(other),
        }
    }
}
