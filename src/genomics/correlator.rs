use std::sync::Arc;

use tracing::{debug, info};

use crate::framework::{EvaluationResult, WorkerPool};
use crate::genomics::{
    Chunk, ChunkSplitter, ClassFilter, GenomeProfile, PairingProcessor, Site, Windows,
};
use crate::stats::{Calculator, GenomeAggregator, LagRow};
use crate::{CorrelationConfig, CorrelationError};

/// Output of a correlation run.
#[derive(Debug, Clone)]
pub struct CorrelationResult {
    /// Genome-wide statistics, one row per lag.
    pub rows: Vec<LagRow>,
    /// Every window of the run folded into one calculator.
    pub pooled: Calculator,
    /// Chunks processed.
    pub chunks: usize,
    /// Sites that reached the pairing engine.
    pub sites: u64,
    /// Windows dispatched to the pool.
    pub windows: u64,
}

/// Chunked, parallel lag correlator.
#[derive(Debug)]
pub struct LagCorrelator {
    config: CorrelationConfig,
    pool: WorkerPool<PairingProcessor>,
    class_filter: Option<(Arc<GenomeProfile>, ClassFilter)>,
}

impl LagCorrelator {
    /// Create a correlator; the configuration is validated up front.
    pub fn new(config: CorrelationConfig) -> Result<Self, CorrelationError> {
        config.validate()?;
        let processor = PairingProcessor::new(config.pairing_params());
        let pool = WorkerPool::new(processor, config.pool_config()?)?;
        Ok(Self {
            config,
            pool,
            class_filter: None,
        })
    }

    /// Only correlate positions whose class in `profile` passes `filter`.
    pub fn with_class_filter(mut self, profile: Arc<GenomeProfile>, filter: ClassFilter) -> Self {
        self.class_filter = Some((profile, filter));
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Pair every window of one chunk through the worker pool.
    pub fn correlate_chunk(
        &self,
        chunk: Chunk,
    ) -> Result<EvaluationResult<Calculator>, CorrelationError> {
        let sites = chunk.sites.into_iter().map(Ok::<_, CorrelationError>);
        self.pool.evaluate(Windows::new(sites, self.config.max_lag))
    }

    /// Run the full pipeline over an ordered site stream.
    ///
    /// The first input or ordering error aborts the run; no partial result is
    /// returned.
    pub fn run<I, E>(&self, sites: I) -> Result<CorrelationResult, CorrelationError>
    where
        I: IntoIterator<Item = Result<Site, E>>,
        E: Into<CorrelationError>,
    {
        let sites = sites
            .into_iter()
            .map(|site| site.map_err(|err| -> CorrelationError { err.into() }));
        let mut splitter = ChunkSplitter::new(sites, self.config.chunk_size, self.config.region());
        if let Some((profile, filter)) = &self.class_filter {
            splitter = splitter.with_class_filter(Arc::clone(profile), *filter);
        }

        let mut aggregator =
            GenomeAggregator::new(self.config.max_lag, self.config.min_chunk_samples);
        let mut pooled = Calculator::new(self.config.max_lag);
        let mut total_sites = 0u64;
        let mut total_windows = 0u64;

        info!(
            max_lag = self.config.max_lag,
            chunk_size = self.config.chunk_size,
            workers = self.pool.config().num_workers,
            "starting lag correlation"
        );

        for chunk in splitter {
            let chunk = chunk?;
            let (reference, start, end, len) =
                (Arc::clone(&chunk.reference), chunk.start, chunk.end, chunk.len());
            total_sites += len as u64;

            let evaluation = self.correlate_chunk(chunk)?;
            total_windows += evaluation.jobs_dispatched as u64;
            debug!(
                reference = %reference,
                start,
                end,
                sites = len,
                windows = evaluation.jobs_dispatched,
                per_worker = ?evaluation.jobs_per_worker,
                "chunk correlated"
            );

            aggregator.add_chunk(&evaluation.summary);
            pooled.append(&evaluation.summary);
        }

        info!(
            chunks = aggregator.chunks(),
            sites = total_sites,
            windows = total_windows,
            "lag correlation finished"
        );

        Ok(CorrelationResult {
            rows: aggregator.rows(),
            pooled,
            chunks: aggregator.chunks(),
            sites: total_sites,
            windows: total_windows,
        })
    }
}
