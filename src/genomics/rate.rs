use std::sync::Arc;

use tracing::{debug, info};

use crate::framework::{JobProcessor, WorkerPool};
use crate::genomics::{Chunk, ChunkSplitter, ClassFilter, GenomeProfile, Site, SiteDiversity};
use crate::stats::{Covariances, RateAggregator, RateRow};
use crate::{CorrelationConfig, CorrelationError};

/// Covariance of per-site diversity between sites `lag` bases apart.
///
/// `sites` must be position-sorted and lie on one reference. Every site is
/// also paired with itself at lag 0.
pub fn rate_covariances(sites: &[SiteDiversity], max_lag: usize) -> Covariances {
    let mut table = Covariances::new(max_lag);
    for (i, first) in sites.iter().enumerate() {
        for second in &sites[i..] {
            let distance = second.position.saturating_sub(first.position);
            if distance >= max_lag as u64 {
                break;
            }
            table.increment(distance as usize, first.pi, second.pi);
        }
    }
    table
}

/// Folds whole chunks into a worker-owned [`RateAggregator`].
#[derive(Debug, Clone)]
pub struct RateProcessor {
    max_lag: usize,
    min_chunk_samples: u64,
}

impl RateProcessor {
    /// Construct a new processor.
    pub fn new(max_lag: usize, min_chunk_samples: u64) -> Self {
        Self {
            max_lag,
            min_chunk_samples,
        }
    }
}

impl JobProcessor for RateProcessor {
    type Job = Chunk;
    type Summary = RateAggregator;

    fn new_summary(&self) -> RateAggregator {
        RateAggregator::new(self.max_lag, self.min_chunk_samples)
    }

    fn process_job(&self, chunk: Chunk, summary: &mut RateAggregator) {
        let diversity: Vec<SiteDiversity> =
            chunk.sites.iter().filter_map(SiteDiversity::from_site).collect();
        summary.add_chunk(&rate_covariances(&diversity, self.max_lag));
    }

    fn merge(&self, into: &mut RateAggregator, other: RateAggregator) {
        into.append(&other);
    }
}

/// Output of a diversity covariance run.
#[derive(Debug, Clone)]
pub struct RateResult {
    /// Genome-wide statistics, one row per lag.
    pub rows: Vec<RateRow>,
    /// Chunks processed.
    pub chunks: usize,
    /// Sites that reached the chunk workers.
    pub sites: u64,
}

/// Chunk-parallel covariance of per-site nucleotide diversity.
///
/// Unlike [`LagCorrelator`](crate::genomics::LagCorrelator) no read pairing
/// takes place: each site is reduced to its π and sites are compared directly.
/// Whole chunks are the unit of parallel work.
#[derive(Debug)]
pub struct RateCorrelator {
    config: CorrelationConfig,
    pool: WorkerPool<RateProcessor>,
    class_filter: Option<(Arc<GenomeProfile>, ClassFilter)>,
}

impl RateCorrelator {
    /// Create a correlator; the configuration is validated up front.
    pub fn new(config: CorrelationConfig) -> Result<Self, CorrelationError> {
        config.validate()?;
        let processor = RateProcessor::new(config.max_lag, config.min_chunk_samples);
        let pool = WorkerPool::new(processor, config.pool_config()?)?;
        Ok(Self {
            config,
            pool,
            class_filter: None,
        })
    }

    /// Only compare positions whose class in `profile` passes `filter`.
    pub fn with_class_filter(mut self, profile: Arc<GenomeProfile>, filter: ClassFilter) -> Self {
        self.class_filter = Some((profile, filter));
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Run over an ordered site stream. The first input or ordering error
    /// aborts the run.
    pub fn run<I, E>(&self, sites: I) -> Result<RateResult, CorrelationError>
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

        info!(
            max_lag = self.config.max_lag,
            chunk_size = self.config.chunk_size,
            workers = self.pool.config().num_workers,
            "starting diversity covariance"
        );

        let mut total_sites = 0u64;
        let chunks = splitter.inspect(|chunk| {
            if let Ok(chunk) = chunk {
                total_sites += chunk.len() as u64;
                debug!(
                    reference = %chunk.reference,
                    start = chunk.start,
                    end = chunk.end,
                    sites = chunk.len(),
                    "chunk queued"
                );
            }
        });
        let evaluation = self.pool.evaluate(chunks)?;
        let aggregator = evaluation.summary;

        info!(
            chunks = aggregator.chunks(),
            sites = total_sites,
            per_worker = ?evaluation.jobs_per_worker,
            "diversity covariance finished"
        );

        Ok(RateResult {
            rows: aggregator.rows(),
            chunks: aggregator.chunks(),
            sites: total_sites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{Allele, OrderingError};

    fn diversity(position: u64, pi: f64) -> SiteDiversity {
        SiteDiversity {
            reference: Arc::from("chr1"),
            position,
            reference_base: b'A',
            counts: [0; 4],
            pi,
        }
    }

    fn site(pos: u64, bases: &[u8]) -> Result<Site, OrderingError> {
        let alleles = bases
            .iter()
            .enumerate()
            .map(|(i, &b)| Allele::new(b, 30, format!("read{i}")))
            .collect();
        Ok(Site::new("chr1", pos, b'A', alleles))
    }

    #[test]
    fn pairs_sites_by_distance() {
        let sites = [diversity(0, 0.5), diversity(1, 0.0), diversity(3, 1.0)];
        let table = rate_covariances(&sites, 3);

        // lag 0: each site with itself
        assert_eq!(table.n(0), 3);
        // lag 1: (0, 1) only; lag 2: (1, 3) only; (0, 3) is beyond max_lag
        assert_eq!(table.n(1), 1);
        assert_eq!(table.mean_x(1), 0.5);
        assert_eq!(table.mean_y(1), 0.0);
        assert_eq!(table.n(2), 1);
        assert_eq!(table.mean_x(2), 0.0);
        assert_eq!(table.mean_y(2), 1.0);
    }

    #[test]
    fn sites_without_diversity_are_skipped() {
        let processor = RateProcessor::new(2, 0);
        let mut summary = processor.new_summary();
        let chunk = Chunk {
            reference: Arc::from("chr1"),
            index: 0,
            start: 0,
            end: 10,
            sites: vec![site(0, b"AC").unwrap(), site(1, b"A").unwrap()],
        };
        processor.process_job(chunk, &mut summary);

        let rows = summary.rows();
        assert_eq!(rows[0].n, 1);
        assert_eq!(rows[0].x_mean, 1.0);
        assert_eq!(rows[1].n, 0);
    }

    #[test]
    fn ordering_error_aborts_run() {
        let correlator = RateCorrelator::new(CorrelationConfig::new(4).with_workers(2)).unwrap();
        let sites = vec![site(5, b"AC"), site(2, b"AC")];
        let err = correlator.run(sites).unwrap_err();
        assert!(matches!(err, CorrelationError::Ordering(_)));
    }
}
