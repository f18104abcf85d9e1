use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the worker pool itself.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Configuration invalid (e.g., zero workers).
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    /// A worker thread panicked while processing jobs.
    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked {
        /// Number of workers that did not return normally.
        count: usize,
    },

    /// Every worker hung up before the producer finished sending jobs.
    #[error("job queue disconnected after {dispatched} job(s)")]
    QueueDisconnected {
        /// Jobs successfully handed off before the disconnect.
        dispatched: usize,
    },
}

/// Sizing of the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Capacity of the bounded job queue (0 makes every hand-off a rendezvous).
    pub queue_capacity: usize,
}

impl PoolConfig {
    /// Construct a configuration with `num_workers` threads and a queue twice
    /// as deep.
    pub fn new(num_workers: usize) -> Result<Self, FrameworkError> {
        if num_workers == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "number of workers must be > 0".to_string(),
            ));
        }
        Ok(Self {
            num_workers,
            queue_capacity: num_workers * 2,
        })
    }

    /// One worker per logical CPU.
    pub fn per_cpu() -> Self {
        let num_workers = num_cpus::get().max(1);
        Self {
            num_workers,
            queue_capacity: num_workers * 2,
        }
    }

    /// Override the queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

/// Trait implemented by domain-specific processors that run inside the pool.
///
/// Every worker owns a private summary for its whole lifetime; summaries only
/// meet in [`JobProcessor::merge`], which runs on the collecting thread.
pub trait JobProcessor: Sync {
    /// Unit of work handed to a worker.
    type Job: Send;
    /// Per-worker mergeable state.
    type Summary: Send;

    /// Fresh, empty summary.
    fn new_summary(&self) -> Self::Summary;

    /// Fold one job into the worker's summary.
    fn process_job(&self, job: Self::Job, summary: &mut Self::Summary);

    /// Merge `other` into `into` (associative and commutative).
    fn merge(&self, into: &mut Self::Summary, other: Self::Summary);
}

/// Result returned by [`WorkerPool::evaluate`].
#[derive(Debug)]
pub struct EvaluationResult<S> {
    /// Merged summary of every worker.
    pub summary: S,
    /// Number of jobs handed to the queue.
    pub jobs_dispatched: usize,
    /// Jobs processed by each worker, in spawn order.
    pub jobs_per_worker: Vec<usize>,
}

/// Fixed-size pool draining a bounded queue of jobs into per-worker summaries.
#[derive(Debug)]
pub struct WorkerPool<P: JobProcessor> {
    processor: P,
    config: PoolConfig,
}

impl<P: JobProcessor> WorkerPool<P> {
    /// Create a new pool with the provided processor and configuration.
    pub fn new(processor: P, config: PoolConfig) -> Result<Self, FrameworkError> {
        if config.num_workers == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "number of workers must be > 0".to_string(),
            ));
        }
        Ok(Self { processor, config })
    }

    /// Access configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Access the processor.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Drain `jobs` through the pool and merge the worker summaries.
    ///
    /// The calling thread is the single producer. The first `Err` yielded by
    /// `jobs` cancels the remaining work: the queue is closed, workers stop
    /// picking up jobs, every thread is joined and the error is returned with
    /// no partial summary.
    pub fn evaluate<I, E>(&self, jobs: I) -> Result<EvaluationResult<P::Summary>, E>
    where
        I: IntoIterator<Item = Result<P::Job, E>>,
        E: From<FrameworkError>,
    {
        let (tx, rx) = bounded::<P::Job>(self.config.queue_capacity);
        let cancelled = AtomicBool::new(false);
        let processor = &self.processor;

        thread::scope(|s| {
            let handles: Vec<_> = (0..self.config.num_workers)
                .map(|_| {
                    let rx = rx.clone();
                    let cancelled = &cancelled;
                    s.spawn(move || {
                        let mut summary = processor.new_summary();
                        let mut processed = 0usize;
                        for job in rx.iter() {
                            if cancelled.load(Ordering::Relaxed) {
                                break;
                            }
                            processor.process_job(job, &mut summary);
                            processed += 1;
                        }
                        (summary, processed)
                    })
                })
                .collect();
            drop(rx);

            let mut dispatched = 0usize;
            let mut failure: Option<E> = None;
            for job in jobs {
                match job {
                    Ok(job) => {
                        if tx.send(job).is_err() {
                            failure = Some(FrameworkError::QueueDisconnected { dispatched }.into());
                            break;
                        }
                        dispatched += 1;
                    }
                    Err(err) => {
                        cancelled.store(true, Ordering::Relaxed);
                        failure = Some(err);
                        break;
                    }
                }
            }
            drop(tx);

            let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            let panicked = joined.iter().filter(|outcome| outcome.is_err()).count();
            if panicked > 0 {
                warn!(panicked, "worker threads panicked");
                return Err(FrameworkError::WorkerPanicked { count: panicked }.into());
            }
            if let Some(err) = failure {
                debug!(dispatched, "job stream failed; pool cancelled");
                return Err(err);
            }

            let mut summary = processor.new_summary();
            let mut jobs_per_worker = Vec::with_capacity(joined.len());
            for (partial, processed) in joined.into_iter().flatten() {
                processor.merge(&mut summary, partial);
                jobs_per_worker.push(processed);
            }

            Ok(EvaluationResult {
                summary,
                jobs_dispatched: dispatched,
                jobs_per_worker,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SumProcessor;

    impl JobProcessor for SumProcessor {
        type Job = u64;
        type Summary = (u64, usize);

        fn new_summary(&self) -> Self::Summary {
            (0, 0)
        }

        fn process_job(&self, job: u64, summary: &mut Self::Summary) {
            summary.0 += job;
            summary.1 += 1;
        }

        fn merge(&self, into: &mut Self::Summary, other: Self::Summary) {
            into.0 += other.0;
            into.1 += other.1;
        }
    }

    #[derive(Debug)]
    enum TestError {
        Stop,
        Pool(FrameworkError),
    }

    impl From<FrameworkError> for TestError {
        fn from(err: FrameworkError) -> Self {
            TestError::Pool(err)
        }
    }

    #[test]
    fn pool_sums_all_jobs() {
        let pool = WorkerPool::new(SumProcessor, PoolConfig::new(4).unwrap()).unwrap();
        let result = pool
            .evaluate((1..=100u64).map(Ok::<_, TestError>))
            .expect("evaluation succeeds");

        assert_eq!(result.summary, (5050, 100));
        assert_eq!(result.jobs_dispatched, 100);
        assert_eq!(result.jobs_per_worker.len(), 4);
        assert_eq!(result.jobs_per_worker.iter().sum::<usize>(), 100);
    }

    #[test]
    fn rendezvous_queue_works() {
        let config = PoolConfig::new(2).unwrap().with_queue_capacity(0);
        let pool = WorkerPool::new(SumProcessor, config).unwrap();
        let result = pool
            .evaluate((0..10u64).map(Ok::<_, TestError>))
            .expect("evaluation succeeds");
        assert_eq!(result.summary.0, 45);
    }

    #[test]
    fn producer_error_cancels_evaluation() {
        let pool = WorkerPool::new(SumProcessor, PoolConfig::new(3).unwrap()).unwrap();
        let jobs = (0..50u64).map(|i| if i == 20 { Err(TestError::Stop) } else { Ok(i) });
        let err = pool.evaluate(jobs).expect_err("stream error propagates");
        assert!(matches!(err, TestError::Stop));
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(PoolConfig::new(0).is_err());
        let config = PoolConfig {
            num_workers: 0,
            queue_capacity: 1,
        };
        assert!(WorkerPool::new(SumProcessor, config).is_err());
    }
}
