use super::{Calculator, Covariances, MeanVariances};

/// Chunks with this many `Cs` samples or fewer at a lag are left out of the
/// genome-wide estimate for that lag.
pub const DEFAULT_MIN_CHUNK_SAMPLES: u64 = 10;

/// Genome-wide statistics for one lag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct LagRow {
    /// Lag distance in bases.
    pub lag: usize,
    /// Mean across chunks of the chunk-level mean window covariance.
    pub cs_mean: f64,
    /// Variance across chunks of the chunk-level mean window covariance.
    pub cs_var: f64,
    /// Mean across chunks of the covariance of window means.
    pub cr_mean: f64,
    /// Variance across chunks of the covariance of window means.
    pub cr_var: f64,
    /// Mean across chunks of the pooled sample covariance.
    pub ct_mean: f64,
    /// Variance across chunks of the pooled sample covariance.
    pub ct_var: f64,
    /// Number of chunks contributing to `Cs` at this lag.
    pub n: u64,
}

/// Two-level aggregation: one scalar per lag per chunk, summarised across
/// chunks so a single anomalous chunk cannot dominate.
#[derive(Debug, Clone)]
pub struct GenomeAggregator {
    min_chunk_samples: u64,
    cs: MeanVariances,
    cr: MeanVariances,
    ct: MeanVariances,
    chunks: usize,
}

impl GenomeAggregator {
    /// Create an aggregator for lags `0..max_lag`.
    pub fn new(max_lag: usize, min_chunk_samples: u64) -> Self {
        Self {
            min_chunk_samples,
            cs: MeanVariances::new(max_lag),
            cr: MeanVariances::new(max_lag),
            ct: MeanVariances::new(max_lag),
            chunks: 0,
        }
    }

    /// Fold one chunk calculator into the genome-wide tables.
    ///
    /// Lags whose `Cs` sample count does not exceed the threshold are skipped,
    /// and each statistic is only recorded when finite.
    pub fn add_chunk(&mut self, chunk: &Calculator) {
        debug_assert_eq!(chunk.max_lag(), self.cs.len());
        self.chunks += 1;

        for lag in 0..self.cs.len() {
            if chunk.cs().n(lag) <= self.min_chunk_samples {
                continue;
            }
            let cs = chunk.cs().mean(lag);
            let cr = chunk.cr().result(lag);
            let ct = chunk.ct().result(lag);
            if cs.is_finite() {
                self.cs.increment(lag, cs);
            }
            if cr.is_finite() {
                self.cr.increment(lag, cr);
            }
            if ct.is_finite() {
                self.ct.increment(lag, ct);
            }
        }
    }

    /// Number of chunks folded so far (including filtered ones).
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Genome-wide `Cs` table.
    pub fn cs(&self) -> &MeanVariances {
        &self.cs
    }

    /// Genome-wide `Cr` table.
    pub fn cr(&self) -> &MeanVariances {
        &self.cr
    }

    /// Genome-wide `Ct` table.
    pub fn ct(&self) -> &MeanVariances {
        &self.ct
    }

    /// One row per lag, in increasing lag order. Rows are never suppressed.
    pub fn rows(&self) -> Vec<LagRow> {
        (0..self.cs.len())
            .map(|lag| LagRow {
                lag,
                cs_mean: self.cs.mean(lag),
                cs_var: self.cs.variance(lag),
                cr_mean: self.cr.mean(lag),
                cr_var: self.cr.variance(lag),
                ct_mean: self.ct.mean(lag),
                ct_var: self.ct.variance(lag),
                n: self.cs.n(lag),
            })
            .collect()
    }
}

/// Genome-wide covariance of per-site diversity for one lag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct RateRow {
    /// Lag distance in bases.
    pub lag: usize,
    /// Mean across chunks of the chunk covariance.
    pub cov_mean: f64,
    /// Variance across chunks of the chunk covariance.
    pub cov_var: f64,
    /// Mean across chunks of the mean diversity at the first site.
    pub x_mean: f64,
    /// Variance across chunks of the mean diversity at the first site.
    pub x_var: f64,
    /// Mean across chunks of the mean diversity at the second site.
    pub y_mean: f64,
    /// Variance across chunks of the mean diversity at the second site.
    pub y_var: f64,
    /// Number of chunks contributing at this lag.
    pub n: u64,
}

/// Across-chunk summary of per-chunk diversity covariance tables.
///
/// Mergeable, so each worker can own one and the collector appends them.
#[derive(Debug, Clone, PartialEq)]
pub struct RateAggregator {
    min_chunk_samples: u64,
    cov: MeanVariances,
    x: MeanVariances,
    y: MeanVariances,
    chunks: usize,
}

impl RateAggregator {
    /// Create an aggregator for lags `0..max_lag`.
    pub fn new(max_lag: usize, min_chunk_samples: u64) -> Self {
        Self {
            min_chunk_samples,
            cov: MeanVariances::new(max_lag),
            x: MeanVariances::new(max_lag),
            y: MeanVariances::new(max_lag),
            chunks: 0,
        }
    }

    /// Fold one chunk table. A lag is recorded only when it holds more than
    /// `min_chunk_samples` pairs and its covariance is finite.
    pub fn add_chunk(&mut self, chunk: &Covariances) {
        debug_assert_eq!(chunk.len(), self.cov.len());
        self.chunks += 1;

        for (lag, cov) in chunk.iter().enumerate().take(self.cov.len()) {
            let value = cov.result();
            if cov.n() <= self.min_chunk_samples || !value.is_finite() {
                continue;
            }
            self.cov.increment(lag, value);
            self.x.increment(lag, cov.mean_x());
            self.y.increment(lag, cov.mean_y());
        }
    }

    /// Merge another aggregator of the same shape.
    pub fn append(&mut self, other: &RateAggregator) {
        self.cov.append(&other.cov);
        self.x.append(&other.x);
        self.y.append(&other.y);
        self.chunks += other.chunks;
    }

    /// Number of chunks folded so far (including filtered ones).
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Genome-wide covariance table.
    pub fn cov(&self) -> &MeanVariances {
        &self.cov
    }

    /// One row per lag, in increasing lag order.
    pub fn rows(&self) -> Vec<RateRow> {
        (0..self.cov.len())
            .map(|lag| RateRow {
                lag,
                cov_mean: self.cov.mean(lag),
                cov_var: self.cov.variance(lag),
                x_mean: self.x.mean(lag),
                x_var: self.x.variance(lag),
                y_mean: self.y.mean(lag),
                y_var: self.y.variance(lag),
                n: self.cov.n(lag),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_windows(max_lag: usize, lag: usize, windows: usize) -> Calculator {
        let mut calc = Calculator::new(max_lag);
        for i in 0..windows {
            let flip = (i % 2) as f64;
            calc.increment(&[1.0, 0.0, flip], &[1.0, 0.0, 1.0 - flip], lag);
        }
        calc
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut agg = GenomeAggregator::new(2, DEFAULT_MIN_CHUNK_SAMPLES);
        agg.add_chunk(&chunk_with_windows(2, 0, 10));
        assert_eq!(agg.cs().n(0), 0);

        agg.add_chunk(&chunk_with_windows(2, 0, 11));
        assert_eq!(agg.cs().n(0), 1);
        assert_eq!(agg.cr().n(0), 1);
        assert_eq!(agg.ct().n(0), 1);
        assert_eq!(agg.chunks(), 2);
    }

    #[test]
    fn rows_cover_every_lag() {
        let agg = GenomeAggregator::new(4, DEFAULT_MIN_CHUNK_SAMPLES);
        let rows = agg.rows();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().enumerate().all(|(i, row)| row.lag == i));
        assert!(rows.iter().all(|row| row.n == 0 && row.cs_mean.is_nan()));
    }

    fn rate_chunk(max_lag: usize, lag: usize, pairs: usize) -> Covariances {
        let mut table = Covariances::new(max_lag);
        for i in 0..pairs {
            let x = (i % 3) as f64 / 4.0;
            table.increment(lag, x, 0.5 - x);
        }
        table
    }

    #[test]
    fn rate_threshold_is_exclusive() {
        let mut agg = RateAggregator::new(2, DEFAULT_MIN_CHUNK_SAMPLES);
        agg.add_chunk(&rate_chunk(2, 1, 10));
        assert_eq!(agg.cov().n(1), 0);

        agg.add_chunk(&rate_chunk(2, 1, 11));
        let rows = agg.rows();
        assert_eq!(rows[1].n, 1);
        assert!(rows[1].cov_mean < 0.0);
        assert!((rows[1].x_mean + rows[1].y_mean - 0.5).abs() < 1e-12);
        assert!(rows[0].cov_mean.is_nan());
        assert_eq!(agg.chunks(), 2);
    }

    #[test]
    fn rate_nan_chunks_are_skipped() {
        let mut table = Covariances::new(1);
        for _ in 0..20 {
            table.increment(0, f64::NAN, 0.1);
        }
        let mut agg = RateAggregator::new(1, DEFAULT_MIN_CHUNK_SAMPLES);
        agg.add_chunk(&table);
        assert_eq!(agg.cov().n(0), 0);
    }

    #[test]
    fn rate_aggregators_merge_like_one() {
        let chunks = [rate_chunk(2, 0, 12), rate_chunk(2, 0, 15), rate_chunk(2, 1, 30)];
        let mut whole = RateAggregator::new(2, DEFAULT_MIN_CHUNK_SAMPLES);
        chunks.iter().for_each(|c| whole.add_chunk(c));

        let mut left = RateAggregator::new(2, DEFAULT_MIN_CHUNK_SAMPLES);
        left.add_chunk(&chunks[0]);
        let mut right = RateAggregator::new(2, DEFAULT_MIN_CHUNK_SAMPLES);
        right.add_chunk(&chunks[1]);
        right.add_chunk(&chunks[2]);
        left.append(&right);

        assert_eq!(left.chunks(), 3);
        for (a, b) in left.rows().iter().zip(whole.rows()) {
            assert_eq!(a.n, b.n);
            let same = (a.cov_mean - b.cov_mean).abs() < 1e-12
                || (a.cov_mean.is_nan() && b.cov_mean.is_nan());
            assert!(same, "lag {} diverged", a.lag);
        }
    }
}
