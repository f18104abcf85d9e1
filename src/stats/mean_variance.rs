/// Running mean and variance (Welford update, Chan et al. merge).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanVariance {
    mean: f64,
    m2: f64,
    n: u64,
}

impl MeanVariance {
    /// Create an empty estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation.
    pub fn increment(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Merge another estimator into this one.
    ///
    /// Appending an empty estimator leaves `self` untouched.
    pub fn append(&mut self, other: &MeanVariance) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        let weight = other.n as f64 / n as f64;
        self.mean += delta * weight;
        self.m2 += other.m2 + delta * delta * self.n as f64 * weight;
        self.n = n;
    }

    /// Number of observations.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Sample mean; NaN when empty.
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Bias-corrected sample variance (`n − 1` denominator).
    ///
    /// NaN when empty, zero for a single observation.
    pub fn variance(&self) -> f64 {
        match self.n {
            0 => f64::NAN,
            1 => 0.0,
            n => self.m2 / (n - 1) as f64,
        }
    }
}

/// Lag table of mean/variance estimators.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVariances {
    entries: Vec<MeanVariance>,
}

impl MeanVariances {
    /// Create a table with `size` empty estimators.
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![MeanVariance::new(); size],
        }
    }

    /// Number of lags tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table tracks no lag at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add one observation at `lag`.
    ///
    /// # Panics
    /// Panics if `lag >= self.len()`.
    pub fn increment(&mut self, lag: usize, value: f64) {
        self.entries[lag].increment(value);
    }

    /// Merge another table lag by lag.
    pub fn append(&mut self, other: &MeanVariances) {
        debug_assert_eq!(self.len(), other.len());
        for (mine, theirs) in self.entries.iter_mut().zip(&other.entries) {
            mine.append(theirs);
        }
    }

    /// Estimator at `lag`, if tracked.
    pub fn get(&self, lag: usize) -> Option<&MeanVariance> {
        self.entries.get(lag)
    }

    /// Mean at `lag`.
    pub fn mean(&self, lag: usize) -> f64 {
        self.get(lag).map_or(f64::NAN, MeanVariance::mean)
    }

    /// Variance at `lag`.
    pub fn variance(&self, lag: usize) -> f64 {
        self.get(lag).map_or(f64::NAN, MeanVariance::variance)
    }

    /// Observation count at `lag`.
    pub fn n(&self, lag: usize) -> u64 {
        self.get(lag).map_or(0, MeanVariance::n)
    }

    /// Iterate over the estimators in lag order.
    pub fn iter(&self) -> impl Iterator<Item = &MeanVariance> {
        self.entries.iter()
    }
}
