/// Bivariate covariance accumulator.
///
/// Stores the four sufficient statistics (Σxy, Σx, Σy, n). Merging two
/// accumulators is an elementwise sum, so any partition of the samples merged
/// in any order reproduces the state of accumulating them in one pass (up to
/// floating-point summation order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Covariance {
    sum_xy: f64,
    sum_x: f64,
    sum_y: f64,
    n: u64,
}

impl Covariance {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(x, y)` sample.
    pub fn increment(&mut self, x: f64, y: f64) {
        self.sum_xy += x * y;
        self.sum_x += x;
        self.sum_y += y;
        self.n += 1;
    }

    /// Merge another accumulator into this one.
    ///
    /// Appending an empty accumulator leaves `self` untouched.
    pub fn append(&mut self, other: &Covariance) {
        if other.n == 0 {
            return;
        }
        self.sum_xy += other.sum_xy;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.n += other.n;
    }

    /// Population covariance `Σxy/n − (Σx/n)(Σy/n)`; NaN when empty.
    pub fn result(&self) -> f64 {
        let n = self.n as f64;
        self.sum_xy / n - (self.sum_x / n) * (self.sum_y / n)
    }

    /// Mean of the x samples; NaN when empty.
    pub fn mean_x(&self) -> f64 {
        self.sum_x / self.n as f64
    }

    /// Mean of the y samples; NaN when empty.
    pub fn mean_y(&self) -> f64 {
        self.sum_y / self.n as f64
    }

    /// Number of samples observed.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Whether no sample has been observed.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Running Σxy.
    pub fn sum_xy(&self) -> f64 {
        self.sum_xy
    }

    /// Running Σx.
    pub fn sum_x(&self) -> f64 {
        self.sum_x
    }

    /// Running Σy.
    pub fn sum_y(&self) -> f64 {
        self.sum_y
    }
}

/// Lag table of covariance accumulators, indexed by lag distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariances {
    entries: Vec<Covariance>,
}

impl Covariances {
    /// Create a table with `max_lag` empty accumulators.
    pub fn new(max_lag: usize) -> Self {
        Self {
            entries: vec![Covariance::new(); max_lag],
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

    /// Add one `(x, y)` sample at `lag`.
    ///
    /// # Panics
    /// Panics if `lag >= self.len()`.
    pub fn increment(&mut self, lag: usize, x: f64, y: f64) {
        self.entries[lag].increment(x, y);
    }

    /// Merge a single accumulator into the entry at `lag`.
    ///
    /// # Panics
    /// Panics if `lag >= self.len()`.
    pub fn append_at(&mut self, lag: usize, other: &Covariance) {
        self.entries[lag].append(other);
    }

    /// Merge another table lag by lag.
    pub fn append(&mut self, other: &Covariances) {
        debug_assert_eq!(self.len(), other.len());
        for (mine, theirs) in self.entries.iter_mut().zip(&other.entries) {
            mine.append(theirs);
        }
    }

    /// Accumulator at `lag`, if tracked.
    pub fn get(&self, lag: usize) -> Option<&Covariance> {
        self.entries.get(lag)
    }

    /// Covariance result at `lag` (NaN when empty or out of range).
    pub fn result(&self, lag: usize) -> f64 {
        self.get(lag).map_or(f64::NAN, Covariance::result)
    }

    /// Sample count at `lag` (0 when out of range).
    pub fn n(&self, lag: usize) -> u64 {
        self.get(lag).map_or(0, Covariance::n)
    }

    /// Mean x at `lag`.
    pub fn mean_x(&self, lag: usize) -> f64 {
        self.get(lag).map_or(f64::NAN, Covariance::mean_x)
    }

    /// Mean y at `lag`.
    pub fn mean_y(&self, lag: usize) -> f64 {
        self.get(lag).map_or(f64::NAN, Covariance::mean_y)
    }

    /// Iterate over the accumulators in lag order.
    pub fn iter(&self) -> impl Iterator<Item = &Covariance> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covariance_matches_direct_formula() {
        let mut cov = Covariance::new();
        for (x, y) in [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)] {
            cov.increment(x, y);
        }
        // E[xy] = 28/3, E[x] = 2, E[y] = 4
        assert!((cov.result() - (28.0 / 3.0 - 8.0)).abs() < 1e-12);
        assert_eq!(cov.mean_x(), 2.0);
        assert_eq!(cov.mean_y(), 4.0);
        assert_eq!(cov.n(), 3);
    }

    #[test]
    fn empty_covariance_reads_nan() {
        let cov = Covariance::new();
        assert!(cov.result().is_nan());
        assert!(cov.mean_x().is_nan());
        assert!(cov.mean_y().is_nan());
    }

    #[test]
    fn append_empty_is_noop() {
        let mut cov = Covariance::new();
        cov.increment(0.0, 1.0);
        cov.increment(1.0, 1.0);
        let before = cov.clone();
        cov.append(&Covariance::new());
        assert_eq!(cov, before);
    }

    #[test]
    fn table_merges_per_lag() {
        let mut left = Covariances::new(3);
        let mut right = Covariances::new(3);
        left.increment(0, 1.0, 1.0);
        right.increment(2, 1.0, 0.0);
        left.append(&right);
        assert_eq!(left.n(0), 1);
        assert_eq!(left.n(1), 0);
        assert_eq!(left.n(2), 1);
        assert!(left.result(1).is_nan());
        assert!(left.result(7).is_nan());
    }
}
