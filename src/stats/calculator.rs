use super::{Covariance, Covariances, MeanVariances};

/// Bundle of the three lag tables derived from per-window covariances.
///
/// - `cs`: mean/variance of each window's covariance result
/// - `cr`: covariance between each window's mean-x and mean-y
/// - `ct`: covariance over every raw sample, windows pooled
///
/// One calculator is owned by exactly one worker; partial calculators are
/// combined with [`Calculator::append`], which only touches accumulator state.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculator {
    max_lag: usize,
    cs: MeanVariances,
    cr: Covariances,
    ct: Covariances,
}

impl Calculator {
    /// Create an empty calculator tracking lags `0..max_lag`.
    pub fn new(max_lag: usize) -> Self {
        Self {
            max_lag,
            cs: MeanVariances::new(max_lag),
            cr: Covariances::new(max_lag),
            ct: Covariances::new(max_lag),
        }
    }

    /// Feed the paired samples of one window observed at distance `lag`.
    ///
    /// Lags outside `0..max_lag` and empty windows are ignored.
    pub fn increment(&mut self, xs: &[f64], ys: &[f64], lag: usize) {
        debug_assert_eq!(xs.len(), ys.len());
        if lag >= self.max_lag || xs.is_empty() {
            return;
        }

        let mut window = Covariance::new();
        for (&x, &y) in xs.iter().zip(ys) {
            window.increment(x, y);
        }

        self.cs.increment(lag, window.result());
        self.ct.append_at(lag, &window);
        self.cr.increment(lag, window.mean_x(), window.mean_y());
    }

    /// Merge another calculator of the same `max_lag` into this one.
    pub fn append(&mut self, other: &Calculator) {
        debug_assert_eq!(self.max_lag, other.max_lag);
        self.cs.append(&other.cs);
        self.cr.append(&other.cr);
        self.ct.append(&other.ct);
    }

    /// Number of lags tracked.
    pub fn max_lag(&self) -> usize {
        self.max_lag
    }

    /// Per-window covariance results summarised per lag.
    pub fn cs(&self) -> &MeanVariances {
        &self.cs
    }

    /// Covariance of window means per lag.
    pub fn cr(&self) -> &Covariances {
        &self.cr
    }

    /// Covariance of raw samples per lag.
    pub fn ct(&self) -> &Covariances {
        &self.ct
    }

    /// Whether no window has been recorded at any lag.
    pub fn is_empty(&self) -> bool {
        self.cs.iter().all(|mv| mv.n() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_feeds_all_three_tables() {
        let mut calc = Calculator::new(4);
        calc.increment(&[1.0, 0.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], 2);

        // Σxy = 1, Σx = 2, Σy = 1, n = 4 → cov = 1/4 − 1/2·1/4 = 1/8
        assert_eq!(calc.cs().n(2), 1);
        assert!((calc.cs().mean(2) - 0.125).abs() < 1e-12);
        assert_eq!(calc.ct().n(2), 4);
        assert!((calc.ct().result(2) - 0.125).abs() < 1e-12);
        assert_eq!(calc.cr().n(2), 1);
        assert_eq!(calc.cr().mean_x(2), 0.5);
        assert_eq!(calc.cr().mean_y(2), 0.25);
        assert_eq!(calc.cs().n(0), 0);
    }

    #[test]
    fn out_of_range_lag_is_ignored() {
        let mut calc = Calculator::new(2);
        calc.increment(&[1.0], &[1.0], 2);
        calc.increment(&[1.0], &[1.0], 10);
        assert!(calc.is_empty());
    }

    #[test]
    fn empty_window_is_ignored() {
        let mut calc = Calculator::new(2);
        calc.increment(&[], &[], 0);
        assert!(calc.is_empty());
        assert_eq!(calc.cs().n(0), 0);
    }

    #[test]
    fn empty_window_does_not_push_nan_into_cs() {
        let mut calc = Calculator::new(2);
        calc.increment(&[1.0, 0.0], &[1.0, 0.0], 1);
        let before = calc.clone();

        calc.increment(&[], &[], 1);
        assert_eq!(calc, before);
        assert_eq!(calc.cs().n(1), 1);
        assert!(calc.cs().mean(1).is_finite());
        assert_eq!(calc.cr().n(1), 1);
    }

    #[test]
    fn append_empty_calculator_is_identity() {
        let mut calc = Calculator::new(3);
        calc.increment(&[1.0, 0.0], &[0.0, 1.0], 1);
        let before = calc.clone();
        calc.append(&Calculator::new(3));
        assert_eq!(calc, before);
    }
}
