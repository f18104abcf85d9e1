use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use super::types::Site;
use crate::framework::JobProcessor;
use crate::stats::Calculator;

/// Position decrease within one reference: the stream is not sorted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("sites out of order on {reference}: position {current} follows {previous}")]
pub struct OrderingError {
    /// Reference on which the violation happened.
    pub reference: String,
    /// Last accepted position.
    pub previous: u64,
    /// Offending position.
    pub current: u64,
}

impl OrderingError {
    pub(crate) fn check(reference: &str, previous: u64, current: u64) -> Result<(), Self> {
        if current < previous {
            return Err(Self {
                reference: reference.to_string(),
                previous,
                current,
            });
        }
        Ok(())
    }
}

/// Knobs of the pair comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingParams {
    /// Lags `0..max_lag` are evaluated.
    pub max_lag: usize,
    /// Lags with fewer read pairs than this are skipped.
    pub min_coverage: usize,
}

impl PairingParams {
    /// Construct a new parameter set.
    pub fn new(max_lag: usize, min_coverage: usize) -> Self {
        Self {
            max_lag,
            min_coverage,
        }
    }
}

/// Anchor site followed by every later site closer than `max_lag`.
///
/// This is the unit of work handed to the pool.
#[derive(Debug, Clone)]
pub struct SiteWindow {
    sites: Vec<Arc<Site>>,
}

impl SiteWindow {
    /// Build a window from an anchor and its candidates.
    pub fn new(anchor: Arc<Site>, candidates: impl IntoIterator<Item = Arc<Site>>) -> Self {
        let mut sites = vec![anchor];
        sites.extend(candidates);
        Self { sites }
    }

    /// Anchor site.
    pub fn anchor(&self) -> &Site {
        &self.sites[0]
    }

    /// Anchor first, then candidates in position order.
    pub fn sites(&self) -> &[Arc<Site>] {
        &self.sites
    }

    /// Number of sites including the anchor.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Always false; a window holds at least its anchor.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Streaming window builder.
///
/// Sites are pushed in order; each site becomes the anchor of exactly one
/// window, emitted once a site at least `max_lag` bases downstream arrives, on
/// a reference change, or on [`SlidingWindow::finish`].
#[derive(Debug)]
pub struct SlidingWindow {
    max_lag: u64,
    pending: VecDeque<Arc<Site>>,
    ready: VecDeque<SiteWindow>,
}

impl SlidingWindow {
    /// Create an empty window tracking lags `0..max_lag`.
    pub fn new(max_lag: usize) -> Self {
        Self {
            max_lag: max_lag as u64,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
        }
    }

    /// Add the next site of the stream.
    ///
    /// Overlapping mates of the site are collapsed before it is queued.
    pub fn push(&mut self, site: Site) -> Result<(), OrderingError> {
        if let Some(last) = self.pending.back() {
            if last.reference != site.reference {
                self.finish();
            } else {
                OrderingError::check(&site.reference, last.position, site.position)?;
            }
        }

        let position = site.position;
        self.pending.push_back(Arc::new(site.collapse_mates()));

        while let Some(head) = self.pending.front() {
            if position - head.position < self.max_lag {
                break;
            }
            self.emit_head();
        }
        Ok(())
    }

    /// Emit every pending site as an anchor.
    pub fn finish(&mut self) {
        while !self.pending.is_empty() {
            self.emit_head();
        }
    }

    /// Next completed window, if any.
    pub fn pop_ready(&mut self) -> Option<SiteWindow> {
        self.ready.pop_front()
    }

    /// Drop pending sites and completed windows.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
    }

    /// Sites waiting to become anchors.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn emit_head(&mut self) {
        let Some(anchor) = self.pending.pop_front() else {
            return;
        };
        let start = anchor.position;
        let candidates: Vec<Arc<Site>> = self
            .pending
            .iter()
            .take_while(|site| site.position - start < self.max_lag)
            .cloned()
            .collect();
        self.ready.push_back(SiteWindow::new(anchor, candidates));
    }
}

/// Iterator adapter turning a site stream into a window stream.
#[derive(Debug)]
pub struct Windows<I> {
    sites: I,
    window: SlidingWindow,
    done: bool,
}

impl<I> Windows<I> {
    /// Wrap a stream of sites.
    pub fn new(sites: I, max_lag: usize) -> Self {
        Self {
            sites,
            window: SlidingWindow::new(max_lag),
            done: false,
        }
    }
}

impl<I, E> Iterator for Windows<I>
where
    I: Iterator<Item = Result<Site, E>>,
    E: From<OrderingError>,
{
    type Item = Result<SiteWindow, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(window) = self.window.pop_ready() {
                return Some(Ok(window));
            }
            if self.done {
                return None;
            }
            match self.sites.next() {
                Some(Ok(site)) => {
                    if let Err(err) = self.window.push(site) {
                        self.done = true;
                        self.window.clear();
                        return Some(Err(err.into()));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    self.window.clear();
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    self.window.finish();
                }
            }
        }
    }
}

/// Compare the anchor of `window` against every site in it (itself included)
/// and feed the difference indicators into `calc`.
///
/// For each lag, alleles of the candidate are joined to the anchor's alleles by
/// read id. For every two read pairs `i < j` the sample is
/// `x = [anchor_i != anchor_j]`, `y = [candidate_i != candidate_j]`.
pub fn compare_window(window: &SiteWindow, params: &PairingParams, calc: &mut Calculator) {
    let anchor = window.anchor();
    let anchor_bases: HashMap<&str, u8> = anchor
        .alleles
        .iter()
        .filter(|allele| allele.is_pairable())
        .map(|allele| (allele.read_id.as_ref(), allele.base))
        .collect();
    if anchor_bases.is_empty() {
        return;
    }

    let mut pairs: Vec<(u8, u8)> = Vec::new();
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();

    for site in window.sites() {
        let Some(lag) = site.position.checked_sub(anchor.position) else {
            continue;
        };
        let lag = lag as usize;
        if lag >= params.max_lag {
            break;
        }

        pairs.clear();
        pairs.extend(
            site.alleles
                .iter()
                .filter(|allele| allele.is_pairable())
                .filter_map(|allele| {
                    anchor_bases
                        .get(allele.read_id.as_ref())
                        .map(|&base| (base, allele.base))
                }),
        );
        if pairs.len() < params.min_coverage {
            continue;
        }

        xs.clear();
        ys.clear();
        for (i, &(a_i, b_i)) in pairs.iter().enumerate() {
            for &(a_j, b_j) in &pairs[i + 1..] {
                xs.push(if a_i != a_j { 1.0 } else { 0.0 });
                ys.push(if b_i != b_j { 1.0 } else { 0.0 });
            }
        }
        calc.increment(&xs, &ys, lag);
    }
}

/// Single-threaded pairing of a whole site stream.
pub fn accumulate<I, E>(sites: I, params: &PairingParams) -> Result<Calculator, E>
where
    I: IntoIterator<Item = Result<Site, E>>,
    E: From<OrderingError>,
{
    let mut calc = Calculator::new(params.max_lag);
    for window in Windows::new(sites.into_iter(), params.max_lag) {
        compare_window(&window?, params, &mut calc);
    }
    Ok(calc)
}

/// Pool processor folding site windows into per-worker calculators.
#[derive(Debug, Clone)]
pub struct PairingProcessor {
    params: PairingParams,
}

impl PairingProcessor {
    /// Construct a new processor.
    pub fn new(params: PairingParams) -> Self {
        Self { params }
    }

    /// Pairing parameters.
    pub fn params(&self) -> &PairingParams {
        &self.params
    }
}

impl JobProcessor for PairingProcessor {
    type Job = SiteWindow;
    type Summary = Calculator;

    fn new_summary(&self) -> Calculator {
        Calculator::new(self.params.max_lag)
    }

    fn process_job(&self, job: SiteWindow, summary: &mut Calculator) {
        compare_window(&job, &self.params, summary);
    }

    fn merge(&self, into: &mut Calculator, other: Calculator) {
        into.append(&other);
    }
}
