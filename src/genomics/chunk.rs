use std::sync::Arc;

use super::pairing::OrderingError;
use super::profile::{ClassFilter, GenomeProfile};
use super::types::Site;

/// Contiguous genomic window of one reference, processed as one unit of
/// parallel work.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Reference the chunk lies on.
    pub reference: Arc<str>,
    /// Chunk number counted from the region start.
    pub index: u64,
    /// First position covered.
    pub start: u64,
    /// Last position covered; this is the chunk boundary.
    pub end: u64,
    /// Sites inside `start..=end`, in stream order.
    pub sites: Vec<Site>,
}

impl Chunk {
    /// Number of sites in the chunk.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the chunk holds no site.
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Region of interest, `start..end` with an open end when `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    /// First position kept.
    pub start: u64,
    /// First position dropped, if bounded.
    pub end: Option<u64>,
}

impl Region {
    /// Construct a new region.
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Whether `position` falls inside the region.
    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && self.end.map_or(true, |end| position < end)
    }
}

/// Groups an ordered site stream into fixed-size chunks.
///
/// Boundaries sit at `region.start + k * size` and belong to the chunk they
/// close: chunk `i` of a reference covers `(region.start + i * size,
/// region.start + (i + 1) * size]`, and chunk 0 also holds `region.start`
/// itself. A reference change closes the open chunk, empty chunks are never
/// produced, and sites outside the region or rejected by the class filter are
/// dropped. Stream order is checked on every site, kept or not.
#[derive(Debug)]
pub struct ChunkSplitter<I> {
    sites: I,
    chunk_size: u64,
    region: Region,
    class_filter: Option<(Arc<GenomeProfile>, ClassFilter)>,
    current: Option<Chunk>,
    last: Option<(Arc<str>, u64)>,
    done: bool,
}

impl<I> ChunkSplitter<I> {
    /// Wrap a site stream. `chunk_size` must be positive.
    pub fn new(sites: I, chunk_size: u64, region: Region) -> Self {
        debug_assert!(chunk_size > 0);
        Self {
            sites,
            chunk_size: chunk_size.max(1),
            region,
            class_filter: None,
            current: None,
            last: None,
            done: false,
        }
    }

    /// Drop sites whose class in `profile` does not pass `filter`.
    pub fn with_class_filter(mut self, profile: Arc<GenomeProfile>, filter: ClassFilter) -> Self {
        self.class_filter = Some((profile, filter));
        self
    }

    fn keeps(&self, site: &Site) -> bool {
        self.region.contains(site.position)
            && self
                .class_filter
                .as_ref()
                .map_or(true, |(profile, filter)| profile.accepts(site.position, *filter))
    }

    fn open(&self, site: &Site) -> Chunk {
        let offset = site.position - self.region.start;
        let index = offset.saturating_sub(1) / self.chunk_size;
        let boundary = self.region.start + index * self.chunk_size;
        Chunk {
            reference: Arc::clone(&site.reference),
            index,
            start: if index == 0 { boundary } else { boundary + 1 },
            end: boundary + self.chunk_size,
            sites: Vec::new(),
        }
    }

    fn check_order(&mut self, site: &Site) -> Result<(), OrderingError> {
        if let Some((reference, previous)) = &self.last {
            if *reference == site.reference {
                OrderingError::check(reference, *previous, site.position)?;
            }
        }
        self.last = Some((Arc::clone(&site.reference), site.position));
        Ok(())
    }
}

impl<I, E> Iterator for ChunkSplitter<I>
where
    I: Iterator<Item = Result<Site, E>>,
    E: From<OrderingError>,
{
    type Item = Result<Chunk, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let site = match self.sites.next() {
                Some(Ok(site)) => site,
                Some(Err(err)) => {
                    self.done = true;
                    self.current = None;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return self.current.take().map(Ok);
                }
            };

            if let Err(err) = self.check_order(&site) {
                self.done = true;
                self.current = None;
                return Some(Err(err.into()));
            }
            if !self.keeps(&site) {
                continue;
            }

            let fits = self
                .current
                .as_ref()
                .map_or(false, |chunk| {
                    chunk.reference == site.reference && site.position <= chunk.end
                });
            if fits {
                if let Some(chunk) = self.current.as_mut() {
                    chunk.sites.push(site);
                }
                continue;
            }

            let mut next = self.open(&site);
            next.sites.push(site);
            if let Some(closed) = self.current.replace(next) {
                return Some(Ok(closed));
            }
        }
    }
}
