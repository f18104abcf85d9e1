use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rust_htslib::bam::{self, record::Cigar, HeaderView, Read, Record};
use tracing::{debug, info};

use super::pileup::SiteBuilder;
use super::types::{AlignedRead, CigarOp, CigarOpKind, Site};
use super::InputError;

/// Read-level filters applied before piling up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFilter {
    /// Reads with MAPQ at or below this value are skipped.
    pub min_mapping_quality: u8,
    /// Bases below this quality are skipped.
    pub min_base_quality: u8,
}

impl ReadFilter {
    /// Construct a new filter.
    pub fn new(min_mapping_quality: u8, min_base_quality: u8) -> Self {
        Self {
            min_mapping_quality,
            min_base_quality,
        }
    }

    /// Whether `record` takes part in the pileup.
    ///
    /// Unmapped, secondary, supplementary, QC-failed and duplicate records are
    /// rejected, as are records whose MAPQ is unavailable (255).
    pub fn accepts(&self, record: &Record) -> bool {
        let mapq = record.mapq();
        !(record.is_unmapped()
            || record.is_secondary()
            || record.is_supplementary()
            || record.is_quality_check_failed()
            || record.is_duplicate()
            || mapq == 255
            || mapq <= self.min_mapping_quality)
    }
}

fn convert_cigar(op: &Cigar) -> CigarOp {
    match *op {
        Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
            CigarOp::new(CigarOpKind::Match, len)
        }
        Cigar::Ins(len) => CigarOp::new(CigarOpKind::Insertion, len),
        Cigar::Del(len) => CigarOp::new(CigarOpKind::Deletion, len),
        Cigar::RefSkip(len) => CigarOp::new(CigarOpKind::Skip, len),
        Cigar::SoftClip(len) => CigarOp::new(CigarOpKind::SoftClip, len),
        Cigar::HardClip(len) | Cigar::Pad(len) => CigarOp::new(CigarOpKind::HardClip, len),
    }
}

/// Convert an htslib record into an [`AlignedRead`] on `chrom`.
pub fn record_to_read(record: &Record, chrom: Arc<str>) -> AlignedRead {
    let cigar = record.cigar().iter().map(convert_cigar).collect();
    AlignedRead::new(
        String::from_utf8_lossy(record.qname()).as_ref(),
        chrom,
        record.pos().max(0) as u64,
        record.mapq(),
        cigar,
        record.seq().as_bytes(),
        record.qual().to_vec(),
    )
}

/// Streams [`Site`]s out of a coordinate-sorted BAM/SAM file.
pub struct BamSiteReader {
    reader: bam::Reader,
    header: HeaderView,
    record: Record,
    filter: ReadFilter,
    builder: SiteBuilder,
    names: HashMap<i32, Arc<str>>,
    reads_seen: u64,
    reads_used: u64,
    done: bool,
}

impl std::fmt::Debug for BamSiteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamSiteReader")
            .field("filter", &self.filter)
            .field("reads_seen", &self.reads_seen)
            .field("reads_used", &self.reads_used)
            .field("done", &self.done)
            .finish()
    }
}

impl BamSiteReader {
    /// Open `path` (BAM or SAM, detected by htslib).
    pub fn from_path<P: AsRef<Path>>(path: P, filter: ReadFilter) -> Result<Self, InputError> {
        let reader = bam::Reader::from_path(path.as_ref())?;
        let header = reader.header().clone();
        info!(
            path = %path.as_ref().display(),
            targets = header.target_count(),
            "opened alignment file"
        );
        Ok(Self {
            reader,
            header,
            record: Record::new(),
            filter,
            builder: SiteBuilder::new(filter.min_base_quality),
            names: HashMap::new(),
            reads_seen: 0,
            reads_used: 0,
            done: false,
        })
    }

    /// Fill reference bases from `sequence` (single-reference genomes).
    pub fn with_reference_sequence(mut self, sequence: impl Into<Arc<[u8]>>) -> Self {
        self.builder = SiteBuilder::new(self.filter.min_base_quality)
            .with_reference_sequence(sequence);
        self
    }

    /// Records read so far, filtered or not.
    pub fn reads_seen(&self) -> u64 {
        self.reads_seen
    }

    /// Records that passed the filter.
    pub fn reads_used(&self) -> u64 {
        self.reads_used
    }

    fn reference_name(&mut self, tid: i32) -> Arc<str> {
        let header = &self.header;
        Arc::clone(self.names.entry(tid).or_insert_with(|| {
            Arc::from(String::from_utf8_lossy(header.tid2name(tid as u32)).as_ref())
        }))
    }
}

impl Iterator for BamSiteReader {
    type Item = Result<Site, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(site) = self.builder.pop_ready() {
                return Some(Ok(site));
            }
            if self.done {
                return None;
            }

            match self.reader.read(&mut self.record) {
                None => {
                    self.done = true;
                    self.builder.finish();
                    debug!(
                        seen = self.reads_seen,
                        used = self.reads_used,
                        "alignment stream exhausted"
                    );
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                Some(Ok(())) => {
                    self.reads_seen += 1;
                    if !self.filter.accepts(&self.record) || self.record.tid() < 0 {
                        continue;
                    }
                    self.reads_used += 1;
                    let chrom = self.reference_name(self.record.tid());
                    let read = record_to_read(&self.record, chrom);
                    if let Err(err) = self.builder.push(&read) {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                }
            }
        }
    }
}
