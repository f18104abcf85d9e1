//! Genomics-specific data structures, readers and the lag-correlation engine.
//!
//! Sites come from `samtools mpileup` text ([`PileupReader`]) or directly from
//! alignments ([`BamSiteReader`]), are optionally filtered by coding position
//! class ([`GenomeProfile`]), cut into chunks ([`ChunkSplitter`]) and paired
//! window by window ([`LagCorrelator`]). [`RateCorrelator`] compares per-site
//! diversity instead of individual reads.

mod bam;
mod chunk;
mod correlator;
mod diversity;
mod pairing;
mod pileup;
mod profile;
mod rate;
mod report;
mod types;

pub use bam::{record_to_read, BamSiteReader, ReadFilter};
pub use chunk::{Chunk, ChunkSplitter, Region};
pub use correlator::{CorrelationResult, LagCorrelator};
pub use diversity::SiteDiversity;
pub use pairing::{
    accumulate, compare_window, OrderingError, PairingParams, PairingProcessor, SiteWindow,
    SlidingWindow, Windows,
};
pub use pileup::{
    decode_read_bases, parse_pileup_line, PileupReader, SiteBuilder, DEFAULT_MIN_BASE_QUALITY,
};
pub use profile::{
    read_fasta, read_fasta_path, read_gff_cds, read_gff_cds_path, CdsRecord, ClassFilter,
    CodonTable, FastaRecord, GenomeProfile, PositionClass, Strand,
};
pub use rate::{rate_covariances, RateCorrelator, RateProcessor, RateResult};
pub use report::{
    render_pooled, render_rate_report, render_report, write_pooled, write_rate_report,
    write_report, Delimiter, DiversityWriter,
};
pub use types::{
    is_valid_base, AlignedRead, Allele, CigarOp, CigarOpKind, Site, AMBIGUOUS_BASE,
};

use thiserror::Error;

/// Errors raised while reading sites, alignments or annotations.
#[derive(Debug, Error)]
pub enum InputError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed text record.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// FASTA input held no record.
    #[error("FASTA input contains no record")]
    EmptyFasta,

    /// htslib failed to open or decode alignments.
    #[error("alignment decoding failed: {0}")]
    Bam(#[from] rust_htslib::errors::Error),

    /// Alignments were not coordinate-sorted.
    #[error(transparent)]
    Ordering(#[from] OrderingError),
}
