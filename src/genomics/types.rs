use std::collections::HashMap;
use std::sync::Arc;

/// Marker written over a base whose duplicate observations disagree.
pub const AMBIGUOUS_BASE: u8 = b'N';

/// Whether `base` is one of the canonical nucleotides used for pairing.
pub fn is_valid_base(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// Single base observation from one read at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allele {
    /// Observed base, upper-case ASCII.
    pub base: u8,
    /// Base quality (Phred).
    pub quality: u8,
    /// Name of the read (or read pair) the base came from; empty if unknown.
    pub read_id: Arc<str>,
}

impl Allele {
    /// Construct a new allele observation.
    pub fn new(base: u8, quality: u8, read_id: impl Into<Arc<str>>) -> Self {
        Self {
            base,
            quality,
            read_id: read_id.into(),
        }
    }

    /// Whether this allele can take part in read pairing.
    pub fn is_pairable(&self) -> bool {
        is_valid_base(self.base) && !self.read_id.is_empty()
    }
}

/// One observed genomic position and every read base covering it.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Reference contig/chromosome name.
    pub reference: Arc<str>,
    /// 0-based reference coordinate.
    pub position: u64,
    /// Reference base at this position (`N` when unknown).
    pub reference_base: u8,
    /// Observations in input order.
    pub alleles: Vec<Allele>,
}

impl Site {
    /// Construct a new site.
    pub fn new(
        reference: impl Into<Arc<str>>,
        position: u64,
        reference_base: u8,
        alleles: Vec<Allele>,
    ) -> Self {
        Self {
            reference: reference.into(),
            position,
            reference_base,
            alleles,
        }
    }

    /// Read depth (all observations, valid or not).
    pub fn depth(&self) -> usize {
        self.alleles.len()
    }

    /// Number of alleles carrying a canonical base.
    pub fn valid_depth(&self) -> usize {
        self.alleles.iter().filter(|a| is_valid_base(a.base)).count()
    }

    /// Copy of this site with overlapping mate observations collapsed.
    ///
    /// Observations sharing a read id become a single allele at the position of
    /// the first one. The base survives if every duplicate agrees, otherwise it
    /// becomes [`AMBIGUOUS_BASE`]; the best quality is kept. Alleles with an
    /// unknown read id are never merged.
    pub fn collapse_mates(&self) -> Site {
        let mut alleles: Vec<Allele> = Vec::with_capacity(self.alleles.len());
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(self.alleles.len());

        for allele in &self.alleles {
            if allele.read_id.is_empty() {
                alleles.push(allele.clone());
                continue;
            }
            match seen.get(allele.read_id.as_ref()) {
                Some(&idx) => {
                    let kept = &mut alleles[idx];
                    if kept.base != allele.base {
                        kept.base = AMBIGUOUS_BASE;
                    }
                    kept.quality = kept.quality.max(allele.quality);
                }
                None => {
                    seen.insert(allele.read_id.as_ref(), alleles.len());
                    alleles.push(allele.clone());
                }
            }
        }

        Site {
            reference: Arc::clone(&self.reference),
            position: self.position,
            reference_base: self.reference_base,
            alleles,
        }
    }
}

/// Simple CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// Consuming match/mismatch (`M`, `=`, `X`).
    Match,
    /// Insertion relative to the reference.
    Insertion,
    /// Deletion relative to the reference.
    Deletion,
    /// Skipped reference region (`N`).
    Skip,
    /// Soft clipping (sequence present in read only).
    SoftClip,
    /// Hard clipping or padding (nothing consumed).
    HardClip,
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

/// Aligned read with sequence and quality information.
#[derive(Debug, Clone)]
pub struct AlignedRead {
    /// Read (template) name; mates share it.
    pub name: Arc<str>,
    /// Reference contig/chromosome name.
    pub chrom: Arc<str>,
    /// 0-based leftmost reference coordinate.
    pub pos: u64,
    /// Mapping quality (Phred-scaled).
    pub mapq: u8,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read sequence stored as uppercase ASCII.
    pub sequence: Arc<[u8]>,
    /// Per-base quality scores in Phred space.
    pub qualities: Arc<[u8]>,
}

impl AlignedRead {
    /// Construct a new aligned read wrapper.
    pub fn new(
        name: impl Into<Arc<str>>,
        chrom: impl Into<Arc<str>>,
        pos: u64,
        mapq: u8,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
        qualities: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            chrom: chrom.into(),
            pos,
            mapq,
            cigar,
            sequence: sequence.into(),
            qualities: qualities.into(),
        }
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the read carries no sequence.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Reference-projected bases as `(reference position, base, quality)`.
    ///
    /// Insertions and clips are skipped; deletions and skips advance the
    /// reference coordinate without yielding a base.
    pub fn aligned_bases(&self) -> Vec<(u64, u8, u8)> {
        let mut out = Vec::with_capacity(self.len());
        let mut ref_pos = self.pos;
        let mut read_pos = 0usize;

        for op in &self.cigar {
            let len = op.len as usize;
            match op.kind {
                CigarOpKind::Match => {
                    for offset in 0..len {
                        let idx = read_pos + offset;
                        if let Some(&base) = self.sequence.get(idx) {
                            let quality = self.qualities.get(idx).copied().unwrap_or(0);
                            out.push((ref_pos + offset as u64, base.to_ascii_uppercase(), quality));
                        }
                    }
                    read_pos += len;
                    ref_pos += op.len as u64;
                }
                CigarOpKind::Insertion | CigarOpKind::SoftClip => read_pos += len,
                CigarOpKind::Deletion | CigarOpKind::Skip => ref_pos += op.len as u64,
                CigarOpKind::HardClip => {}
            }
        }

        out
    }
}
