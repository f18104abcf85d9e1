use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::BufRead;
use std::sync::Arc;

use tracing::{debug, warn};

use super::pairing::OrderingError;
use super::types::{AlignedRead, Allele, Site};
use super::InputError;

/// Phred offset of pileup quality strings.
const PHRED_OFFSET: u8 = 33;

/// Default minimum base quality for an allele to be kept.
pub const DEFAULT_MIN_BASE_QUALITY: u8 = 13;

/// Decode the read-base column of a pileup line.
///
/// Read starts (`^` plus the mapping quality character) and ends (`$`) are
/// dropped, as are indel annotations (`+3ACG`, `-2TT`). `.` and `,` become the
/// reference base. The result is upper-cased.
pub fn decode_read_bases(column: &str, reference_base: u8) -> Result<Vec<u8>, String> {
    let bytes = column.as_bytes();
    let mut bases = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'^' => i += 2,
            b'$' => i += 1,
            b'+' | b'-' => {
                let digits_start = i + 1;
                let mut j = digits_start;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if j == digits_start {
                    return Err(format!("indel without length at offset {i}"));
                }
                let len: usize = column[digits_start..j]
                    .parse()
                    .map_err(|_| format!("invalid indel length at offset {i}"))?;
                i = j
                    .checked_add(len)
                    .filter(|&end| end <= bytes.len())
                    .ok_or_else(|| format!("indel of length {len} overruns the column at offset {i}"))?;
            }
            b'.' | b',' => {
                bases.push(reference_base);
                i += 1;
            }
            other => {
                bases.push(other.to_ascii_uppercase());
                i += 1;
            }
        }
    }

    Ok(bases)
}

/// Parse one `samtools mpileup` line into a [`Site`].
///
/// Columns: reference, 1-based position, reference base, depth, read bases,
/// qualities and an optional comma-separated list of read names. Alleles with
/// a quality below `min_base_quality` are dropped.
pub fn parse_pileup_line(
    line: &str,
    line_number: usize,
    min_base_quality: u8,
) -> Result<Site, InputError> {
    let parse_error = |message: String| InputError::Parse {
        line: line_number,
        message,
    };

    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
    if fields.len() < 4 {
        return Err(parse_error(format!(
            "expected at least 4 pileup columns, found {}",
            fields.len()
        )));
    }

    let position: u64 = fields[1]
        .parse()
        .map_err(|_| parse_error(format!("invalid position '{}'", fields[1])))?;
    if position == 0 {
        return Err(parse_error("pileup positions are 1-based".to_string()));
    }
    let reference_base = fields[2]
        .bytes()
        .next()
        .map(|b| b.to_ascii_uppercase())
        .ok_or_else(|| parse_error("missing reference base".to_string()))?;
    let depth: usize = fields[3]
        .parse()
        .map_err(|_| parse_error(format!("invalid depth '{}'", fields[3])))?;

    let mut site = Site::new(fields[0], position - 1, reference_base, Vec::new());
    if depth == 0 {
        return Ok(site);
    }
    if fields.len() < 6 {
        return Err(parse_error("missing read base or quality column".to_string()));
    }

    let bases = decode_read_bases(fields[4], reference_base).map_err(parse_error)?;
    let qualities = fields[5].as_bytes();
    if bases.len() != depth {
        return Err(parse_error(format!(
            "decoded {} bases, depth column says {depth}",
            bases.len()
        )));
    }
    if qualities.len() != depth {
        return Err(parse_error(format!(
            "found {} qualities, depth column says {depth}",
            qualities.len()
        )));
    }

    let names: Vec<&str> = match fields.get(6) {
        Some(column) => column.split(',').collect(),
        None => Vec::new(),
    };
    if !names.is_empty() && names.len() != depth {
        debug!(
            line = line_number,
            names = names.len(),
            depth,
            "read name count mismatch; names ignored"
        );
    }
    let named = names.len() == depth;

    site.alleles = bases
        .into_iter()
        .zip(qualities)
        .enumerate()
        .filter_map(|(i, (base, &qual))| {
            let quality = qual.saturating_sub(PHRED_OFFSET);
            if quality < min_base_quality {
                return None;
            }
            let read_id = if named { names[i] } else { "" };
            Some(Allele::new(base, quality, read_id))
        })
        .collect();

    Ok(site)
}

/// Streaming reader over `samtools mpileup` text.
#[derive(Debug)]
pub struct PileupReader<R> {
    reader: R,
    min_base_quality: u8,
    line: String,
    line_number: usize,
    references: HashSet<Arc<str>>,
    done: bool,
}

impl<R: BufRead> PileupReader<R> {
    /// Wrap a buffered pileup stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            min_base_quality: DEFAULT_MIN_BASE_QUALITY,
            line: String::new(),
            line_number: 0,
            references: HashSet::new(),
            done: false,
        }
    }

    /// Override the minimum base quality.
    pub fn with_min_base_quality(mut self, min_base_quality: u8) -> Self {
        self.min_base_quality = min_base_quality;
        self
    }

    /// Lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    // Reuse one allocation per reference name across sites.
    fn intern(&mut self, site: &mut Site) {
        match self.references.get(site.reference.as_ref()) {
            Some(name) => site.reference = Arc::clone(name),
            None => {
                self.references.insert(Arc::clone(&site.reference));
            }
        }
    }
}

impl<R: BufRead> Iterator for PileupReader<R> {
    type Item = Result<Site, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    debug!(lines = self.line_number, "pileup stream exhausted");
                }
                Ok(_) => {
                    self.line_number += 1;
                    if self.line.trim().is_empty() {
                        continue;
                    }
                    let parsed =
                        parse_pileup_line(&self.line, self.line_number, self.min_base_quality);
                    return Some(match parsed {
                        Ok(mut site) => {
                            self.intern(&mut site);
                            Ok(site)
                        }
                        Err(err) => {
                            self.done = true;
                            Err(err)
                        }
                    });
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
        }
        None
    }
}

/// Piles coordinate-sorted aligned reads into [`Site`]s.
///
/// A position is complete once a read starting to its right arrives, so every
/// pending position left of the newest read start is flushed on push.
#[derive(Debug)]
pub struct SiteBuilder {
    min_base_quality: u8,
    reference_sequence: Option<Arc<[u8]>>,
    reference: Option<Arc<str>>,
    last_start: u64,
    pending: BTreeMap<u64, Vec<Allele>>,
    ready: VecDeque<Site>,
}

impl SiteBuilder {
    /// Construct a new builder.
    pub fn new(min_base_quality: u8) -> Self {
        Self {
            min_base_quality,
            reference_sequence: None,
            reference: None,
            last_start: 0,
            pending: BTreeMap::new(),
            ready: VecDeque::new(),
        }
    }

    /// Supply the reference sequence used to fill in reference bases.
    pub fn with_reference_sequence(mut self, sequence: impl Into<Arc<[u8]>>) -> Self {
        self.reference_sequence = Some(sequence.into());
        self
    }

    /// Add the next read in coordinate order.
    pub fn push(&mut self, read: &AlignedRead) -> Result<(), OrderingError> {
        let same_reference = self
            .reference
            .as_ref()
            .map_or(false, |current| *current == read.chrom);
        if same_reference {
            OrderingError::check(&read.chrom, self.last_start, read.pos)?;
            self.flush_before(read.pos);
        } else {
            self.finish();
            self.reference = Some(Arc::clone(&read.chrom));
        }
        self.last_start = read.pos;

        for (position, base, quality) in read.aligned_bases() {
            if quality < self.min_base_quality {
                continue;
            }
            self.pending
                .entry(position)
                .or_default()
                .push(Allele::new(base, quality, Arc::clone(&read.name)));
        }
        Ok(())
    }

    /// Flush every pending position.
    pub fn finish(&mut self) {
        self.flush_before(u64::MAX);
        if !self.pending.is_empty() {
            warn!(positions = self.pending.len(), "unflushed positions dropped");
            self.pending.clear();
        }
    }

    /// Next completed site.
    pub fn pop_ready(&mut self) -> Option<Site> {
        self.ready.pop_front()
    }

    fn flush_before(&mut self, position: u64) {
        let Some(reference) = self.reference.clone() else {
            return;
        };
        let keep = self.pending.split_off(&position);
        let flushed = std::mem::replace(&mut self.pending, keep);
        for (pos, alleles) in flushed {
            let reference_base = self
                .reference_sequence
                .as_ref()
                .and_then(|seq| seq.get(pos as usize).copied())
                .unwrap_or(b'N');
            self.ready
                .push_back(Site::new(Arc::clone(&reference), pos, reference_base, alleles));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{CigarOp, CigarOpKind};
    use std::io::Cursor;

    #[test]
    fn decodes_markers_and_indels() {
        let bases = decode_read_bases("^F.,$a+2AGT-1cG*", b'C').unwrap();
        assert_eq!(bases, b"CCATG*");
    }

    #[test]
    fn oversized_indel_length_is_an_error() {
        assert!(decode_read_bases(".+18446744073709551615A", b'C').is_err());
        assert!(decode_read_bases(".+99999999999999999999999A", b'C').is_err());
        assert!(decode_read_bases(".-3AC", b'C').is_err());

        let err = parse_pileup_line("chr1\t5\tA\t1\t.+18446744073709551615A\tI", 7, 0)
            .unwrap_err();
        assert!(matches!(err, InputError::Parse { line: 7, .. }));
    }

    #[test]
    fn parses_line_with_read_names() {
        let line = "chr1\t5\ta\t3\t.,T\tIII\tr1,r2,r3\n";
        let site = parse_pileup_line(line, 1, 0).unwrap();
        assert_eq!(site.position, 4);
        assert_eq!(site.reference_base, b'A');
        let bases: Vec<u8> = site.alleles.iter().map(|a| a.base).collect();
        assert_eq!(bases, b"AAT");
        assert_eq!(site.alleles[2].read_id.as_ref(), "r3");
        assert_eq!(site.alleles[0].quality, 40);
    }

    #[test]
    fn low_quality_alleles_are_dropped() {
        let line = "chr1\t1\tA\t2\t.T\t#I";
        let site = parse_pileup_line(line, 1, DEFAULT_MIN_BASE_QUALITY).unwrap();
        assert_eq!(site.alleles.len(), 1);
        assert_eq!(site.alleles[0].base, b'T');
        assert!(site.alleles[0].read_id.is_empty());
    }

    #[test]
    fn depth_mismatch_is_an_error() {
        let err = parse_pileup_line("chr1\t1\tA\t3\t..\tII", 7, 0).unwrap_err();
        assert!(matches!(err, InputError::Parse { line: 7, .. }));
    }

    #[test]
    fn zero_depth_line_yields_empty_site() {
        let site = parse_pileup_line("chr1\t9\tG\t0\t*\t*", 1, 0).unwrap();
        assert_eq!(site.depth(), 0);
    }

    #[test]
    fn reader_streams_sites_and_stops_on_error() {
        let text = "chr1\t1\tA\t1\t.\tI\nchr1\t2\tA\tx\t.\tI\nchr1\t3\tA\t1\t.\tI\n";
        let results: Vec<_> = PileupReader::new(Cursor::new(text)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    fn read(name: &str, pos: u64, seq: &[u8]) -> AlignedRead {
        AlignedRead::new(
            name,
            "chr1",
            pos,
            60,
            vec![CigarOp::new(CigarOpKind::Match, seq.len() as u32)],
            seq.to_vec(),
            vec![30; seq.len()],
        )
    }

    #[test]
    fn builder_flushes_left_of_new_reads() {
        let mut builder = SiteBuilder::new(0).with_reference_sequence(b"ACGTACGT".to_vec());
        builder.push(&read("r1", 0, b"ACG")).unwrap();
        builder.push(&read("r2", 2, b"GTA")).unwrap();

        let flushed: Vec<Site> = std::iter::from_fn(|| builder.pop_ready()).collect();
        assert_eq!(flushed.iter().map(|s| s.position).collect::<Vec<_>>(), vec![0, 1]);

        builder.finish();
        let rest: Vec<Site> = std::iter::from_fn(|| builder.pop_ready()).collect();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].position, 2);
        assert_eq!(rest[0].depth(), 2);
        assert_eq!(rest[0].reference_base, b'G');
    }

    #[test]
    fn builder_rejects_unsorted_reads() {
        let mut builder = SiteBuilder::new(0);
        builder.push(&read("r1", 10, b"A")).unwrap();
        assert!(builder.push(&read("r2", 5, b"A")).is_err());
    }
}
