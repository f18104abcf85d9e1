use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use super::InputError;

/// First sequence of a FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Identifier (header up to the first whitespace).
    pub name: String,
    /// Upper-cased sequence.
    pub sequence: Vec<u8>,
}

/// Read the first record of a FASTA stream.
pub fn read_fasta<R: BufRead>(reader: R) -> Result<FastaRecord, InputError> {
    let mut name: Option<String> = None;
    let mut sequence = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            if name.is_some() {
                break;
            }
            name = Some(header.split_whitespace().next().unwrap_or("").to_string());
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if name.is_none() {
            return Err(InputError::Parse {
                line: idx + 1,
                message: "sequence data before the first FASTA header".to_string(),
            });
        }
        sequence.extend(line.bytes().map(|b| b.to_ascii_uppercase()));
    }

    let name = name.ok_or(InputError::EmptyFasta)?;
    Ok(FastaRecord { name, sequence })
}

/// Read the first record of a FASTA file.
pub fn read_fasta_path<P: AsRef<Path>>(path: P) -> Result<FastaRecord, InputError> {
    read_fasta(BufReader::new(File::open(path)?))
}

/// Strand of an annotated feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    /// Forward strand (`+`).
    Forward,
    /// Reverse strand (`-`).
    Reverse,
}

/// Coding sequence annotation, `start..end` in 0-based half-open coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsRecord {
    /// Sequence identifier the feature lies on.
    pub seqid: String,
    /// First coding base.
    pub start: u64,
    /// One past the last coding base.
    pub end: u64,
    /// Coding strand.
    pub strand: Strand,
}

/// Collect the `CDS` features of a GFF3 stream.
pub fn read_gff_cds<R: BufRead>(reader: R) -> Result<Vec<CdsRecord>, InputError> {
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with("##FASTA") {
            break;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(InputError::Parse {
                line: idx + 1,
                message: format!("expected 9 GFF columns, found {}", fields.len()),
            });
        }
        if fields[2] != "CDS" {
            continue;
        }

        let parse = |value: &str| {
            value.parse::<u64>().map_err(|_| InputError::Parse {
                line: idx + 1,
                message: format!("invalid coordinate '{value}'"),
            })
        };
        let start = parse(fields[3])?;
        let end = parse(fields[4])?;
        if start == 0 || end < start {
            return Err(InputError::Parse {
                line: idx + 1,
                message: format!("invalid feature span {start}..{end}"),
            });
        }
        let strand = match fields[6] {
            "-" => Strand::Reverse,
            _ => Strand::Forward,
        };

        records.push(CdsRecord {
            seqid: fields[0].to_string(),
            start: start - 1,
            end,
            strand,
        });
    }

    Ok(records)
}

/// Read the `CDS` features of a GFF3 file.
pub fn read_gff_cds_path<P: AsRef<Path>>(path: P) -> Result<Vec<CdsRecord>, InputError> {
    read_gff_cds(BufReader::new(File::open(path)?))
}

/// NCBI genetic code, amino acids listed in `TCAG` codon order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodonTable {
    id: u8,
    amino_acids: [u8; 64],
}

const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";
const MYCOPLASMA_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

fn codon_base_index(base: u8) -> Option<usize> {
    match base {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

impl CodonTable {
    /// Look up a supported NCBI table (1, 4 or 11).
    pub fn from_id(id: u8) -> Option<Self> {
        let amino_acids = match id {
            1 | 11 => *STANDARD_CODE,
            4 => *MYCOPLASMA_CODE,
            _ => return None,
        };
        Some(Self { id, amino_acids })
    }

    /// NCBI identifier.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Amino acid encoded by `codon`, `None` for ambiguous bases.
    pub fn translate(&self, codon: [u8; 3]) -> Option<u8> {
        let i = codon_base_index(codon[0])?;
        let j = codon_base_index(codon[1])?;
        let k = codon_base_index(codon[2])?;
        Some(self.amino_acids[i * 16 + j * 4 + k])
    }

    /// Whether every third base yields the same amino acid after `prefix`.
    pub fn is_four_fold(&self, prefix: [u8; 2]) -> bool {
        let Some(first) = self.translate([prefix[0], prefix[1], b'T']) else {
            return false;
        };
        first != b'*'
            && [b'C', b'A', b'G']
                .iter()
                .all(|&third| self.translate([prefix[0], prefix[1], third]) == Some(first))
    }
}

/// Coding role of one genome position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionClass {
    /// Outside every annotated CDS.
    NonCoding,
    /// First codon position.
    FirstPos,
    /// Second codon position.
    SecondPos,
    /// Third codon position that is not four-fold degenerate.
    ThirdPos,
    /// Four-fold degenerate third codon position.
    FourFold,
}

/// Selection of position classes fed to the correlation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassFilter {
    /// Non-coding positions only.
    NonCoding,
    /// First codon positions.
    FirstPos,
    /// Second codon positions.
    SecondPos,
    /// Every third codon position, four-fold sites included.
    ThirdPos,
    /// Four-fold degenerate sites only.
    FourFold,
    /// Any coding position.
    Coding,
}

impl ClassFilter {
    /// Map the numeric command-line selector onto a filter.
    pub fn from_selector(selector: i64) -> Self {
        match selector {
            0 => Self::NonCoding,
            1 => Self::FirstPos,
            2 => Self::SecondPos,
            3 => Self::ThirdPos,
            4 => Self::FourFold,
            _ => Self::Coding,
        }
    }

    /// Whether a position of class `class` passes.
    pub fn accepts(&self, class: PositionClass) -> bool {
        use PositionClass as P;
        match self {
            Self::NonCoding => class == P::NonCoding,
            Self::FirstPos => class == P::FirstPos,
            Self::SecondPos => class == P::SecondPos,
            Self::ThirdPos => matches!(class, P::ThirdPos | P::FourFold),
            Self::FourFold => class == P::FourFold,
            Self::Coding => class != P::NonCoding,
        }
    }
}

/// Per-position classes of one genome.
#[derive(Debug, Clone)]
pub struct GenomeProfile {
    classes: Vec<PositionClass>,
}

impl GenomeProfile {
    /// Classify every position of `genome` from its CDS annotations.
    ///
    /// Reverse-strand features are read on the complement from their end.
    /// Features running past the genome are clipped; later features overwrite
    /// earlier ones where they overlap.
    pub fn build(genome: &[u8], cds: &[CdsRecord], table: &CodonTable) -> Self {
        let mut classes = vec![PositionClass::NonCoding; genome.len()];
        let genome_len = genome.len() as u64;

        for record in cds {
            let end = record.end.min(genome_len);
            if record.start >= end {
                continue;
            }
            let codons = (end - record.start) / 3;
            for codon in 0..codons {
                let positions: [usize; 3] = match record.strand {
                    Strand::Forward => {
                        let p = (record.start + codon * 3) as usize;
                        [p, p + 1, p + 2]
                    }
                    Strand::Reverse => {
                        let p = (end - codon * 3) as usize;
                        [p - 1, p - 2, p - 3]
                    }
                };
                let base = |idx: usize| match record.strand {
                    Strand::Forward => genome[positions[idx]].to_ascii_uppercase(),
                    Strand::Reverse => complement(genome[positions[idx]].to_ascii_uppercase()),
                };

                classes[positions[0]] = PositionClass::FirstPos;
                classes[positions[1]] = PositionClass::SecondPos;
                classes[positions[2]] = if table.is_four_fold([base(0), base(1)]) {
                    PositionClass::FourFold
                } else {
                    PositionClass::ThirdPos
                };
            }
        }

        debug!(
            positions = classes.len(),
            features = cds.len(),
            "genome profile built"
        );
        Self { classes }
    }

    /// Class of `position`, `None` past the end of the genome.
    pub fn class_at(&self, position: u64) -> Option<PositionClass> {
        self.classes.get(position as usize).copied()
    }

    /// Whether `position` exists and passes `filter`.
    pub fn accepts(&self, position: u64, filter: ClassFilter) -> bool {
        self.class_at(position).map_or(false, |class| filter.accepts(class))
    }

    /// Genome length.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the profile covers no position.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fasta_reads_first_record_only() {
        let text = ">seq1 description\nacgt\nAC\n>seq2\nTTTT\n";
        let record = read_fasta(Cursor::new(text)).unwrap();
        assert_eq!(record.name, "seq1");
        assert_eq!(record.sequence, b"ACGTAC");
    }

    #[test]
    fn fasta_without_header_fails() {
        assert!(matches!(
            read_fasta(Cursor::new("")),
            Err(InputError::EmptyFasta)
        ));
    }

    #[test]
    fn gff_keeps_only_cds() {
        let text = "##gff-version 3\n\
                    chr\tsrc\tgene\t1\t9\t.\t+\t.\tID=g1\n\
                    chr\tsrc\tCDS\t1\t9\t.\t+\t0\tID=c1\n\
                    chr\tsrc\tCDS\t10\t15\t.\t-\t0\tID=c2\n";
        let records = read_gff_cds(Cursor::new(text)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].start, records[0].end), (0, 9));
        assert_eq!(records[1].strand, Strand::Reverse);
    }

    #[test]
    fn four_fold_detection() {
        let table = CodonTable::from_id(11).unwrap();
        assert!(table.is_four_fold(*b"GC")); // alanine
        assert!(!table.is_four_fold(*b"AA"));
        assert_eq!(table.translate(*b"ATG"), Some(b'M'));
        assert_eq!(CodonTable::from_id(4).unwrap().translate(*b"TGA"), Some(b'W'));
        assert!(CodonTable::from_id(2).is_none());
    }

    #[test]
    fn forward_and_reverse_profiles() {
        let table = CodonTable::from_id(11).unwrap();
        // GCT (Ala, four-fold) AAA (Lys) on +; reverse CDS over the last 3 bases
        // reads complement(AGC) backwards = GCT
        let genome = b"GCTAAAxAGC";
        let cds = vec![
            CdsRecord {
                seqid: "chr".into(),
                start: 0,
                end: 6,
                strand: Strand::Forward,
            },
            CdsRecord {
                seqid: "chr".into(),
                start: 7,
                end: 10,
                strand: Strand::Reverse,
            },
        ];
        let profile = GenomeProfile::build(genome, &cds, &table);
        use PositionClass::*;
        let classes: Vec<_> = (0..10).map(|p| profile.class_at(p).unwrap()).collect();
        assert_eq!(
            classes,
            vec![
                FirstPos, SecondPos, FourFold, FirstPos, SecondPos, ThirdPos, NonCoding,
                FourFold, SecondPos, FirstPos
            ]
        );
        assert!(profile.accepts(2, ClassFilter::ThirdPos));
        assert!(!profile.accepts(5, ClassFilter::FourFold));
        assert!(!profile.accepts(100, ClassFilter::Coding));
    }

    #[test]
    fn selector_mapping() {
        assert_eq!(ClassFilter::from_selector(0), ClassFilter::NonCoding);
        assert_eq!(ClassFilter::from_selector(4), ClassFilter::FourFold);
        assert_eq!(ClassFilter::from_selector(9), ClassFilter::Coding);
        assert!(ClassFilter::Coding.accepts(PositionClass::FourFold));
        assert!(!ClassFilter::Coding.accepts(PositionClass::NonCoding));
    }
}
