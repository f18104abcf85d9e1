use std::sync::Arc;

use super::types::Site;

const NUM_BASES: usize = 4; // A, C, G, T

fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Nucleotide diversity of the reads covering one site.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SiteDiversity {
    /// Reference name.
    pub reference: Arc<str>,
    /// 0-based position.
    pub position: u64,
    /// Reference base.
    pub reference_base: u8,
    /// Per-base observation counts [A, C, G, T].
    pub counts: [u32; NUM_BASES],
    /// Probability that two distinct reads disagree.
    pub pi: f64,
}

impl SiteDiversity {
    /// Count canonical bases at `site` and compute
    /// `π = Σ_{i<j} n_i·n_j / C(total, 2)`.
    ///
    /// Returns `None` when fewer than two canonical bases were observed.
    pub fn from_site(site: &Site) -> Option<Self> {
        let mut counts = [0u32; NUM_BASES];
        for allele in &site.alleles {
            if let Some(idx) = base_index(allele.base) {
                counts[idx] += 1;
            }
        }

        let total: u64 = counts.iter().map(|&n| n as u64).sum();
        if total < 2 {
            return None;
        }

        let mut cross = 0u64;
        for i in 0..NUM_BASES {
            for j in i + 1..NUM_BASES {
                cross += counts[i] as u64 * counts[j] as u64;
            }
        }
        let pairs = total * (total - 1) / 2;

        Some(Self {
            reference: Arc::clone(&site.reference),
            position: site.position,
            reference_base: site.reference_base,
            counts,
            pi: cross as f64 / pairs as f64,
        })
    }

    /// Number of canonical bases observed.
    pub fn depth(&self) -> u64 {
        self.counts.iter().map(|&n| n as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::Allele;

    fn site(bases: &[u8]) -> Site {
        Site::new(
            "chr1",
            3,
            b'A',
            bases.iter().map(|&b| Allele::new(b, 30, "")).collect(),
        )
    }

    #[test]
    fn monomorphic_site_has_zero_diversity() {
        let div = SiteDiversity::from_site(&site(b"AAAA")).unwrap();
        assert_eq!(div.pi, 0.0);
        assert_eq!(div.depth(), 4);
    }

    #[test]
    fn mixed_site() {
        // AACT: cross = 2·1 + 2·1 + 1·1 = 5, pairs = 6
        let div = SiteDiversity::from_site(&site(b"AACTN*")).unwrap();
        assert_eq!(div.counts, [2, 1, 0, 1]);
        assert!((div.pi - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn needs_two_valid_bases() {
        assert!(SiteDiversity::from_site(&site(b"AN")).is_none());
        assert!(SiteDiversity::from_site(&site(b"")).is_none());
    }
}
