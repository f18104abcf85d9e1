#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pcorr::genomics::{Allele, Site};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("PCORR_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set PCORR_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Site on `chr1` with `(base, read id)` observations at quality 30.
pub fn site(position: u64, alleles: &[(u8, &str)]) -> Site {
    Site::new(
        "chr1",
        position,
        b'A',
        alleles
            .iter()
            .map(|&(base, id)| Allele::new(base, 30, id))
            .collect(),
    )
}

/// Reads drawn from four related haplotypes, piled into one site per covered
/// position of `chr1`.
pub fn synthetic_sites(genome_len: u64, reads: usize, read_len: u64, seed: u64) -> Vec<Site> {
    let mut rng = StdRng::seed_from_u64(seed);
    let founder: Vec<u8> = (0..genome_len)
        .map(|_| b"ACGT"[rng.gen_range(0..4)])
        .collect();
    let haplotypes: Vec<Vec<u8>> = (0..4)
        .map(|_| {
            founder
                .iter()
                .map(|&base| {
                    if rng.gen_bool(0.1) {
                        b"ACGT"[rng.gen_range(0..4)]
                    } else {
                        base
                    }
                })
                .collect()
        })
        .collect();

    let mut starts: Vec<(u64, usize)> = (0..reads)
        .map(|_| {
            (
                rng.gen_range(0..genome_len - read_len),
                rng.gen_range(0..haplotypes.len()),
            )
        })
        .collect();
    starts.sort();

    let names: Vec<String> = (0..reads).map(|i| format!("read{i}")).collect();
    let mut sites = Vec::new();
    for position in 0..genome_len {
        let alleles: Vec<Allele> = starts
            .iter()
            .enumerate()
            .filter(|(_, (start, _))| *start <= position && position < start + read_len)
            .map(|(idx, &(_, hap))| {
                Allele::new(haplotypes[hap][position as usize], 30, names[idx].as_str())
            })
            .collect();
        if !alleles.is_empty() {
            sites.push(Site::new("chr1", position, founder[position as usize], alleles));
        }
    }
    sites
}
