#[path = "common/mod.rs"]
mod common;

use std::collections::HashSet;

use blake3::hash;
use common::synthetic_sites;
use pcorr::genomics::{render_pooled, render_report, Delimiter, OrderingError};
use pcorr::{CorrelationConfig, LagCorrelator};

#[test]
fn single_worker_runs_are_bit_identical() {
    let sites = synthetic_sites(2_000, 300, 60, 11);

    let mut fingerprints = HashSet::new();
    for _ in 0..5 {
        let correlator = LagCorrelator::new(
            CorrelationConfig::new(30)
                .with_chunk_size(500)
                .with_workers(1),
        )
        .expect("correlator initialises");

        let result = correlator
            .run(sites.clone().into_iter().map(Ok::<_, OrderingError>))
            .expect("run succeeds");
        let mut rendered = render_report(&result.rows, Delimiter::Tab).expect("rendering succeeds");
        rendered.push_str(&render_pooled(&result.pooled, Delimiter::Tab).expect("rendering succeeds"));
        fingerprints.insert(hash(rendered.as_bytes()));
    }

    assert_eq!(fingerprints.len(), 1, "outputs diverged across runs");
}
