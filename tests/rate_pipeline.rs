#[path = "common/mod.rs"]
mod common;

use std::io::Cursor;
use std::sync::Arc;

use common::synthetic_sites;
use pcorr::genomics::{
    rate_covariances, ClassFilter, CodonTable, GenomeProfile, OrderingError, PileupReader,
    SiteDiversity,
};
use pcorr::{CorrelationConfig, CorrelationError, RateCorrelator, RateResult, Site};

const MAX_LAG: usize = 30;

fn run(config: CorrelationConfig, sites: Vec<Site>) -> RateResult {
    RateCorrelator::new(config)
        .expect("valid configuration")
        .run(sites.into_iter().map(Ok::<_, OrderingError>))
        .expect("run succeeds")
}

fn close(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
}

#[test]
fn worker_count_does_not_change_rate_rows() {
    let sites = synthetic_sites(3_000, 600, 80, 21);
    let base = CorrelationConfig::new(MAX_LAG).with_chunk_size(1_000);
    let single = run(base.clone().with_workers(1), sites.clone());
    let parallel = run(base.with_workers(4), sites.clone());

    assert_eq!(single.chunks, 3);
    assert_eq!(single.sites, sites.len() as u64);
    for (a, b) in single.rows.iter().zip(&parallel.rows) {
        assert_eq!(a.n, b.n);
        assert!(close(a.cov_mean, b.cov_mean));
        assert!(close(a.cov_var, b.cov_var));
        assert!(close(a.x_mean, b.x_mean));
        assert!(close(a.y_var, b.y_var));
    }
    assert!(single.rows.iter().all(|row| row.n == 3));
}

#[test]
fn single_chunk_matches_direct_covariance() {
    let sites = synthetic_sites(2_000, 300, 60, 5);
    let diversity: Vec<SiteDiversity> = sites.iter().filter_map(SiteDiversity::from_site).collect();
    let expected = rate_covariances(&diversity, MAX_LAG);

    let result = run(
        CorrelationConfig::new(MAX_LAG)
            .with_chunk_size(1_000_000)
            .with_min_chunk_samples(0)
            .with_workers(2),
        sites,
    );

    assert_eq!(result.chunks, 1);
    for row in &result.rows {
        assert!(close(row.cov_mean, expected.result(row.lag)), "lag {}", row.lag);
        assert!(close(row.x_mean, expected.mean_x(row.lag)));
        assert!(close(row.y_mean, expected.mean_y(row.lag)));
        assert_eq!(row.cov_var, 0.0);
    }
}

#[test]
fn class_filter_restricts_compared_sites() {
    let genome = vec![b'A'; 3_000];
    let table = CodonTable::from_id(11).expect("standard table");
    let profile = Arc::new(GenomeProfile::build(&genome, &[], &table));

    let result = RateCorrelator::new(CorrelationConfig::new(MAX_LAG).with_workers(2))
        .expect("valid configuration")
        .with_class_filter(profile, ClassFilter::Coding)
        .run(synthetic_sites(3_000, 300, 80, 9).into_iter().map(Ok::<_, OrderingError>))
        .expect("run succeeds");

    assert_eq!(result.sites, 0);
    assert!(result.rows.iter().all(|row| row.n == 0 && row.cov_mean.is_nan()));
}

#[test]
fn pileup_input_errors_surface() {
    let text = "chr1\t5\tA\t2\t.T\tII\nchr1\t3\tA\t2\t.T\tII\n";
    let outcome = RateCorrelator::new(CorrelationConfig::new(4).with_workers(1))
        .expect("valid configuration")
        .run(PileupReader::new(Cursor::new(text.as_bytes().to_vec())));
    assert!(matches!(outcome, Err(CorrelationError::Ordering(_))));
}
