#[path = "common/mod.rs"]
mod common;
use common::assert_snapshot;
use pcorr::genomics::{render_pooled, render_report, Delimiter};
use pcorr::stats::{Calculator, LagRow};

fn rows() -> Vec<LagRow> {
    vec![
        LagRow {
            lag: 0,
            cs_mean: 0.25,
            cs_var: 0.0625,
            cr_mean: -0.5,
            cr_var: 1.0,
            ct_mean: 0.125,
            ct_var: 0.03125,
            n: 12,
        },
        LagRow {
            lag: 1,
            cs_mean: f64::NAN,
            cs_var: f64::NAN,
            cr_mean: f64::NAN,
            cr_var: f64::NAN,
            ct_mean: f64::NAN,
            ct_var: f64::NAN,
            n: 0,
        },
    ]
}

#[test]
fn render_report_matches_golden() {
    let actual = render_report(&rows(), Delimiter::Tab).expect("report rendering should succeed");
    assert_snapshot("report/lags.tsv", &actual);
}

#[test]
fn render_report_csv_matches_golden() {
    let actual = render_report(&rows(), Delimiter::Comma).expect("report rendering should succeed");
    assert_snapshot("report/lags.csv", &actual);
}

#[test]
fn render_pooled_matches_golden() {
    let mut calc = Calculator::new(3);
    calc.increment(&[1.0, 0.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0], 0);
    calc.increment(&[1.0, 1.0], &[0.0, 1.0], 1);
    calc.increment(&[0.0, 1.0], &[0.0, 1.0], 1);

    let actual = render_pooled(&calc, Delimiter::Tab).expect("pooled rendering should succeed");
    assert_snapshot("report/pooled.tsv", &actual);
}
