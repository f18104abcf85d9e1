use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::Path;

use super::diversity::SiteDiversity;
use crate::stats::{Calculator, LagRow, RateRow};

const REPORT_COLUMNS: [&str; 8] = [
    "lag", "cs_mean", "cs_var", "cr_mean", "cr_var", "ct_mean", "ct_var", "n",
];
const RATE_COLUMNS: [&str; 8] = [
    "lag", "cov_mean", "cov_var", "x_mean", "x_var", "y_mean", "y_var", "n",
];
const POOLED_COLUMNS: [&str; 6] = ["lag", "cs_mean", "cs_var", "cr_cov", "ct_cov", "n"];
const DIVERSITY_COLUMNS: [&str; 8] = [
    "reference", "position", "ref", "a", "c", "g", "t", "pi",
];

/// Field separator of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Tab-separated.
    #[default]
    Tab,
    /// Comma-separated.
    Comma,
}

impl Delimiter {
    /// Comma for `.csv` outputs, tab otherwise.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Comma,
            _ => Self::Tab,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Tab => "\t",
            Self::Comma => ",",
        }
    }
}

fn write_line<W: Write>(writer: &mut W, fields: &[String], delimiter: Delimiter) -> Result<()> {
    writeln!(writer, "{}", fields.join(delimiter.as_str()))?;
    Ok(())
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Write the genome-wide lag table: a header and one row per lag.
pub fn write_report<W: Write>(writer: &mut W, rows: &[LagRow], delimiter: Delimiter) -> Result<()> {
    write_line(writer, &header(&REPORT_COLUMNS), delimiter)?;

    for row in rows {
        let fields = vec![
            row.lag.to_string(),
            row.cs_mean.to_string(),
            row.cs_var.to_string(),
            row.cr_mean.to_string(),
            row.cr_var.to_string(),
            row.ct_mean.to_string(),
            row.ct_var.to_string(),
            row.n.to_string(),
        ];
        write_line(writer, &fields, delimiter)
            .with_context(|| format!("failed to write report row for lag {}", row.lag))?;
    }

    writer.flush()?;
    Ok(())
}

/// Render the lag table into a string (useful for tests and snapshots).
pub fn render_report(rows: &[LagRow], delimiter: Delimiter) -> Result<String> {
    let mut buffer = Vec::new();
    write_report(&mut buffer, rows, delimiter)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered report is not valid UTF-8"))
}

/// Write the genome-wide diversity covariance table.
pub fn write_rate_report<W: Write>(
    writer: &mut W,
    rows: &[RateRow],
    delimiter: Delimiter,
) -> Result<()> {
    write_line(writer, &header(&RATE_COLUMNS), delimiter)?;

    for row in rows {
        let fields = vec![
            row.lag.to_string(),
            row.cov_mean.to_string(),
            row.cov_var.to_string(),
            row.x_mean.to_string(),
            row.x_var.to_string(),
            row.y_mean.to_string(),
            row.y_var.to_string(),
            row.n.to_string(),
        ];
        write_line(writer, &fields, delimiter)
            .with_context(|| format!("failed to write rate row for lag {}", row.lag))?;
    }

    writer.flush()?;
    Ok(())
}

/// Render the diversity covariance table into a string.
pub fn render_rate_report(rows: &[RateRow], delimiter: Delimiter) -> Result<String> {
    let mut buffer = Vec::new();
    write_rate_report(&mut buffer, rows, delimiter)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered rate report is not valid UTF-8"))
}

/// Write the genome-pooled calculator, one row per lag.
///
/// `cs_*` summarise every window in the genome, `cr_cov` and `ct_cov` are the
/// pooled covariances and `n` counts windows.
pub fn write_pooled<W: Write>(writer: &mut W, calc: &Calculator, delimiter: Delimiter) -> Result<()> {
    write_line(writer, &header(&POOLED_COLUMNS), delimiter)?;

    for lag in 0..calc.max_lag() {
        let fields = vec![
            lag.to_string(),
            calc.cs().mean(lag).to_string(),
            calc.cs().variance(lag).to_string(),
            calc.cr().result(lag).to_string(),
            calc.ct().result(lag).to_string(),
            calc.cs().n(lag).to_string(),
        ];
        write_line(writer, &fields, delimiter)?;
    }

    writer.flush()?;
    Ok(())
}

/// Render the pooled table into a string.
pub fn render_pooled(calc: &Calculator, delimiter: Delimiter) -> Result<String> {
    let mut buffer = Vec::new();
    write_pooled(&mut buffer, calc, delimiter)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered pooled table is not valid UTF-8"))
}

/// Streaming writer of per-site diversity rows (1-based positions).
#[derive(Debug)]
pub struct DiversityWriter<W: Write> {
    writer: W,
    delimiter: Delimiter,
    rows: usize,
}

impl<W: Write> DiversityWriter<W> {
    /// Write the header and return the writer.
    pub fn new(mut writer: W, delimiter: Delimiter) -> Result<Self> {
        write_line(&mut writer, &header(&DIVERSITY_COLUMNS), delimiter)
            .context("failed to write diversity header")?;
        Ok(Self {
            writer,
            delimiter,
            rows: 0,
        })
    }

    /// Append one site.
    pub fn write(&mut self, site: &SiteDiversity) -> Result<()> {
        let [a, c, g, t] = site.counts;
        let fields = vec![
            site.reference.to_string(),
            (site.position + 1).to_string(),
            (site.reference_base as char).to_string(),
            a.to_string(),
            c.to_string(),
            g.to_string(),
            t.to_string(),
            site.pi.to_string(),
        ];
        write_line(&mut self.writer, &fields, self.delimiter)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}
