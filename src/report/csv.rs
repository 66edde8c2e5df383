//! CSV holder tables, one file per tracked contract.

use super::{ContractReport, ReportSink};
use crate::error::ReportError;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

const HEADER: [&str; 4] = ["Address", "Balance", "% Owned", "Raw Balance"];

/// Writes `<dir>/<slug>.csv` for each report.
pub struct CsvSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Render a report to any writer.
    pub fn write_to<W: Write>(writer: W, report: &ContractReport) -> Result<(), ReportError> {
        let mut csv = ::csv::Writer::from_writer(writer);
        csv.write_record(HEADER)?;
        for row in &report.holders {
            csv.write_record([
                format!("{:#x}", row.address),
                row.balance.normalize().to_string(),
                format!("{:.2}%", (row.share * Decimal::ONE_HUNDRED).round_dp(2)),
                row.raw_balance.to_string(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    fn path_for(&self, report: &ContractReport) -> PathBuf {
        self.dir.join(format!("{}.csv", report.slug()))
    }
}

impl ReportSink for CsvSink {
    fn write(&mut self, report: &ContractReport) -> Result<(), ReportError> {
        let path = self.path_for(report);
        if self.written.contains(&path) {
            return Err(ReportError::DuplicateOutput(path));
        }
        fs::create_dir_all(&self.dir)?;
        let file = File::create(&path)?;
        Self::write_to(BufWriter::new(file), report)?;
        info!(
            label = %report.label,
            holders = report.holders.len(),
            path = %path.display(),
            "wrote CSV holder table"
        );
        self.written.push(path);
        Ok(())
    }
}
