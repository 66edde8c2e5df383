//! Combined JSON snapshot of every tracked contract.

use super::{ContractReport, ReportSink};
use crate::error::ReportError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

/// Serialized form of `snapshot.json`.
#[derive(Debug, Serialize)]
pub struct BalanceSnapshot<'a> {
    pub ts: u64,
    pub contracts: &'a [ContractReport],
}

/// Buffers reports and writes them as one document on `finish`.
pub struct JsonSnapshotSink {
    path: PathBuf,
    reports: Vec<ContractReport>,
}

impl JsonSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reports: Vec::new(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ReportSink for JsonSnapshotSink {
    fn write(&mut self, report: &ContractReport) -> Result<(), ReportError> {
        self.reports.push(report.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReportError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = BalanceSnapshot {
            ts: now_ms(),
            contracts: &self.reports,
        };
        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &snapshot)?;
        info!(
            contracts = self.reports.len(),
            path = %self.path.display(),
            "wrote JSON balance snapshot"
        );
        Ok(())
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
