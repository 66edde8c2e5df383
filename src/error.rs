//! Error types for the snapshot pipeline.

use crate::types::{BlockRange, EventOrdinal};
use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Boxed error returned by a log source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A range at the width floor kept failing after every retry.
#[derive(Error, Debug)]
#[error("failed to fetch logs for blocks {range} after {attempts} attempts: {source}")]
pub struct FetchError {
    pub range: BlockRange,
    pub attempts: u32,
    #[source]
    pub source: SourceError,
}

/// The event log cannot be replayed into a valid ledger.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConsistencyError {
    /// A debit larger than the holder's running balance. Usually a missing
    /// earlier event (scan started too late) or an out-of-order log.
    #[error("{address} would go negative at {ordinal}: balance {balance}, debit {value}")]
    NegativeBalance {
        address: Address,
        ordinal: EventOrdinal,
        balance: U256,
        value: U256,
    },

    #[error("balance of {address} overflowed at {ordinal}")]
    Overflow {
        address: Address,
        ordinal: EventOrdinal,
    },
}

/// Top-level error for a snapshot run.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("fetch failed for {label}: {source}")]
    Fetch {
        label: String,
        #[source]
        source: FetchError,
    },

    #[error("inconsistent ledger for {label}: {source}")]
    Consistency {
        label: String,
        #[source]
        source: ConsistencyError,
    },

    #[error("could not resolve latest block: {0}")]
    LatestBlock(#[source] SourceError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

/// Errors from writing balance reports.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} was already written by another report", .0.display())]
    DuplicateOutput(std::path::PathBuf),
}
