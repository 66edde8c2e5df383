// Snapshot Pipeline
//
// For each tracked contract: fetch its full Transfer log over the block range,
// replay it into holder balances, then render the balances into reports.
// Contracts are processed concurrently and share the fetcher's query budget.

use crate::config::{SnapshotConfig, TrackedContract};
use crate::error::{ReportError, SnapshotError};
use crate::report::{ContractReport, ReportSink};
use crate::transfers::events::transfer_filter;
use crate::transfers::fetcher::{LogSource, RangeFetcher};
use crate::transfers::ledger::LedgerReplayer;
use crate::types::{BalanceMap, BlockRange};
use futures::future::try_join_all;
use std::time::Instant;
use tracing::{info, warn};

/// Balances of one contract at the end of the scanned range.
#[derive(Debug, Clone)]
pub struct ContractSnapshot {
    pub contract: TrackedContract,
    pub range: BlockRange,
    pub events: usize,
    pub balances: BalanceMap,
}

impl ContractSnapshot {
    pub fn report(&self) -> ContractReport {
        ContractReport::new(
            self.contract.label.clone(),
            self.contract.address,
            self.contract.decimals,
            self.range,
            &self.balances,
        )
    }
}

pub struct SnapshotJob<S> {
    fetcher: RangeFetcher<S>,
    replayer: LedgerReplayer,
}

impl<S: LogSource> SnapshotJob<S> {
    pub fn new(source: S, config: &SnapshotConfig) -> Self {
        Self {
            fetcher: RangeFetcher::new(source, config.fetcher.clone()),
            replayer: LedgerReplayer::new().strict(config.strict).sorted(),
        }
    }

    pub fn fetcher(&self) -> &RangeFetcher<S> {
        &self.fetcher
    }

    /// Resolve the scan range, asking the source for its tip when no end is set.
    ///
    /// A start past the tip yields the empty range.
    pub async fn resolve_range(
        &self,
        start_block: u64,
        end_block: Option<u64>,
    ) -> Result<BlockRange, SnapshotError> {
        let end = match end_block {
            Some(end) => end,
            None => self
                .fetcher
                .source()
                .latest_block()
                .await
                .map_err(SnapshotError::LatestBlock)?,
        };
        info!("Current block: {}", end);

        let range = BlockRange::new(start_block, end);
        if range.is_empty() {
            warn!(
                start_block,
                end_block = end,
                "start block is ahead of end block, nothing to scan"
            );
        }
        Ok(range)
    }

    pub async fn snapshot_contract(
        &self,
        contract: &TrackedContract,
        range: BlockRange,
    ) -> Result<ContractSnapshot, SnapshotError> {
        let started = Instant::now();
        info!(
            contract = %contract.address,
            label = %contract.label,
            range = %range,
            "fetching Transfer logs"
        );

        let events = self
            .fetcher
            .fetch(&transfer_filter(contract.address), range)
            .await
            .map_err(|source| SnapshotError::Fetch {
                label: contract.label.clone(),
                source,
            })?;

        let balances =
            self.replayer
                .replay(&events)
                .map_err(|source| SnapshotError::Consistency {
                    label: contract.label.clone(),
                    source,
                })?;

        info!(
            label = %contract.label,
            events = events.len(),
            holders = balances.len(),
            total = %balances.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replayed Transfer log"
        );

        Ok(ContractSnapshot {
            contract: contract.clone(),
            range,
            events: events.len(),
            balances,
        })
    }

    /// Snapshot every contract. Any failure aborts the whole run.
    pub async fn run(
        &self,
        contracts: &[TrackedContract],
        range: BlockRange,
    ) -> Result<Vec<ContractSnapshot>, SnapshotError> {
        try_join_all(
            contracts
                .iter()
                .map(|contract| self.snapshot_contract(contract, range)),
        )
        .await
    }
}

/// Render snapshots into every sink, then finish the sinks.
pub fn write_reports(
    snapshots: &[ContractSnapshot],
    sinks: &mut [&mut dyn ReportSink],
) -> Result<Vec<ContractReport>, ReportError> {
    let reports: Vec<ContractReport> = snapshots.iter().map(ContractSnapshot::report).collect();
    for sink in sinks.iter_mut() {
        for report in &reports {
            sink.write(report)?;
        }
        sink.finish()?;
    }
    Ok(reports)
}
